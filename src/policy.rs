// Bang-bang steering: two binary line sensors -> differential wheel speeds
//
// Pure functions only, no I/O. The sensors sit on either side of the line,
// so "neither triggered" means the line is centered under the chassis.

use crate::config::{MAX_SPEED, TURN_SPEED};
use crate::messages::{MotionCommand, SensorSample};

/// How a sensor field missing from the board's reply is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingSensor {
    /// Treat it as 0 (no line). A reply with no sensor data at all then
    /// looks exactly like a centered line and the robot drives straight on.
    #[default]
    AssumeClear,
    /// Stop the robot
    Stop,
}

/// Tunable speeds for the decision table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedProfile {
    pub max_speed: f64,
    pub turn_speed: f64,
    pub on_missing: MissingSensor,
}

impl Default for SpeedProfile {
    fn default() -> Self {
        Self {
            max_speed: MAX_SPEED,
            turn_speed: TURN_SPEED,
            on_missing: MissingSensor::default(),
        }
    }
}

/// Map one pair of sensor readings to a wheel-speed command
///
/// | left  | right | command                        |
/// |-------|-------|--------------------------------|
/// | Line  | Clear | turn right (turn, max)         |
/// | Clear | Line  | turn left (max, turn)          |
/// | Clear | Clear | straight (max, max)            |
/// | Line  | Line  | stop                           |
///
/// An `Invalid` reading on either side stops the robot. `Missing` readings
/// follow `profile.on_missing`; note that with `AssumeClear` a reply lacking
/// both fields drives straight, which may not be what a no-signal
/// condition should do.
pub fn decide(left: SensorSample, right: SensorSample, profile: &SpeedProfile) -> MotionCommand {
    let left = resolve_missing(left, profile.on_missing);
    let right = resolve_missing(right, profile.on_missing);

    use SensorSample::{Clear, Line};
    match (left, right) {
        (Some(Line), Some(Clear)) => MotionCommand::drive(profile.turn_speed, profile.max_speed),
        (Some(Clear), Some(Line)) => MotionCommand::drive(profile.max_speed, profile.turn_speed),
        (Some(Clear), Some(Clear)) => MotionCommand::drive(profile.max_speed, profile.max_speed),
        // both triggered, out-of-range value, or missing with the Stop policy
        _ => MotionCommand::stop(),
    }
}

// None = fall through to stop
fn resolve_missing(sample: SensorSample, on_missing: MissingSensor) -> Option<SensorSample> {
    match (sample, on_missing) {
        (SensorSample::Missing, MissingSensor::AssumeClear) => Some(SensorSample::Clear),
        (SensorSample::Missing, MissingSensor::Stop) | (SensorSample::Invalid, _) => None,
        (sample, _) => Some(sample),
    }
}
