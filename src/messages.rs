// Wire messages exchanged with the motor/sensor board
//
// Every message is one JSON object per line. The "T" field carries the
// command-type code the firmware dispatches on.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::config::{CMD_BASE_FEEDBACK, CMD_SPEED_CTRL};

// Controller -> board: ask for the current base feedback
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct FeedbackRequest {
    #[serde(rename = "T")]
    pub kind: u8,
}

impl Default for FeedbackRequest {
    fn default() -> Self {
        Self {
            kind: CMD_BASE_FEEDBACK,
        }
    }
}

// Controller -> board: set both wheel speeds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MotionCommand {
    #[serde(rename = "T")]
    pub kind: u8,
    #[serde(rename = "L")]
    pub left_speed: f64,
    #[serde(rename = "R")]
    pub right_speed: f64,
}

impl MotionCommand {
    pub fn drive(left_speed: f64, right_speed: f64) -> Self {
        Self {
            kind: CMD_SPEED_CTRL,
            left_speed,
            right_speed,
        }
    }

    pub fn stop() -> Self {
        Self::drive(0.0, 0.0)
    }

    pub fn is_stop(&self) -> bool {
        self.left_speed == 0.0 && self.right_speed == 0.0
    }
}

// Board -> controller: base feedback
// Only the line sensors matter here; any other field the firmware reports is ignored.
// Fields are kept as raw JSON so an out-of-range value can be told apart from a missing one.
// None = key absent; an explicit null stays Some(Value::Null).
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Feedback {
    #[serde(rename = "L", default, deserialize_with = "present")]
    pub left: Option<Value>,
    #[serde(rename = "R", default, deserialize_with = "present")]
    pub right: Option<Value>,
}

// Only called for keys that are present, so null is not collapsed into None
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// State of one binary line sensor as reported by the board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorSample {
    /// 0: no line under the sensor
    Clear,
    /// 1: line detected
    Line,
    /// Field absent from the reply
    Missing,
    /// Field present but neither 0 nor 1
    Invalid,
}

impl SensorSample {
    pub fn from_field(field: Option<&Value>) -> Self {
        let Some(value) = field else {
            return SensorSample::Missing;
        };
        match value.as_f64() {
            Some(v) if v == 0.0 => SensorSample::Clear,
            Some(v) if v == 1.0 => SensorSample::Line,
            _ => SensorSample::Invalid,
        }
    }
}

impl Feedback {
    /// Classify the (left, right) sensor readings
    pub fn samples(&self) -> (SensorSample, SensorSample) {
        (
            SensorSample::from_field(self.left.as_ref()),
            SensorSample::from_field(self.right.as_ref()),
        )
    }
}
