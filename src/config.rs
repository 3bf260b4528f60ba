// Protocol constants, connection defaults, speed tuning
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use crate::policy::{MissingSensor, SpeedProfile};

// Command-type codes defined by the board firmware
pub const CMD_BASE_FEEDBACK: u8 = 130; // request sensor feedback
pub const CMD_SPEED_CTRL: u8 = 1; // set wheel speeds

// Serial link
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUD: u32 = 115_200;
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1000;

// Bang-bang tuning (normalized wheel-speed fractions)
pub const MAX_SPEED: f64 = 0.5;
pub const TURN_SPEED: f64 = 0.3;

// Pause between the end of one command send and the next request
pub const CYCLE_DELAY_MS: u64 = 100;

/// Log filter from `RUST_LOG`, falling back to `default` when it is unset
pub fn log_filter(default: LevelFilter) -> EnvFilter {
    log_filter_from(default, &std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default())
}

fn log_filter_from(default: LevelFilter, directives: &str) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(default.into())
        .parse_lossy(directives)
}

/// How a reply without an `L` or `R` field is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum MissingSensorArg {
    /// Read a missing field as 0 (no line), like the board's stock script
    #[default]
    AssumeClear,
    /// Stop the robot until both fields are reported again
    Stop,
}

impl From<MissingSensorArg> for MissingSensor {
    fn from(arg: MissingSensorArg) -> Self {
        match arg {
            MissingSensorArg::AssumeClear => MissingSensor::AssumeClear,
            MissingSensorArg::Stop => MissingSensor::Stop,
        }
    }
}

/// Bang-bang line follower for a two-wheeled base driven over a JSON serial link
#[derive(Debug, Clone, Parser)]
#[command(name = "line-follower", version)]
pub struct Config {
    /// Serial device of the motor/sensor board
    #[arg(long, default_value = DEFAULT_PORT)]
    pub port: String,

    /// Baud rate of the serial link
    #[arg(long, default_value_t = DEFAULT_BAUD)]
    pub baud: u32,

    /// How long to wait for a feedback line, in milliseconds
    #[arg(long, default_value_t = DEFAULT_READ_TIMEOUT_MS)]
    pub read_timeout_ms: u64,

    /// Wheel speed when driving straight and for the outer wheel in turns
    #[arg(long, default_value_t = MAX_SPEED)]
    pub max_speed: f64,

    /// Wheel speed for the inner wheel in turns
    #[arg(long, default_value_t = TURN_SPEED)]
    pub turn_speed: f64,

    /// Delay between control cycles, in milliseconds
    #[arg(long, default_value_t = CYCLE_DELAY_MS)]
    pub cycle_delay_ms: u64,

    /// What to do when the board omits a sensor field
    #[arg(long, value_enum, default_value_t = MissingSensorArg::AssumeClear)]
    pub on_missing_sensor: MissingSensorArg,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            baud: DEFAULT_BAUD,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            max_speed: MAX_SPEED,
            turn_speed: TURN_SPEED,
            cycle_delay_ms: CYCLE_DELAY_MS,
            on_missing_sensor: MissingSensorArg::default(),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be a finite value in [0, 1], got {value}")]
    SpeedOutOfRange { name: &'static str, value: f64 },

    #[error("turn speed {turn} exceeds max speed {max}")]
    TurnAboveMax { turn: f64, max: f64 },
}

impl Config {
    /// Check speed settings before any I/O happens
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [("max speed", self.max_speed), ("turn speed", self.turn_speed)] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::SpeedOutOfRange { name, value });
            }
        }
        if self.turn_speed > self.max_speed {
            return Err(ConfigError::TurnAboveMax {
                turn: self.turn_speed,
                max: self.max_speed,
            });
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn cycle_delay(&self) -> Duration {
        Duration::from_millis(self.cycle_delay_ms)
    }

    pub fn speed_profile(&self) -> SpeedProfile {
        SpeedProfile {
            max_speed: self.max_speed,
            turn_speed: self.turn_speed,
            on_missing: self.on_missing_sensor.into(),
        }
    }
}
