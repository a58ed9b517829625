pub mod flight;
pub mod mav;
pub mod mission;
pub mod state;
pub mod telemetry;
pub mod wait;

pub use flight::{FlightError, FlightLimits, FlightStateMachine, MAX_AIRSPEED_MS, MAX_ALTITUDE_M};
pub use mission::MissionUploader;
pub use telemetry::{LinkError, TelemetrySource};
pub use wait::{CancelToken, Poll, WaitError};

use serde::Deserialize;

/// Live autopilot link (MAVLink).
#[derive(Debug, Clone, Deserialize)]
pub struct LinkConfig {
    /// Connection string. Examples:
    /// "udp:127.0.0.1:14550" (listen), "tcp:127.0.0.1:5760" (client),
    /// "serial:/dev/ttyACM0:57600", or a bare device path.
    pub connection: String,

    /// MAVLink ids we use (ground side)
    #[serde(default = "default_sys_id")]
    pub sys_id: u8,
    #[serde(default = "default_comp_id")]
    pub comp_id: u8,

    /// target system/component (autopilot side). 1/1 is common for ArduPilot.
    #[serde(default = "default_target")]
    pub target_sys: u8,
    #[serde(default = "default_target")]
    pub target_comp: u8,

    /// How long connect waits for the first vehicle heartbeat. Default 10s.
    pub heartbeat_timeout_ms: Option<u64>,

    /// Refuse to send commands until a vehicle heartbeat has been seen
    #[serde(default = "default_true")]
    pub require_heartbeat: bool,

    /// Companion heartbeat send rate. Default 1 Hz.
    pub send_heartbeat_hz: Option<f32>,

    /// Readings older than this are reported as stale. Default 3s.
    pub stale_after_ms: Option<u64>,
}

impl LinkConfig {
    pub fn new(connection: impl Into<String>) -> Self {
        Self {
            connection: connection.into(),
            sys_id: default_sys_id(),
            comp_id: default_comp_id(),
            target_sys: default_target(),
            target_comp: default_target(),
            heartbeat_timeout_ms: None,
            require_heartbeat: true,
            send_heartbeat_hz: None,
            stale_after_ms: None,
        }
    }
}

fn default_sys_id() -> u8 { 255 }
fn default_comp_id() -> u8 { 190 }
fn default_target() -> u8 { 1 }
fn default_true() -> bool { true }
