use serde::{Deserialize, Serialize};
use std::fmt;

use crate::control::ControlVector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Disconnected
    }
}

/// Autopilot mode as seen by the operator. Modes without a dedicated
/// variant keep their backend name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum FlightMode {
    Manual,
    Guided,
    Auto,
    Land,
    Rtl,
    Other(String),
}

impl FlightMode {
    pub fn name(&self) -> &str {
        match self {
            FlightMode::Manual => "MANUAL",
            FlightMode::Guided => "GUIDED",
            FlightMode::Auto => "AUTO",
            FlightMode::Land => "LAND",
            FlightMode::Rtl => "RTL",
            FlightMode::Other(s) => s,
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "MANUAL" | "STABILIZE" => FlightMode::Manual,
            "GUIDED" => FlightMode::Guided,
            "AUTO" => FlightMode::Auto,
            "LAND" => FlightMode::Land,
            "RTL" => FlightMode::Rtl,
            other => FlightMode::Other(other.to_string()),
        }
    }
}

impl Default for FlightMode {
    fn default() -> Self {
        FlightMode::Manual
    }
}

impl fmt::Display for FlightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<FlightMode> for String {
    fn from(m: FlightMode) -> String {
        m.name().to_string()
    }
}

impl From<String> for FlightMode {
    fn from(s: String) -> FlightMode {
        FlightMode::from_name(&s)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Battery {
    pub voltage: Option<f32>, // Volts
    pub level: Option<u8>,    // Percent 0-100
    pub current: Option<f32>, // Amps
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
    /// meters, relative to home
    pub alt: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamStats {
    pub running: bool,
    pub rate_hz: f32,
    pub packets_sent: u64,
    pub packets_failed: u64,
    pub overruns: u64,
    pub since_last_send_ms: Option<u64>,
    pub control: ControlVector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleStatus {
    pub ts_unix_ms: i64,
    pub connection: ConnectionState,
    pub backend: String,
    pub mode: FlightMode,
    pub armed: bool,
    pub altitude: f32,
    pub battery: Battery,
    pub position: Position,
    pub gps_fix: u8,
    pub satellites: u8,
    pub airspeed: f32,
    pub groundspeed: f32,
    pub stream: Option<StreamStats>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_names_round_trip_through_strings() {
        for m in [FlightMode::Manual, FlightMode::Guided, FlightMode::Auto, FlightMode::Land, FlightMode::Rtl] {
            assert_eq!(FlightMode::from_name(m.name()), m);
        }
        assert_eq!(FlightMode::from_name("stabilize"), FlightMode::Manual);
        assert_eq!(FlightMode::from_name("LOITER"), FlightMode::Other("LOITER".into()));
    }

    #[test]
    fn mode_serializes_as_plain_string() {
        let s = serde_json::to_string(&FlightMode::Guided).unwrap();
        assert_eq!(s, "\"GUIDED\"");
        let m: FlightMode = serde_json::from_str("\"ALT_HOLD\"").unwrap();
        assert_eq!(m, FlightMode::Other("ALT_HOLD".into()));
    }
}
