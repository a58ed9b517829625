use pilot_proto::status::StreamStats;
use pilot_proto::{Battery, FlightMode, Position};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LinkError {
    #[error("link not connected")]
    NotConnected,
    #[error("refusing command: no vehicle heartbeat seen yet")]
    NoHeartbeat,
    #[error("mode {0} not supported by this vehicle")]
    UnsupportedMode(String),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("send failed: {0}")]
    Send(String),
}

/// Read/request access to a vehicle.
///
/// Reads are best-effort snapshots with no atomicity across calls. Writes
/// are requests: callers re-poll the matching read to observe the effect.
pub trait TelemetrySource: Send + Sync {
    /// Short backend name for status output ("live", "sim").
    fn backend(&self) -> &'static str;

    fn is_connected(&self) -> bool;

    fn is_armable(&self) -> bool;
    /// 0 = no GPS, 1 = no fix, 2 = 2D, 3 = 3D or better.
    fn gps_fix_level(&self) -> u8;
    fn satellites_visible(&self) -> u8;

    fn mode(&self) -> FlightMode;
    fn request_mode(&self, mode: &FlightMode) -> Result<(), LinkError>;
    /// Lower-level mode set for backends that ignore `request_mode`.
    fn force_mode(&self, mode: &FlightMode) -> Result<(), LinkError> {
        self.request_mode(mode)
    }

    fn is_armed(&self) -> bool;
    fn request_armed(&self, armed: bool) -> Result<(), LinkError>;

    /// Meters above home.
    fn altitude(&self) -> f32;
    fn position(&self) -> Position;
    fn airspeed(&self) -> f32;
    fn groundspeed(&self) -> f32;
    fn battery(&self) -> Battery;

    fn takeoff_to(&self, altitude: f32) -> Result<(), LinkError>;
    fn goto_location(&self, lat: f64, lon: f64, alt: f32) -> Result<(), LinkError>;
    fn set_airspeed(&self, speed: f32) -> Result<(), LinkError>;

    /// Actuation stream statistics, for backends that stream.
    fn stream_stats(&self) -> Option<StreamStats> {
        None
    }

    /// Abort whatever maneuver the backend is running on the caller's behalf.
    fn interrupt(&self) {}

    fn close(&self) {}
}
