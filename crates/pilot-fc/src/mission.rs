use pilot_proto::Mission;

use crate::flight::FlightError;

/// Collaborator that carries a mission to the vehicle. Encoding is up to
/// the implementation; the session only sequences upload, execute, and the
/// switch to AUTO.
pub trait MissionUploader: Send + Sync {
    fn upload(&self, mission: &Mission) -> Result<(), FlightError>;
    fn execute(&self) -> Result<(), FlightError>;
}
