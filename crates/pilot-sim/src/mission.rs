use pilot_fc::{FlightError, MissionUploader};
use pilot_proto::Mission;
use std::sync::Mutex;
use tracing::info;

/// Mission collaborator for the streaming backend: keeps the last upload
/// in memory. The simulator has no mission protocol.
#[derive(Debug, Default)]
pub struct SimMissionStore {
    uploaded: Mutex<Option<Mission>>,
}

impl SimMissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uploaded(&self) -> Option<Mission> {
        self.uploaded.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl MissionUploader for SimMissionStore {
    fn upload(&self, mission: &Mission) -> Result<(), FlightError> {
        info!("sim: stored mission with {} waypoints", mission.len());
        *self.uploaded.lock().unwrap_or_else(|p| p.into_inner()) = Some(mission.clone());
        Ok(())
    }

    fn execute(&self) -> Result<(), FlightError> {
        match &*self.uploaded.lock().unwrap_or_else(|p| p.into_inner()) {
            Some(m) => {
                info!("sim: executing mission ({} waypoints)", m.len());
                Ok(())
            }
            None => Err(FlightError::Mission("no mission uploaded".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_proto::Waypoint;

    #[test]
    fn execute_needs_an_upload() {
        let store = SimMissionStore::new();
        assert!(matches!(store.execute(), Err(FlightError::Mission(_))));
        let m = Mission::new(vec![Waypoint::new(47.1, 8.5, 20.0, 0.0).unwrap()]).unwrap();
        store.upload(&m).unwrap();
        store.execute().unwrap();
        assert_eq!(store.uploaded(), Some(m));
    }
}
