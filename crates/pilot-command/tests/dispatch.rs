use pilot_command::{Backend, ControlSession, FunctionDispatcher};
use pilot_fc::{FlightError, FlightLimits, LinkError, MissionUploader, TelemetrySource};
use pilot_proto::{Battery, FlightMode, FunctionCall, Mission, Position, Waypoint};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Cooperative vehicle that records every request it receives.
#[derive(Default)]
struct Recorder {
    mode: Mutex<FlightMode>,
    armed: Mutex<bool>,
    altitude: Mutex<f32>,
    mode_requests: Mutex<Vec<FlightMode>>,
    arm_requests: AtomicU32,
    takeoffs: AtomicU32,
    gotos: Mutex<Vec<(f64, f64, f32)>>,
    airspeeds: Mutex<Vec<f32>>,
}

impl Recorder {
    fn requests(&self) -> u32 {
        self.mode_requests.lock().unwrap().len() as u32
            + self.arm_requests.load(Ordering::SeqCst)
            + self.takeoffs.load(Ordering::SeqCst)
            + self.gotos.lock().unwrap().len() as u32
            + self.airspeeds.lock().unwrap().len() as u32
    }
}

impl TelemetrySource for Recorder {
    fn backend(&self) -> &'static str { "fake" }
    fn is_connected(&self) -> bool { true }
    fn is_armable(&self) -> bool { true }
    fn gps_fix_level(&self) -> u8 { 3 }
    fn satellites_visible(&self) -> u8 { 12 }
    fn mode(&self) -> FlightMode { self.mode.lock().unwrap().clone() }

    fn request_mode(&self, mode: &FlightMode) -> Result<(), LinkError> {
        self.mode_requests.lock().unwrap().push(mode.clone());
        *self.mode.lock().unwrap() = mode.clone();
        Ok(())
    }

    fn is_armed(&self) -> bool { *self.armed.lock().unwrap() }

    fn request_armed(&self, armed: bool) -> Result<(), LinkError> {
        self.arm_requests.fetch_add(1, Ordering::SeqCst);
        *self.armed.lock().unwrap() = armed;
        Ok(())
    }

    fn altitude(&self) -> f32 { *self.altitude.lock().unwrap() }
    fn position(&self) -> Position { Position { lat: 47.39, lon: 8.54, alt: self.altitude() } }
    fn airspeed(&self) -> f32 { 0.0 }
    fn groundspeed(&self) -> f32 { 0.0 }
    fn battery(&self) -> Battery { Battery { voltage: Some(12.1), level: Some(87), current: None } }

    fn takeoff_to(&self, altitude: f32) -> Result<(), LinkError> {
        self.takeoffs.fetch_add(1, Ordering::SeqCst);
        *self.altitude.lock().unwrap() = altitude;
        Ok(())
    }

    fn goto_location(&self, lat: f64, lon: f64, alt: f32) -> Result<(), LinkError> {
        self.gotos.lock().unwrap().push((lat, lon, alt));
        Ok(())
    }

    fn set_airspeed(&self, speed: f32) -> Result<(), LinkError> {
        self.airspeeds.lock().unwrap().push(speed);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingUploader {
    uploads: Mutex<Vec<Mission>>,
    executes: AtomicU32,
}

impl MissionUploader for RecordingUploader {
    fn upload(&self, mission: &Mission) -> Result<(), FlightError> {
        self.uploads.lock().unwrap().push(mission.clone());
        Ok(())
    }

    fn execute(&self) -> Result<(), FlightError> {
        self.executes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn fast() -> FlightLimits {
    FlightLimits {
        poll_interval_ms: 2,
        settle_ms: 1,
        mode_retry_after_ms: 10,
        mode_timeout_ms: 50,
        arm_timeout_ms: 50,
        goto_mode_timeout_ms: 50,
        mission_mode_timeout_ms: 50,
        ..FlightLimits::default()
    }
}

fn setup() -> (Arc<Recorder>, FunctionDispatcher) {
    let v = Arc::new(Recorder::default());
    let session = ControlSession::with_source(Backend::Live, fast(), v.clone());
    (v, FunctionDispatcher::new(Arc::new(session)))
}

#[test]
fn land_directive_invokes_land_exactly_once() {
    let (v, d) = setup();
    let res = d.dispatch_text("EXECUTE_FUNCTION: land\nARGUMENTS: {}").unwrap();
    assert!(res.success, "{:?}", res);
    assert_eq!(res.message, "Landing initiated");
    assert_eq!(*v.mode_requests.lock().unwrap(), vec![FlightMode::Land]);
    assert_eq!(v.requests(), 1);
}

#[test]
fn unknown_function_invokes_nothing() {
    let (v, d) = setup();
    let res = d.dispatch_text("EXECUTE_FUNCTION: do_a_flip\nARGUMENTS: {}").unwrap();
    assert!(!res.success);
    assert_eq!(res.error.as_deref(), Some("Unknown function: do_a_flip"));
    assert_eq!(v.requests(), 0);
}

#[test]
fn takeoff_without_altitude_invokes_nothing() {
    let (v, d) = setup();
    let res = d.dispatch_text("EXECUTE_FUNCTION: arm_and_takeoff\nARGUMENTS: {\"speed\": 3}").unwrap();
    assert!(!res.success);
    assert_eq!(res.error.as_deref(), Some("Missing altitude parameter"));
    assert_eq!(v.requests(), 0);
}

#[test]
fn takeoff_directive_flies_the_full_sequence() {
    let (v, d) = setup();
    let res = d.dispatch(&FunctionCall::new("arm_and_takeoff").arg("altitude", 15));
    assert!(res.success, "{:?}", res);
    assert_eq!(v.mode(), FlightMode::Guided);
    assert!(v.is_armed());
    assert_eq!(v.takeoffs.load(Ordering::SeqCst), 1);
    assert_eq!(res.data, Some(serde_json::json!({ "altitude": 15.0 })));
}

#[test]
fn goto_and_airspeed_pass_arguments_through() {
    let (v, d) = setup();
    let res = d.dispatch_text(
        "EXECUTE_FUNCTION: goto_location\nARGUMENTS: {\"latitude\": 47.5, \"longitude\": 8.25, \"altitude\": 40}",
    );
    assert!(res.unwrap().success);
    assert_eq!(*v.gotos.lock().unwrap(), vec![(47.5, 8.25, 40.0)]);

    let res = d.dispatch(&FunctionCall::new("set_airspeed").arg("speed", 6.5)).message;
    assert_eq!(res, "Airspeed set to 6.5 m/s");
    assert_eq!(*v.airspeeds.lock().unwrap(), vec![6.5]);
}

#[test]
fn status_reports_vehicle_readings() {
    let (_v, d) = setup();
    let res = d.dispatch(&FunctionCall::new("get_status"));
    assert!(res.success);
    let data = res.data.unwrap();
    assert_eq!(data["connection"], "connected");
    assert_eq!(data["mode"], "MANUAL");
    assert_eq!(data["battery"]["level"], 87);
    assert_eq!(data["satellites"], 12);
}

#[test]
fn text_without_directive_is_not_dispatched() {
    let (v, d) = setup();
    assert!(d.dispatch_text("I can't do that right now.").is_none());
    assert_eq!(v.requests(), 0);
}

#[test]
fn flight_failures_come_back_as_results() {
    let d = FunctionDispatcher::new(Arc::new(ControlSession::new(pilot_command::SessionConfig::sim(Default::default()))));
    let res = d.dispatch(&FunctionCall::new("land"));
    assert!(!res.success);
    assert_eq!(res.error.as_deref(), Some("not connected to a vehicle"));
}

#[test]
fn mission_reaches_the_uploader_unchanged() {
    let wps = vec![
        Waypoint::new(47.397742, 8.545594, 20.0, 0.0).unwrap(),
        Waypoint::new(47.398, 8.546, 25.5, 3.0).unwrap(),
        Waypoint::new(-33.856784, 151.215297, 10.0, 1.5).unwrap(),
    ];
    for n in [0, 1, 3] {
        let v = Arc::new(Recorder::default());
        let up = Arc::new(RecordingUploader::default());
        let session = ControlSession::with_source(Backend::Live, fast(), v.clone());
        session.set_uploader(up.clone());

        let mission = Mission::new(wps[..n].to_vec()).unwrap();
        session.execute_mission(&mission).unwrap();

        let uploads = up.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].waypoints, wps[..n].to_vec());
        assert_eq!(up.executes.load(Ordering::SeqCst), 1);
        assert_eq!(v.mode(), FlightMode::Auto);
    }
}

#[test]
fn mission_without_uploader_fails_cleanly() {
    let v = Arc::new(Recorder::default());
    let session = ControlSession::with_source(Backend::Live, fast(), v.clone());
    let err = session.execute_mission(&Mission::default()).unwrap_err();
    assert!(matches!(err, FlightError::Mission(_)));
    assert_eq!(v.requests(), 0);
}
