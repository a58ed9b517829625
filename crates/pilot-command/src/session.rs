use anyhow::{Context, Result};
use pilot_fc::mav::MavTelemetry;
use pilot_fc::{CancelToken, FlightError, FlightLimits, FlightStateMachine, LinkConfig, MissionUploader, TelemetrySource};
use pilot_proto::{ConnectionState, Mission, VehicleStatus};
use pilot_sim::{SimConfig, SimMissionStore, SimulatedTelemetry};
use serde::Deserialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// MAVLink autopilot (SITL or hardware).
    Live,
    /// Headless simulator fed by the actuation stream.
    Sim,
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Live => "live",
            Backend::Sim => "sim",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub backend: Backend,
    pub live: Option<LinkConfig>,
    pub sim: Option<SimConfig>,
    #[serde(default)]
    pub flight: FlightLimits,
}

impl SessionConfig {
    pub fn sim(sim: SimConfig) -> Self {
        Self { backend: Backend::Sim, live: None, sim: Some(sim), flight: FlightLimits::default() }
    }

    pub fn live(link: LinkConfig) -> Self {
        Self { backend: Backend::Live, live: Some(link), sim: None, flight: FlightLimits::default() }
    }
}

/// Explicit handle for one vehicle connection. Every operation goes
/// through it; there is no process-wide controller.
///
/// Operations block the calling thread. `cancel` may be called from any
/// other thread to abort the wait in progress.
pub struct ControlSession {
    cfg: SessionConfig,
    fsm: FlightStateMachine,
    state: Mutex<ConnectionState>,
    source: Mutex<Option<Arc<dyn TelemetrySource>>>,
    uploader: Mutex<Option<Arc<dyn MissionUploader>>>,
    cancel: Mutex<CancelToken>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| {
        warn!("session: recovering poisoned lock");
        p.into_inner()
    })
}

impl ControlSession {
    pub fn new(cfg: SessionConfig) -> Self {
        let fsm = FlightStateMachine::new(cfg.flight.clone());
        Self {
            cfg,
            fsm,
            state: Mutex::new(ConnectionState::Disconnected),
            source: Mutex::new(None),
            uploader: Mutex::new(None),
            cancel: Mutex::new(CancelToken::new()),
        }
    }

    /// Session over an already-connected source.
    pub fn with_source(backend: Backend, limits: FlightLimits, source: Arc<dyn TelemetrySource>) -> Self {
        let cfg = SessionConfig { backend, live: None, sim: None, flight: limits };
        let session = Self::new(cfg);
        *lock(&session.source) = Some(source);
        *lock(&session.state) = ConnectionState::Connected;
        session
    }

    /// Attach the mission-upload collaborator. The sim backend installs an
    /// in-memory store on connect if none is attached.
    pub fn set_uploader(&self, uploader: Arc<dyn MissionUploader>) {
        *lock(&self.uploader) = Some(uploader);
    }

    pub fn backend(&self) -> Backend {
        self.cfg.backend
    }

    pub fn connection_state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.source).as_ref().map(|s| s.is_connected()).unwrap_or(false)
    }

    pub fn connect(&self) -> Result<()> {
        if lock(&self.source).is_some() {
            info!("session: already connected");
            return Ok(());
        }
        *lock(&self.state) = ConnectionState::Connecting;
        info!("session: connecting ({} backend)", self.cfg.backend.name());

        match self.open_source() {
            Ok(src) => {
                *lock(&self.source) = Some(src);
                *lock(&self.state) = ConnectionState::Connected;
                info!("session: connected");
                Ok(())
            }
            Err(e) => {
                *lock(&self.state) = ConnectionState::Failed;
                warn!("session: connect failed: {:#}", e);
                Err(e)
            }
        }
    }

    fn open_source(&self) -> Result<Arc<dyn TelemetrySource>> {
        match self.cfg.backend {
            Backend::Live => {
                let link = self.cfg.live.as_ref().context("no [live] config section")?;
                Ok(Arc::new(MavTelemetry::open(link).context("open MAVLink link")?))
            }
            Backend::Sim => {
                let sim = self.cfg.sim.clone().unwrap_or_default();
                let src = SimulatedTelemetry::open(&sim).context("open simulator stream")?;
                let mut uploader = lock(&self.uploader);
                if uploader.is_none() {
                    *uploader = Some(Arc::new(SimMissionStore::new()));
                }
                Ok(Arc::new(src))
            }
        }
    }

    pub fn disconnect(&self) {
        self.cancel();
        let src = lock(&self.source).take();
        if let Some(src) = src {
            src.close();
            info!("session: disconnected");
        }
        *lock(&self.state) = ConnectionState::Disconnected;
    }

    /// Abort the in-flight wait or ramp. Later operations get a fresh token.
    pub fn cancel(&self) {
        {
            let mut token = lock(&self.cancel);
            token.cancel();
            *token = CancelToken::new();
        }
        let src = lock(&self.source).clone();
        if let Some(src) = src {
            src.interrupt();
        }
        info!("session: cancel requested");
    }

    fn source(&self) -> Result<Arc<dyn TelemetrySource>, FlightError> {
        lock(&self.source).clone().ok_or(FlightError::NotConnected)
    }

    fn token(&self) -> CancelToken {
        lock(&self.cancel).clone()
    }

    pub fn arm_and_takeoff(&self, altitude: f32) -> Result<f32, FlightError> {
        let src = self.source()?;
        self.fsm.arm_and_takeoff(src.as_ref(), altitude, &self.token())
    }

    pub fn land(&self) -> Result<(), FlightError> {
        let src = self.source()?;
        self.fsm.land(src.as_ref())
    }

    pub fn return_to_launch(&self) -> Result<(), FlightError> {
        let src = self.source()?;
        self.fsm.return_to_launch(src.as_ref())
    }

    pub fn goto_location(&self, lat: f64, lon: f64, alt: f32) -> Result<(), FlightError> {
        let src = self.source()?;
        self.fsm.goto_location(src.as_ref(), lat, lon, alt, &self.token())
    }

    pub fn set_airspeed(&self, speed: f32) -> Result<(), FlightError> {
        let src = self.source()?;
        self.fsm.set_airspeed(src.as_ref(), speed)
    }

    /// Upload, execute, then switch to AUTO.
    pub fn execute_mission(&self, mission: &Mission) -> Result<(), FlightError> {
        let src = self.source()?;
        let uploader = lock(&self.uploader)
            .clone()
            .ok_or_else(|| FlightError::Mission("no mission uploader attached".into()))?;
        info!("session: uploading mission ({} waypoints)", mission.len());
        uploader.upload(mission)?;
        uploader.execute()?;
        self.fsm.start_mission(src.as_ref(), &self.token())
    }

    pub fn status(&self) -> VehicleStatus {
        let ts_unix_ms = (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;
        let connection = self.connection_state();
        let backend = self.cfg.backend.name().to_string();
        let src = lock(&self.source).clone();
        match src {
            Some(src) => VehicleStatus {
                ts_unix_ms,
                connection,
                backend,
                mode: src.mode(),
                armed: src.is_armed(),
                altitude: src.altitude(),
                battery: src.battery(),
                position: src.position(),
                gps_fix: src.gps_fix_level(),
                satellites: src.satellites_visible(),
                airspeed: src.airspeed(),
                groundspeed: src.groundspeed(),
                stream: src.stream_stats(),
            },
            None => VehicleStatus {
                ts_unix_ms,
                connection,
                backend,
                mode: Default::default(),
                armed: false,
                altitude: 0.0,
                battery: Default::default(),
                position: Default::default(),
                gps_fix: 0,
                satellites: 0,
                airspeed: 0.0,
                groundspeed: 0.0,
                stream: None,
            },
        }
    }
}

impl Drop for ControlSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}
