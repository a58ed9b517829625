use anyhow::Result;
use pilot_fc::{CancelToken, LinkError, TelemetrySource};
use pilot_proto::status::StreamStats;
use pilot_proto::{Battery, FlightMode, Position};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{info, warn};

use crate::ramp::{self, RampProfile};
use crate::stream::StreamingController;
use crate::{SimConfig, DEFAULT_RATE_HZ};

/// The simulator reports nothing back, so these are fixed.
pub const SIM_BATTERY: Battery = Battery { voltage: Some(12.6), level: Some(100), current: Some(5.0) };
pub const SIM_GPS_FIX: u8 = 3;
pub const SIM_SATELLITES: u8 = 10;

#[derive(Debug, Clone, PartialEq)]
struct SimState {
    altitude: f32,
    armed: bool,
    mode: FlightMode,
}

impl Default for SimState {
    fn default() -> Self {
        Self { altitude: 0.0, armed: false, mode: FlightMode::Manual }
    }
}

/// Telemetry for the streaming backend, derived from locally tracked state.
///
/// Maneuvers run as open-loop ramps on the caller's thread; altitude is
/// asserted when a ramp completes, never measured.
pub struct SimulatedTelemetry {
    stream: Arc<StreamingController>,
    ramp: RampProfile,
    state: Mutex<SimState>,
    cancel: Mutex<CancelToken>,
}

impl SimulatedTelemetry {
    /// Opens the UDP endpoint and starts streaming.
    pub fn open(cfg: &SimConfig) -> Result<Self> {
        let rate = cfg.rate_hz.unwrap_or(DEFAULT_RATE_HZ);
        let stream = StreamingController::new(cfg.target()?, rate)
            .with_join_timeout(Duration::from_millis(cfg.join_timeout_ms.unwrap_or(2_000)));
        stream.connect()?;
        Ok(Self::with_stream(Arc::new(stream), cfg.ramp.clone()))
    }

    pub fn with_stream(stream: Arc<StreamingController>, ramp: RampProfile) -> Self {
        Self {
            stream,
            ramp,
            state: Mutex::new(SimState::default()),
            cancel: Mutex::new(CancelToken::new()),
        }
    }

    pub fn stream(&self) -> &Arc<StreamingController> {
        &self.stream
    }

    pub fn hover(&self) {
        self.stream.hover();
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn token(&self) -> CancelToken {
        self.cancel.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn ensure_streaming(&self) -> Result<(), LinkError> {
        if !self.stream.is_running() {
            return Err(LinkError::NotConnected);
        }
        Ok(())
    }

    fn run_landing(&self) {
        let from = self.state().altitude;
        if ramp::land(&self.stream, &self.ramp, from, &self.token()) {
            let mut s = self.state();
            s.altitude = 0.0;
            s.armed = false;
            info!("sim: landed, disarmed");
        } else {
            warn!("sim: landing ramp interrupted at {:.1}m", from);
        }
    }
}

impl TelemetrySource for SimulatedTelemetry {
    fn backend(&self) -> &'static str {
        "sim"
    }

    fn is_connected(&self) -> bool {
        self.stream.is_running()
    }

    fn is_armable(&self) -> bool {
        self.stream.is_running()
    }

    fn gps_fix_level(&self) -> u8 {
        SIM_GPS_FIX
    }

    fn satellites_visible(&self) -> u8 {
        SIM_SATELLITES
    }

    fn mode(&self) -> FlightMode {
        self.state().mode.clone()
    }

    fn request_mode(&self, mode: &FlightMode) -> Result<(), LinkError> {
        self.ensure_streaming()?;
        self.state().mode = mode.clone();
        info!("sim: mode {}", mode);
        match mode {
            FlightMode::Land | FlightMode::Rtl => self.run_landing(),
            _ => {}
        }
        Ok(())
    }

    fn is_armed(&self) -> bool {
        self.state().armed
    }

    fn request_armed(&self, armed: bool) -> Result<(), LinkError> {
        self.ensure_streaming()?;
        if !armed {
            self.stream.hover();
        }
        self.state().armed = armed;
        info!("sim: {}", if armed { "armed" } else { "disarmed" });
        Ok(())
    }

    fn altitude(&self) -> f32 {
        self.state().altitude
    }

    fn position(&self) -> Position {
        Position { lat: 0.0, lon: 0.0, alt: self.altitude() }
    }

    fn airspeed(&self) -> f32 {
        0.0
    }

    fn groundspeed(&self) -> f32 {
        0.0
    }

    fn battery(&self) -> Battery {
        SIM_BATTERY
    }

    fn takeoff_to(&self, altitude: f32) -> Result<(), LinkError> {
        self.ensure_streaming()?;
        if !self.is_armed() {
            return Err(LinkError::Rejected("takeoff while disarmed".into()));
        }
        if altitude <= 0.0 || ramp::climb_time(&self.ramp, altitude).is_none() {
            return Err(LinkError::Rejected(format!("takeoff target {}m", altitude)));
        }
        if ramp::takeoff(&self.stream, &self.ramp, altitude, &self.token()) {
            self.state().altitude = altitude;
        } else {
            warn!("sim: takeoff ramp interrupted");
        }
        Ok(())
    }

    fn goto_location(&self, lat: f64, lon: f64, alt: f32) -> Result<(), LinkError> {
        self.ensure_streaming()?;
        if !alt.is_finite() || alt < 0.0 {
            return Err(LinkError::Rejected(format!("goto altitude {}m", alt)));
        }
        // no horizontal control on this backend
        info!("sim: goto lat={:.6} lon={:.6}, adjusting altitude only", lat, lon);
        let from = self.altitude();
        if ramp::change_altitude(&self.stream, &self.ramp, from, alt, &self.token()) {
            self.state().altitude = alt;
        }
        Ok(())
    }

    fn set_airspeed(&self, speed: f32) -> Result<(), LinkError> {
        self.ensure_streaming()?;
        info!("sim: airspeed {:.1} m/s requested, not modeled", speed);
        Ok(())
    }

    fn stream_stats(&self) -> Option<StreamStats> {
        Some(self.stream.stats())
    }

    fn interrupt(&self) {
        let mut token = self.cancel.lock().unwrap_or_else(|p| p.into_inner());
        token.cancel();
        *token = CancelToken::new();
    }

    fn close(&self) {
        self.interrupt();
        self.stream.hover();
        self.stream.disconnect();
    }
}
