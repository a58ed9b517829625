use pilot_proto::FlightMode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::telemetry::{LinkError, TelemetrySource};
use crate::wait::{CancelToken, Poll, WaitError};

/// Fraction of the target altitude that counts as "reached".
pub const ALTITUDE_REACHED_RATIO: f32 = 0.95;

/// Highest altitude above home any operation will accept, meters.
pub const MAX_ALTITUDE_M: f32 = 1_000.0;
/// Highest airspeed request passed to a vehicle, m/s.
pub const MAX_AIRSPEED_MS: f32 = 50.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FlightError {
    #[error("not connected to a vehicle")]
    NotConnected,
    #[error("GPS lock not acquired after {0:?}")]
    GpsLockTimeout(Duration),
    #[error("vehicle not armable after {0:?}")]
    NotArmableTimeout(Duration),
    #[error("failed to enter {mode} mode within {waited:?} (stuck in {current})")]
    ModeSwitchTimeout { mode: FlightMode, current: FlightMode, waited: Duration },
    #[error("vehicle did not arm within {0:?}")]
    ArmTimeout(Duration),
    #[error("climb stalled at {reached:.1}m of {target:.1}m after {waited:?}")]
    TakeoffTimeout { target: f32, reached: f32, waited: Duration },
    #[error("altitude {requested}m outside 0..={max}m")]
    AltitudeOutOfRange { requested: f32, max: f32 },
    #[error("operation cancelled")]
    Cancelled,
    #[error("mission: {0}")]
    Mission(String),
    #[error(transparent)]
    Link(#[from] LinkError),
}

/// Convergence timeouts. Every value has a default so a config section
/// may override any subset.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FlightLimits {
    pub poll_interval_ms: u64,
    pub gps_lock_timeout_ms: u64,
    pub armable_timeout_ms: u64,
    /// Pause after the vehicle reports armable, lets the backend finish init.
    pub settle_ms: u64,
    /// How long a plain mode request gets before the explicit fallback.
    pub mode_retry_after_ms: u64,
    pub mode_timeout_ms: u64,
    pub arm_timeout_ms: u64,
    pub goto_mode_timeout_ms: u64,
    pub mission_mode_timeout_ms: u64,
    /// Climb ceiling = base + per_meter * target.
    pub takeoff_base_timeout_ms: u64,
    pub takeoff_ms_per_meter: u64,
    /// Takeoff and goto targets above this are refused.
    pub max_altitude_m: f32,
}

impl Default for FlightLimits {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            gps_lock_timeout_ms: 30_000,
            armable_timeout_ms: 30_000,
            settle_ms: 2_000,
            mode_retry_after_ms: 1_000,
            mode_timeout_ms: 15_000,
            arm_timeout_ms: 15_000,
            goto_mode_timeout_ms: 5_000,
            mission_mode_timeout_ms: 5_000,
            takeoff_base_timeout_ms: 60_000,
            takeoff_ms_per_meter: 2_000,
            max_altitude_m: MAX_ALTITUDE_M,
        }
    }
}

impl FlightLimits {
    fn poll(&self, timeout_ms: u64) -> Poll {
        Poll::new(Duration::from_millis(self.poll_interval_ms), Duration::from_millis(timeout_ms))
    }

    pub fn takeoff_timeout(&self, target: f32) -> Duration {
        // float-to-int casts saturate, NaN maps to 0
        let per_meter = ((target.max(0.0) as f64) * self.takeoff_ms_per_meter as f64).round() as u64;
        Duration::from_millis(self.takeoff_base_timeout_ms.saturating_add(per_meter))
    }

    fn check_altitude(&self, requested: f32, allow_zero: bool) -> Result<(), FlightError> {
        let above_floor = if allow_zero { requested >= 0.0 } else { requested > 0.0 };
        if requested.is_finite() && above_floor && requested <= self.max_altitude_m {
            return Ok(());
        }
        let err = FlightError::AltitudeOutOfRange { requested, max: self.max_altitude_m };
        warn!("flight: {}", err);
        Err(err)
    }
}

/// Arm/takeoff/land/RTL/goto sequencing over any [`TelemetrySource`].
///
/// Holds no vehicle state: every operation reads and writes through the
/// source it is handed, and blocks the caller until it converges, times
/// out, or is cancelled.
#[derive(Debug, Clone, Default)]
pub struct FlightStateMachine {
    limits: FlightLimits,
}

impl FlightStateMachine {
    pub fn new(limits: FlightLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &FlightLimits {
        &self.limits
    }

    /// Returns the altitude reported once the climb converged.
    pub fn arm_and_takeoff(&self, src: &dyn TelemetrySource, target: f32, cancel: &CancelToken) -> Result<f32, FlightError> {
        ensure_connected(src)?;
        let l = &self.limits;
        l.check_altitude(target, false)?;

        info!("flight: waiting for GPS lock");
        l.poll(l.gps_lock_timeout_ms)
            .until(cancel, || {
                let fix = src.gps_fix_level();
                debug!("flight: gps fix={} sats={}", fix, src.satellites_visible());
                fix >= 3
            })
            .map_err(|e| on_wait(e, FlightError::GpsLockTimeout))?;
        info!("flight: GPS lock acquired (sats={})", src.satellites_visible());

        l.poll(l.armable_timeout_ms)
            .until(cancel, || src.is_armable())
            .map_err(|e| on_wait(e, FlightError::NotArmableTimeout))?;
        info!("flight: vehicle is armable, settling {}ms", l.settle_ms);
        if !cancel.sleep(Duration::from_millis(l.settle_ms)) {
            return Err(FlightError::Cancelled);
        }

        self.switch_mode(src, FlightMode::Guided, l.mode_timeout_ms, true, cancel)?;

        info!("flight: arming motors");
        src.request_armed(true)?;
        l.poll(l.arm_timeout_ms)
            .until(cancel, || src.is_armed())
            .map_err(|e| on_wait(e, FlightError::ArmTimeout))?;
        info!("flight: armed");

        info!("flight: taking off to {:.1}m", target);
        src.takeoff_to(target)?;
        let ceiling = l.takeoff_timeout(target);
        let threshold = target * ALTITUDE_REACHED_RATIO;
        l.poll(ceiling.as_millis() as u64)
            .until(cancel, || {
                let alt = src.altitude();
                debug!("flight: altitude {:.1}m", alt);
                alt >= threshold
            })
            .map_err(|e| {
                on_wait(e, |waited| FlightError::TakeoffTimeout { target, reached: src.altitude(), waited })
            })?;

        let reached = src.altitude();
        info!("flight: reached target altitude ({:.1}m)", reached);
        Ok(reached)
    }

    /// Accepted, not completed: returns once LAND has been requested.
    pub fn land(&self, src: &dyn TelemetrySource) -> Result<(), FlightError> {
        ensure_connected(src)?;
        info!("flight: landing");
        src.request_mode(&FlightMode::Land)?;
        Ok(())
    }

    pub fn return_to_launch(&self, src: &dyn TelemetrySource) -> Result<(), FlightError> {
        ensure_connected(src)?;
        info!("flight: returning to launch");
        src.request_mode(&FlightMode::Rtl)?;
        Ok(())
    }

    pub fn goto_location(&self, src: &dyn TelemetrySource, lat: f64, lon: f64, alt: f32, cancel: &CancelToken) -> Result<(), FlightError> {
        ensure_connected(src)?;
        self.limits.check_altitude(alt, true)?;
        self.switch_mode(src, FlightMode::Guided, self.limits.goto_mode_timeout_ms, false, cancel)?;
        info!("flight: going to lat={:.6} lon={:.6} alt={:.1}m", lat, lon, alt);
        src.goto_location(lat, lon, alt)?;
        Ok(())
    }

    pub fn set_airspeed(&self, src: &dyn TelemetrySource, speed: f32) -> Result<(), FlightError> {
        ensure_connected(src)?;
        info!("flight: setting airspeed to {:.1} m/s", speed);
        src.set_airspeed(speed)?;
        Ok(())
    }

    /// Switch to AUTO so an uploaded mission starts flying.
    pub fn start_mission(&self, src: &dyn TelemetrySource, cancel: &CancelToken) -> Result<(), FlightError> {
        ensure_connected(src)?;
        self.switch_mode(src, FlightMode::Auto, self.limits.mission_mode_timeout_ms, false, cancel)?;
        info!("flight: mission execution started");
        Ok(())
    }

    fn switch_mode(
        &self,
        src: &dyn TelemetrySource,
        mode: FlightMode,
        timeout_ms: u64,
        with_fallback: bool,
        cancel: &CancelToken,
    ) -> Result<(), FlightError> {
        if src.mode() == mode {
            return Ok(());
        }
        let l = &self.limits;
        info!("flight: requesting {} mode (current {})", mode, src.mode());
        src.request_mode(&mode)?;

        if with_fallback {
            match l.poll(l.mode_retry_after_ms).until(cancel, || src.mode() == mode) {
                Ok(_) => return Ok(()),
                Err(WaitError::Cancelled) => return Err(FlightError::Cancelled),
                Err(WaitError::TimedOut(_)) => {}
            }
            warn!("flight: {} not confirmed after {}ms, re-issuing explicit mode set", mode, l.mode_retry_after_ms);
            src.force_mode(&mode)?;
        }

        l.poll(timeout_ms)
            .until(cancel, || src.mode() == mode)
            .map_err(|e| {
                on_wait(e, |waited| FlightError::ModeSwitchTimeout { mode: mode.clone(), current: src.mode(), waited })
            })?;
        info!("flight: {} mode confirmed", mode);
        Ok(())
    }
}

fn ensure_connected(src: &dyn TelemetrySource) -> Result<(), FlightError> {
    if !src.is_connected() {
        return Err(FlightError::NotConnected);
    }
    Ok(())
}

fn on_wait<F: FnOnce(Duration) -> FlightError>(e: WaitError, timed_out: F) -> FlightError {
    match e {
        WaitError::Cancelled => FlightError::Cancelled,
        WaitError::TimedOut(waited) => {
            let err = timed_out(waited);
            warn!("flight: {}", err);
            err
        }
    }
}
