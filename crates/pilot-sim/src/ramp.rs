//! Open-loop throttle profiles for maneuvers the simulator cannot be
//! commanded to do directly. Each ramp blocks the caller, returns `false`
//! if cancelled partway, and always leaves the stream hovering.

use pilot_fc::CancelToken;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::stream::StreamingController;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RampProfile {
    /// Motor spool-up steps before the climb.
    pub spool_levels: Vec<f32>,
    pub spool_step_ms: u64,
    pub climb_throttle: f32,
    /// Assumed climb rate at `climb_throttle`, m/s.
    pub climb_rate: f32,
    pub descent_throttle: f32,
    pub descent_rate: f32,
    pub min_descent_ms: u64,
    pub flare_throttle: f32,
    pub flare_ms: u64,
    pub ascend_throttle: f32,
    pub ascend_rate: f32,
    /// Altitude changes smaller than this are ignored, meters.
    pub altitude_deadband: f32,
}

impl Default for RampProfile {
    fn default() -> Self {
        Self {
            spool_levels: vec![0.2, 0.4, 0.6, 0.7],
            spool_step_ms: 500,
            climb_throttle: 0.6,
            climb_rate: 0.6,
            descent_throttle: -0.3,
            descent_rate: 0.3,
            min_descent_ms: 5_000,
            flare_throttle: -0.1,
            flare_ms: 2_000,
            ascend_throttle: 0.5,
            ascend_rate: 0.5,
            altitude_deadband: 0.5,
        }
    }
}

/// Time to cover `meters` at `rate`. Zero for nothing to cover, `None`
/// when the result is not a representable duration.
pub fn travel_time(meters: f32, rate: f32) -> Option<Duration> {
    let secs = meters / rate;
    if secs.is_nan() {
        return None;
    }
    if secs <= 0.0 {
        return Some(Duration::ZERO);
    }
    Duration::try_from_secs_f32(secs).ok()
}

/// Climb time for a takeoff to `target`, if the ramp can fly it.
pub fn climb_time(p: &RampProfile, target: f32) -> Option<Duration> {
    travel_time(target, p.climb_rate)
}

/// Returns the stream to hover when a ramp exits, whichever way it exits.
struct HoverOnExit<'a>(&'a StreamingController);

impl Drop for HoverOnExit<'_> {
    fn drop(&mut self) {
        self.0.hover();
    }
}

fn hold(stream: &StreamingController, throttle: f32, dur: Duration, cancel: &CancelToken) -> bool {
    stream.set_throttle(throttle);
    cancel.sleep(dur)
}

pub fn takeoff(stream: &StreamingController, p: &RampProfile, target: f32, cancel: &CancelToken) -> bool {
    let _hover = HoverOnExit(stream);
    let Some(climb) = climb_time(p, target) else {
        warn!("sim: cannot ramp to {}m", target);
        return false;
    };
    info!("sim: spooling motors");
    for &level in &p.spool_levels {
        debug!("sim: spool throttle {:.1}", level);
        if !hold(stream, level, Duration::from_millis(p.spool_step_ms), cancel) {
            return false;
        }
    }
    info!("sim: climbing to {:.1}m ({:.1}s)", target, climb.as_secs_f32());
    hold(stream, p.climb_throttle, climb, cancel)
}

pub fn land(stream: &StreamingController, p: &RampProfile, from: f32, cancel: &CancelToken) -> bool {
    let _hover = HoverOnExit(stream);
    let Some(descent) = travel_time(from, p.descent_rate) else {
        warn!("sim: cannot ramp down from {}m", from);
        return false;
    };
    let descent = descent.max(Duration::from_millis(p.min_descent_ms));
    info!("sim: descending from {:.1}m ({:.1}s)", from, descent.as_secs_f32());
    hold(stream, p.descent_throttle, descent, cancel)
        && hold(stream, p.flare_throttle, Duration::from_millis(p.flare_ms), cancel)
}

pub fn change_altitude(stream: &StreamingController, p: &RampProfile, from: f32, to: f32, cancel: &CancelToken) -> bool {
    let delta = to - from;
    if delta.abs() <= p.altitude_deadband {
        return true;
    }
    let _hover = HoverOnExit(stream);
    let (throttle, rate) = if delta > 0.0 {
        (p.ascend_throttle, p.ascend_rate)
    } else {
        (p.descent_throttle, p.descent_rate)
    };
    let Some(dur) = travel_time(delta.abs(), rate) else {
        warn!("sim: cannot ramp {}m -> {}m", from, to);
        return false;
    };
    info!("sim: adjusting altitude {:.1}m -> {:.1}m ({:.1}s)", from, to, dur.as_secs_f32());
    hold(stream, throttle, dur, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_proto::ControlVector;
    use std::time::Instant;

    fn quick() -> RampProfile {
        RampProfile {
            spool_levels: vec![0.2, 0.7],
            spool_step_ms: 5,
            climb_rate: 100.0,
            descent_rate: 100.0,
            ascend_rate: 100.0,
            min_descent_ms: 5,
            flare_ms: 5,
            ..RampProfile::default()
        }
    }

    fn stream() -> StreamingController {
        StreamingController::new("127.0.0.1:9".parse().unwrap(), 30.0)
    }

    #[test]
    fn travel_time_guards_bad_input() {
        assert_eq!(travel_time(6.0, 0.6), Some(Duration::from_secs_f32(6.0 / 0.6)));
        assert_eq!(travel_time(-1.0, 0.5), Some(Duration::ZERO));
        assert_eq!(travel_time(0.0, 0.5), Some(Duration::ZERO));
        assert_eq!(travel_time(5.0, 0.0), None);
        assert_eq!(travel_time(f32::NAN, 0.5), None);
        assert_eq!(travel_time(1e20, 0.6), None);
        assert_eq!(travel_time(f32::INFINITY, 0.6), None);
    }

    #[test]
    fn unflyable_takeoff_never_leaves_throttle_applied() {
        let s = stream();
        s.set_throttle(0.7);
        assert!(!takeoff(&s, &quick(), f32::INFINITY, &CancelToken::new()));
        assert_eq!(s.control(), ControlVector::NEUTRAL);

        // slow enough that 1e20m overflows a Duration
        let p = RampProfile { climb_rate: 1e-20, ..quick() };
        assert!(!takeoff(&s, &p, 1e20, &CancelToken::new()));
        assert_eq!(s.control(), ControlVector::NEUTRAL);

        s.set_throttle(-0.3);
        assert!(!land(&s, &quick(), f32::NAN, &CancelToken::new()));
        assert_eq!(s.control(), ControlVector::NEUTRAL);
        assert!(!change_altitude(&s, &quick(), 0.0, f32::INFINITY, &CancelToken::new()));
        assert_eq!(s.control(), ControlVector::NEUTRAL);
    }

    #[test]
    fn ramp_hovers_even_when_unwinding() {
        let s = stream();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _hover = HoverOnExit(&s);
            s.set_throttle(0.7);
            panic!("fault mid-ramp");
        }));
        assert!(res.is_err());
        assert_eq!(s.control(), ControlVector::NEUTRAL);
    }

    #[test]
    fn ramps_end_hovering() {
        let s = stream();
        let c = CancelToken::new();
        assert!(takeoff(&s, &quick(), 10.0, &c));
        assert_eq!(s.control(), ControlVector::NEUTRAL);
        assert!(land(&s, &quick(), 10.0, &c));
        assert_eq!(s.control(), ControlVector::NEUTRAL);
        assert!(change_altitude(&s, &quick(), 10.0, 20.0, &c));
        assert_eq!(s.control(), ControlVector::NEUTRAL);
    }

    #[test]
    fn small_altitude_change_is_skipped() {
        let s = stream();
        s.set_throttle(0.3);
        assert!(change_altitude(&s, &quick(), 10.0, 10.4, &CancelToken::new()));
        // untouched
        assert_eq!(s.control().throttle, 0.3);
    }

    #[test]
    fn cancel_stops_ramp_and_hovers() {
        let s = stream();
        let c = CancelToken::new();
        let c2 = c.clone();
        let h = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            c2.cancel();
        });
        let start = Instant::now();
        let p = RampProfile { spool_step_ms: 5_000, ..quick() };
        assert!(!takeoff(&s, &p, 10.0, &c));
        h.join().unwrap();
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(s.control(), ControlVector::NEUTRAL);
    }
}
