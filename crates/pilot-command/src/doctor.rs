use anyhow::Result;
use pilot_fc::mav::normalize_connection;
use pilot_fc::{FlightLimits, MAX_ALTITUDE_M};
use pilot_sim::stream::{MAX_RATE_HZ, MIN_RATE_HZ};
use pilot_sim::RampProfile;
use tracing::warn;

use crate::session::{Backend, SessionConfig};

pub fn check_session(cfg: &SessionConfig) -> Result<()> {
    match cfg.backend {
        Backend::Live => {
            let link = cfg.live.as_ref().ok_or_else(|| anyhow::anyhow!("backend=live needs a [live] section"))?;
            normalize_connection(&link.connection)?;
            anyhow::ensure!(link.send_heartbeat_hz.unwrap_or(1.0) > 0.0, "live.send_heartbeat_hz must be positive");
        }
        Backend::Sim => {
            let sim = cfg.sim.clone().unwrap_or_default();
            sim.target()?;
            if let Some(hz) = sim.rate_hz {
                if !(MIN_RATE_HZ..=MAX_RATE_HZ).contains(&hz) {
                    warn!("doctor: sim.rate_hz={} will be clamped to {}..{}", hz, MIN_RATE_HZ, MAX_RATE_HZ);
                }
            }
            check_ramp(&sim.ramp)?;
        }
    }
    check_limits(&cfg.flight)
}

pub fn check_limits(l: &FlightLimits) -> Result<()> {
    anyhow::ensure!(l.poll_interval_ms > 0, "flight.poll_interval_ms must be > 0");
    for (name, v) in [
        ("gps_lock_timeout_ms", l.gps_lock_timeout_ms),
        ("armable_timeout_ms", l.armable_timeout_ms),
        ("mode_timeout_ms", l.mode_timeout_ms),
        ("arm_timeout_ms", l.arm_timeout_ms),
        ("goto_mode_timeout_ms", l.goto_mode_timeout_ms),
        ("mission_mode_timeout_ms", l.mission_mode_timeout_ms),
        ("takeoff_base_timeout_ms", l.takeoff_base_timeout_ms),
    ] {
        anyhow::ensure!(v >= l.poll_interval_ms, "flight.{} shorter than one poll interval", name);
    }
    anyhow::ensure!(l.mode_retry_after_ms < l.mode_timeout_ms, "flight.mode_retry_after_ms must be below mode_timeout_ms");
    anyhow::ensure!(
        l.max_altitude_m > 0.0 && l.max_altitude_m <= MAX_ALTITUDE_M,
        "flight.max_altitude_m must be within (0, {}]",
        MAX_ALTITUDE_M
    );
    Ok(())
}

pub fn check_ramp(r: &RampProfile) -> Result<()> {
    anyhow::ensure!(r.climb_rate > 0.0 && r.descent_rate > 0.0 && r.ascend_rate > 0.0, "sim.ramp rates must be positive");
    anyhow::ensure!(r.climb_throttle > 0.0 && r.ascend_throttle > 0.0, "sim.ramp climb throttles must be positive");
    anyhow::ensure!(r.descent_throttle < 0.0, "sim.ramp.descent_throttle must be negative");
    anyhow::ensure!(r.spool_levels.iter().all(|l| (0.0..=1.0).contains(l)), "sim.ramp.spool_levels must be within 0..1");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_fc::LinkConfig;
    use pilot_sim::SimConfig;

    #[test]
    fn defaults_pass() {
        check_session(&SessionConfig::sim(SimConfig::default())).unwrap();
        check_session(&SessionConfig::live(LinkConfig::new("udp:127.0.0.1:14550"))).unwrap();
    }

    #[test]
    fn catches_bad_settings() {
        let cfg = SessionConfig { live: None, ..SessionConfig::live(LinkConfig::new("x")) };
        assert!(check_session(&cfg).is_err());

        let limits = FlightLimits { poll_interval_ms: 0, ..FlightLimits::default() };
        assert!(check_limits(&limits).is_err());
        for max_altitude_m in [0.0, f32::NAN, MAX_ALTITUDE_M + 1.0] {
            let limits = FlightLimits { max_altitude_m, ..FlightLimits::default() };
            assert!(check_limits(&limits).is_err(), "accepted ceiling {}", max_altitude_m);
        }

        let ramp = RampProfile { climb_rate: 0.0, ..RampProfile::default() };
        assert!(check_ramp(&ramp).is_err());
    }
}
