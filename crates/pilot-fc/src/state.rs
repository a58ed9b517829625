use mavlink::common::{MavMessage, MavModeFlag, MavState, MavType, SYS_STATUS_DATA};
use pilot_proto::{Battery, FlightMode, Position};
use std::time::{Duration, Instant};

/// ArduCopter custom_mode numbers.
const COPTER_MODES: &[(u32, &str)] = &[
    (0, "STABILIZE"),
    (1, "ACRO"),
    (2, "ALT_HOLD"),
    (3, "AUTO"),
    (4, "GUIDED"),
    (5, "LOITER"),
    (6, "RTL"),
    (7, "CIRCLE"),
    (9, "LAND"),
    (16, "POSHOLD"),
    (17, "BRAKE"),
    (21, "SMART_RTL"),
];

pub fn copter_mode(custom_mode: u32) -> FlightMode {
    match COPTER_MODES.iter().find(|(n, _)| *n == custom_mode) {
        Some((_, name)) => FlightMode::from_name(name),
        None => FlightMode::Other(format!("MODE_{}", custom_mode)),
    }
}

pub fn copter_mode_number(mode: &FlightMode) -> Option<u32> {
    let name = match mode {
        FlightMode::Manual => "STABILIZE",
        other => other.name(),
    };
    COPTER_MODES.iter().find(|(_, n)| *n == name).map(|(num, _)| *num)
}

/// Last known vehicle attributes, folded from incoming messages.
#[derive(Debug, Clone)]
pub struct VehicleState {
    pub last_heartbeat: Option<Instant>,
    pub system_status: Option<MavState>,
    pub mode: FlightMode,
    pub armed: bool,
    pub gps_fix: u8,
    pub satellites: u8,
    pub position: Position,
    pub airspeed: f32,
    pub groundspeed: f32,
    pub battery: Battery,
    pub messages: u64,
}

impl Default for VehicleState {
    fn default() -> Self {
        Self {
            last_heartbeat: None,
            system_status: None,
            mode: FlightMode::Other("UNKNOWN".into()),
            armed: false,
            gps_fix: 0,
            satellites: 0,
            position: Position::default(),
            airspeed: 0.0,
            groundspeed: 0.0,
            battery: Battery::default(),
            messages: 0,
        }
    }
}

impl VehicleState {
    pub fn hb_age(&self) -> Option<Duration> {
        self.last_heartbeat.map(|t| t.elapsed())
    }

    pub fn is_stale(&self, after: Duration) -> bool {
        self.hb_age().map_or(true, |age| age > after)
    }

    /// Heartbeat is fresh, system finished booting and GPS has at least a 2D fix.
    pub fn is_armable(&self, stale_after: Duration) -> bool {
        let booted = matches!(self.system_status, Some(MavState::MAV_STATE_STANDBY) | Some(MavState::MAV_STATE_ACTIVE));
        !self.is_stale(stale_after) && booted && self.gps_fix >= 2
    }

    pub fn apply(&mut self, msg: &MavMessage) {
        self.messages += 1;
        match msg {
            MavMessage::HEARTBEAT(hb) => {
                if matches!(hb.mavtype, MavType::MAV_TYPE_GCS | MavType::MAV_TYPE_ONBOARD_CONTROLLER) {
                    return;
                }
                self.last_heartbeat = Some(Instant::now());
                self.system_status = Some(hb.system_status);
                self.armed = hb.base_mode.contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED);
                self.mode = copter_mode(hb.custom_mode);
            }
            MavMessage::GPS_RAW_INT(gps) => {
                self.gps_fix = (gps.fix_type as u8).min(3);
                self.satellites = gps.satellites_visible;
            }
            MavMessage::GLOBAL_POSITION_INT(pos) => {
                self.position = Position {
                    lat: pos.lat as f64 / 1e7,
                    lon: pos.lon as f64 / 1e7,
                    // relative_alt is in millimeters
                    alt: pos.relative_alt as f32 / 1000.0,
                };
            }
            MavMessage::VFR_HUD(hud) => {
                self.airspeed = hud.airspeed;
                self.groundspeed = hud.groundspeed;
            }
            MavMessage::SYS_STATUS(status) => self.update_battery(status),
            _ => {}
        }
    }

    fn update_battery(&mut self, status: &SYS_STATUS_DATA) {
        // millivolts, u16::MAX when unknown
        if status.voltage_battery != u16::MAX {
            self.battery.voltage = Some(status.voltage_battery as f32 / 1000.0);
        }
        // centiamps, -1 when unknown
        if status.current_battery != -1 {
            self.battery.current = Some(status.current_battery as f32 / 100.0);
        }
        if (0..=100).contains(&status.battery_remaining) {
            self.battery.level = Some(status.battery_remaining as u8);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mavlink::common::{MavAutopilot, GLOBAL_POSITION_INT_DATA, HEARTBEAT_DATA};

    fn heartbeat(custom_mode: u32, armed: bool) -> MavMessage {
        let mut base_mode = MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED;
        if armed {
            base_mode |= MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED;
        }
        MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            custom_mode,
            mavtype: MavType::MAV_TYPE_QUADROTOR,
            autopilot: MavAutopilot::MAV_AUTOPILOT_ARDUPILOTMEGA,
            base_mode,
            system_status: MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        })
    }

    #[test]
    fn heartbeat_sets_mode_and_armed_flag() {
        let mut st = VehicleState::default();
        st.apply(&heartbeat(4, true));
        assert_eq!(st.mode, FlightMode::Guided);
        assert!(st.armed);
        st.apply(&heartbeat(9, false));
        assert_eq!(st.mode, FlightMode::Land);
        assert!(!st.armed);
        assert!(!st.is_stale(Duration::from_secs(3)));
    }

    #[test]
    fn relative_altitude_is_converted_from_millimeters() {
        let mut st = VehicleState::default();
        st.apply(&MavMessage::GLOBAL_POSITION_INT(GLOBAL_POSITION_INT_DATA {
            time_boot_ms: 0,
            lat: 473_977_420,
            lon: 85_455_940,
            alt: 500_000,
            relative_alt: 12_500,
            vx: 0,
            vy: 0,
            vz: 0,
            hdg: 0,
        }));
        assert!((st.position.alt - 12.5).abs() < 1e-6);
        assert!((st.position.lat - 47.397742).abs() < 1e-9);
    }

    #[test]
    fn copter_mode_table_round_trips() {
        assert_eq!(copter_mode(6), FlightMode::Rtl);
        assert_eq!(copter_mode(0), FlightMode::Manual);
        assert_eq!(copter_mode(42), FlightMode::Other("MODE_42".into()));
        assert_eq!(copter_mode_number(&FlightMode::Guided), Some(4));
        assert_eq!(copter_mode_number(&FlightMode::Manual), Some(0));
        assert_eq!(copter_mode_number(&FlightMode::Other("LOITER".into())), Some(5));
        assert_eq!(copter_mode_number(&FlightMode::Other("WARP".into())), None);
    }

    #[test]
    fn never_armable_without_heartbeat() {
        let mut st = VehicleState::default();
        st.gps_fix = 3;
        assert!(!st.is_armable(Duration::from_secs(3)));
    }
}
