use anyhow::{Context, Result};
use mavlink::{
    common::{
        MavAutopilot, MavCmd, MavFrame, MavMessage, MavModeFlag, MavState, MavType, COMMAND_INT_DATA,
        COMMAND_LONG_DATA, HEARTBEAT_DATA,
    },
    MavConnection, MavHeader,
};
use pilot_proto::{Battery, FlightMode, Position};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::state::{copter_mode_number, VehicleState};
use crate::telemetry::{LinkError, TelemetrySource};
use crate::LinkConfig;

const DEFAULT_SERIAL_BAUD: u32 = 57600;

/// Maps operator-facing connection strings onto mavlink connection URLs.
pub fn normalize_connection(s: &str) -> Result<String> {
    let s = s.trim();
    anyhow::ensure!(!s.is_empty(), "empty connection string");
    for passthrough in ["udpin:", "udpout:", "udpbcast:", "tcpin:", "tcpout:", "serial:"] {
        if s.starts_with(passthrough) {
            return Ok(s.to_string());
        }
    }
    if let Some(rest) = s.strip_prefix("udp:") {
        return Ok(format!("udpin:{}", rest));
    }
    if let Some(rest) = s.strip_prefix("tcp:") {
        return Ok(format!("tcpout:{}", rest));
    }
    if s.starts_with('/') || s.to_ascii_uppercase().starts_with("COM") {
        return Ok(format!("serial:{}:{}", s, DEFAULT_SERIAL_BAUD));
    }
    anyhow::bail!("unrecognized connection string: {}", s)
}

fn serial_target(url: &str) -> Option<(String, u32)> {
    let rest = url.strip_prefix("serial:")?;
    let (dev, baud) = rest.rsplit_once(':')?;
    Some((dev.to_string(), baud.parse().ok()?))
}

struct Link {
    conn: Arc<dyn MavConnection<MavMessage> + Send + Sync>,
    hdr: Mutex<MavHeader>,
}

impl Link {
    fn send(&self, msg: MavMessage) -> Result<(), LinkError> {
        let hdr = {
            let mut hdr = self.hdr.lock().unwrap_or_else(|p| p.into_inner());
            hdr.sequence = hdr.sequence.wrapping_add(1);
            hdr.clone()
        };
        self.conn.send(&hdr, &msg).map_err(|e| LinkError::Send(e.to_string()))?;
        Ok(())
    }

    fn send_heartbeat(&self) -> Result<(), LinkError> {
        let hb = HEARTBEAT_DATA {
            custom_mode: 0,
            mavtype: MavType::MAV_TYPE_GCS,
            autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
            base_mode: MavModeFlag::empty(),
            system_status: MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        };
        self.send(MavMessage::HEARTBEAT(hb))
    }
}

/// Live vehicle backed by a MAVLink autopilot.
///
/// A reader thread folds incoming messages into [`VehicleState`] and sends
/// the ground-station heartbeat; reads are served from that snapshot.
pub struct MavTelemetry {
    link: Arc<Link>,
    target_sys: u8,
    target_comp: u8,
    require_heartbeat: bool,
    stale_after: Duration,
    state: Arc<Mutex<VehicleState>>,
    running: Arc<AtomicBool>,
    stale_logged: AtomicBool,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl MavTelemetry {
    pub fn open(cfg: &LinkConfig) -> Result<Self> {
        let url = normalize_connection(&cfg.connection)?;

        // quick validate device
        if let Some((dev, baud)) = serial_target(&url) {
            let _ = tokio_serial::new(&dev, baud)
                .open()
                .with_context(|| format!("open autopilot serial device {}", dev))?;
        }

        info!("mav: connecting to {}", url);
        let conn = mavlink::connect::<MavMessage>(&url).with_context(|| format!("mavlink connect {}", url))?;
        let conn: Arc<dyn MavConnection<MavMessage> + Send + Sync> = Arc::from(conn);

        let link = Arc::new(Link {
            conn,
            hdr: Mutex::new(MavHeader { system_id: cfg.sys_id, component_id: cfg.comp_id, sequence: 0 }),
        });
        let state = Arc::new(Mutex::new(VehicleState::default()));
        let running = Arc::new(AtomicBool::new(true));

        let hb_hz = cfg.send_heartbeat_hz.unwrap_or(1.0).max(0.2);
        let hb_interval = Duration::from_secs_f32(1.0 / hb_hz);
        let reader = {
            let link = link.clone();
            let state = state.clone();
            let running = running.clone();
            let target_sys = cfg.target_sys;
            std::thread::Builder::new()
                .name("pilot-mav-rx".into())
                .spawn(move || reader_loop(link, state, running, target_sys, hb_interval))
                .context("spawn mavlink reader")?
        };

        let me = Self {
            link,
            target_sys: cfg.target_sys,
            target_comp: cfg.target_comp,
            require_heartbeat: cfg.require_heartbeat,
            stale_after: Duration::from_millis(cfg.stale_after_ms.unwrap_or(3_000)),
            state,
            running,
            stale_logged: AtomicBool::new(false),
            reader: Mutex::new(Some(reader)),
        };

        let hb_timeout = Duration::from_millis(cfg.heartbeat_timeout_ms.unwrap_or(10_000));
        let start = Instant::now();
        while start.elapsed() < hb_timeout {
            if me.read().last_heartbeat.is_some() {
                info!("mav: vehicle heartbeat after {}ms", start.elapsed().as_millis());
                break;
            }
            std::thread::sleep(Duration::from_millis(25));
        }
        if me.read().last_heartbeat.is_none() {
            warn!("mav: no vehicle heartbeat within {:?}, continuing", hb_timeout);
        }
        Ok(me)
    }

    /// Snapshot of the vehicle. A poisoned lock or stale feed degrades the
    /// reading (logged once per episode) instead of failing the caller.
    fn read(&self) -> VehicleState {
        let st = lock_state(&self.state).clone();
        if st.last_heartbeat.is_some() && st.is_stale(self.stale_after) {
            if !self.stale_logged.swap(true, Ordering::Relaxed) {
                warn!("mav: telemetry stale (last heartbeat {:?} ago)", st.hb_age());
            }
        } else {
            self.stale_logged.store(false, Ordering::Relaxed);
        }
        st
    }

    fn ensure_commandable(&self) -> Result<(), LinkError> {
        if !self.running.load(Ordering::Acquire) {
            return Err(LinkError::NotConnected);
        }
        if self.require_heartbeat && self.read().last_heartbeat.is_none() {
            return Err(LinkError::NoHeartbeat);
        }
        Ok(())
    }

    fn command_long(&self, command: MavCmd, p: [f32; 7]) -> Result<(), LinkError> {
        self.ensure_commandable()?;
        debug!("mav: COMMAND_LONG {:?} {:?}", command, p);
        self.link.send(MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
            target_system: self.target_sys,
            target_component: self.target_comp,
            command,
            confirmation: 0,
            param1: p[0],
            param2: p[1],
            param3: p[2],
            param4: p[3],
            param5: p[4],
            param6: p[5],
            param7: p[6],
        }))
    }

    fn command_int(&self, command: MavCmd, frame: MavFrame, p: [f32; 4], x: i32, y: i32, z: f32) -> Result<(), LinkError> {
        self.ensure_commandable()?;
        debug!("mav: COMMAND_INT {:?} {:?} x={} y={} z={}", command, p, x, y, z);
        self.link.send(MavMessage::COMMAND_INT(COMMAND_INT_DATA {
            param1: p[0],
            param2: p[1],
            param3: p[2],
            param4: p[3],
            x,
            y,
            z,
            command,
            target_system: self.target_sys,
            target_component: self.target_comp,
            frame,
            current: 0,
            autocontinue: 0,
        }))
    }

    fn custom_mode(mode: &FlightMode) -> Result<f32, LinkError> {
        copter_mode_number(mode)
            .map(|n| n as f32)
            .ok_or_else(|| LinkError::UnsupportedMode(mode.to_string()))
    }
}

fn lock_state(state: &Mutex<VehicleState>) -> MutexGuard<'_, VehicleState> {
    state.lock().unwrap_or_else(|p| {
        warn!("mav: vehicle state lock poisoned, using last values");
        p.into_inner()
    })
}

fn reader_loop(
    link: Arc<Link>,
    state: Arc<Mutex<VehicleState>>,
    running: Arc<AtomicBool>,
    target_sys: u8,
    hb_interval: Duration,
) {
    let mut last_hb_send: Option<Instant> = None;
    while running.load(Ordering::Acquire) {
        if last_hb_send.map_or(true, |t| t.elapsed() >= hb_interval) {
            if let Err(e) = link.send_heartbeat() {
                debug!("mav: heartbeat send failed: {}", e);
            }
            last_hb_send = Some(Instant::now());
        }

        match link.conn.recv() {
            Ok((hdr, msg)) => {
                if hdr.system_id != target_sys {
                    continue;
                }
                lock_state(&state).apply(&msg);
            }
            Err(e) => {
                debug!("mav: recv failed: {:?}", e);
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    }
    debug!("mav: reader stopped");
}

impl TelemetrySource for MavTelemetry {
    fn backend(&self) -> &'static str {
        "live"
    }

    fn is_connected(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn is_armable(&self) -> bool {
        self.read().is_armable(self.stale_after)
    }

    fn gps_fix_level(&self) -> u8 {
        self.read().gps_fix
    }

    fn satellites_visible(&self) -> u8 {
        self.read().satellites
    }

    fn mode(&self) -> FlightMode {
        self.read().mode
    }

    fn request_mode(&self, mode: &FlightMode) -> Result<(), LinkError> {
        let custom = Self::custom_mode(mode)?;
        let enabled = MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED.bits() as f32;
        info!("mav: set mode {}", mode);
        self.command_long(MavCmd::MAV_CMD_DO_SET_MODE, [enabled, custom, 0.0, 0.0, 0.0, 0.0, 0.0])
    }

    /// Same mode change carried in COMMAND_INT, for autopilots that drop
    /// the COMMAND_LONG form.
    fn force_mode(&self, mode: &FlightMode) -> Result<(), LinkError> {
        let custom = Self::custom_mode(mode)?;
        let enabled = MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED.bits() as f32;
        info!("mav: set mode {} (explicit)", mode);
        self.command_int(MavCmd::MAV_CMD_DO_SET_MODE, MavFrame::MAV_FRAME_GLOBAL, [enabled, custom, 0.0, 0.0], 0, 0, 0.0)
    }

    fn is_armed(&self) -> bool {
        self.read().armed
    }

    fn request_armed(&self, armed: bool) -> Result<(), LinkError> {
        let p1 = if armed { 1.0 } else { 0.0 };
        self.command_long(MavCmd::MAV_CMD_COMPONENT_ARM_DISARM, [p1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0])
    }

    fn altitude(&self) -> f32 {
        self.read().position.alt
    }

    fn position(&self) -> Position {
        self.read().position
    }

    fn airspeed(&self) -> f32 {
        self.read().airspeed
    }

    fn groundspeed(&self) -> f32 {
        self.read().groundspeed
    }

    fn battery(&self) -> Battery {
        self.read().battery
    }

    fn takeoff_to(&self, altitude: f32) -> Result<(), LinkError> {
        self.command_long(MavCmd::MAV_CMD_NAV_TAKEOFF, [0.0, 0.0, 0.0, f32::NAN, 0.0, 0.0, altitude])
    }

    fn goto_location(&self, lat: f64, lon: f64, alt: f32) -> Result<(), LinkError> {
        // param1 = ground speed (-1 default), param4 = yaw (NaN keeps current)
        self.command_int(
            MavCmd::MAV_CMD_DO_REPOSITION,
            MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT,
            [-1.0, 0.0, 0.0, f32::NAN],
            (lat * 1e7).round() as i32,
            (lon * 1e7).round() as i32,
            alt,
        )
    }

    fn set_airspeed(&self, speed: f32) -> Result<(), LinkError> {
        // param1 = 0 (airspeed), param3 = -1 (throttle unchanged)
        self.command_long(MavCmd::MAV_CMD_DO_CHANGE_SPEED, [0.0, speed, -1.0, 0.0, 0.0, 0.0, 0.0])
    }

    /// The reader thread may be parked in a blocking recv; it exits on the
    /// next message after the flag drops and is not joined here.
    fn close(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            info!("mav: closing link");
        }
        let _ = self.reader.lock().unwrap_or_else(|p| p.into_inner()).take();
    }
}

impl Drop for MavTelemetry {
    fn drop(&mut self) {
        self.close();
    }
}
