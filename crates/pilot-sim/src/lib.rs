pub mod mission;
pub mod ramp;
pub mod stream;
pub mod vehicle;

pub use mission::SimMissionStore;
pub use ramp::RampProfile;
pub use stream::StreamingController;
pub use vehicle::SimulatedTelemetry;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::{SocketAddr, ToSocketAddrs};
use tracing::warn;

pub const DEFAULT_RATE_HZ: f32 = 30.0;

/// Headless simulator fed by a UDP actuation stream.
#[derive(Debug, Clone, Deserialize)]
pub struct SimConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transmit rate, clamped to 20..50 Hz. Default 30.
    pub rate_hz: Option<f32>,

    /// Bounded wait for the transmit loop on disconnect. Default 2000.
    pub join_timeout_ms: Option<u64>,

    #[serde(default)]
    pub ramp: RampProfile,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port(), rate_hz: None, join_timeout_ms: None, ramp: RampProfile::default() }
    }
}

impl SimConfig {
    /// Accepts "sim" for defaults or "udp:host:port".
    pub fn from_connection(conn: &str) -> Self {
        let mut cfg = SimConfig::default();
        let conn = conn.trim();
        if conn.is_empty() || conn == "sim" {
            return cfg;
        }
        let rest = conn.strip_prefix("udp:").unwrap_or(conn);
        let mut parts = rest.splitn(2, ':');
        if let Some(host) = parts.next().filter(|h| !h.is_empty()) {
            cfg.host = host.to_string();
        }
        if let Some(port) = parts.next() {
            match port.parse() {
                Ok(p) => cfg.port = p,
                Err(_) => warn!("sim: invalid port {:?} in connection string, using {}", port, cfg.port),
            }
        }
        cfg
    }

    pub fn target(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .with_context(|| format!("resolve sim endpoint {}:{}", self.host, self.port))?
            .next()
            .with_context(|| format!("no address for {}:{}", self.host, self.port))
    }
}

fn default_host() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 9000 }
