use anyhow::{Context, Result};
use pilot_proto::status::StreamStats;
use pilot_proto::ControlVector;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const MIN_RATE_HZ: f32 = 20.0;
pub const MAX_RATE_HZ: f32 = 50.0;

/// Overrun beyond the period that is worth a diagnostic.
const OVERRUN_MARGIN: Duration = Duration::from_millis(10);

pub fn clamp_rate(hz: f32) -> f32 {
    if hz.is_nan() {
        return crate::DEFAULT_RATE_HZ;
    }
    hz.clamp(MIN_RATE_HZ, MAX_RATE_HZ)
}

struct Shared {
    control: Mutex<ControlVector>,
    packets_sent: AtomicU64,
    packets_failed: AtomicU64,
    overruns: AtomicU64,
    last_send: Mutex<Option<Instant>>,
}

impl Shared {
    fn control(&self) -> MutexGuard<'_, ControlVector> {
        self.control.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Each loop owns its stop flag, so a loop abandoned on join timeout
/// cannot be revived by a later connect.
struct Worker {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
    done: mpsc::Receiver<()>,
}

/// Streams the current [`ControlVector`] to the simulator at a fixed rate.
///
/// The vector is the only state shared with the transmit loop and is only
/// touched under its mutex. The socket belongs to the controller and is
/// dropped after the loop stops (or is abandoned on join timeout).
pub struct StreamingController {
    target: SocketAddr,
    rate_hz: f32,
    period: Duration,
    join_timeout: Duration,
    shared: Arc<Shared>,
    socket: Mutex<Option<Arc<UdpSocket>>>,
    worker: Mutex<Option<Worker>>,
}

impl StreamingController {
    pub fn new(target: SocketAddr, rate_hz: f32) -> Self {
        let rate_hz = clamp_rate(rate_hz);
        Self {
            target,
            rate_hz,
            period: Duration::from_secs_f32(1.0 / rate_hz),
            join_timeout: Duration::from_secs(2),
            shared: Arc::new(Shared {
                control: Mutex::new(ControlVector::NEUTRAL),
                packets_sent: AtomicU64::new(0),
                packets_failed: AtomicU64::new(0),
                overruns: AtomicU64::new(0),
                last_send: Mutex::new(None),
            }),
            socket: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn rate_hz(&self) -> f32 {
        self.rate_hz
    }

    pub fn is_running(&self) -> bool {
        let worker = self.worker.lock().unwrap_or_else(|p| p.into_inner());
        worker.as_ref().is_some_and(|w| w.running.load(Ordering::Acquire))
    }

    /// Opens the endpoint and starts the transmit loop.
    pub fn connect(&self) -> Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(|p| p.into_inner());
        anyhow::ensure!(worker.is_none(), "stream to {} already running", self.target);

        info!("stream: opening UDP endpoint for {}", self.target);
        let bind = if self.target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind).context("bind UDP socket")?;
        socket.set_nonblocking(true).context("set UDP socket non-blocking")?;
        let socket = Arc::new(socket);

        let first = self.control().to_packet();
        match socket.send_to(first.as_bytes(), self.target) {
            Ok(_) => info!("stream: initial packet sent to {}", self.target),
            Err(e) => warn!("stream: initial packet failed (simulator may not be up yet): {}", e),
        }

        let running = Arc::new(AtomicBool::new(true));
        let (done_tx, done_rx) = mpsc::channel();
        let handle = {
            let running = running.clone();
            let shared = self.shared.clone();
            let socket = socket.clone();
            let target = self.target;
            let period = self.period;
            std::thread::Builder::new()
                .name("pilot-stream".into())
                .spawn(move || {
                    stream_loop(&shared, &running, &socket, target, period);
                    let _ = done_tx.send(());
                })
        };
        let handle = handle.context("spawn stream loop")?;

        *self.socket.lock().unwrap_or_else(|p| p.into_inner()) = Some(socket);
        *worker = Some(Worker { running, handle, done: done_rx });
        info!("stream: started at {:.0} Hz", self.rate_hz);
        Ok(())
    }

    /// Stops the loop with a bounded wait, then closes the endpoint.
    pub fn disconnect(&self) {
        let worker = self.worker.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(w) = worker {
            w.running.store(false, Ordering::Release);
            match w.done.recv_timeout(self.join_timeout) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    if w.handle.join().is_err() {
                        warn!("stream: transmit loop panicked");
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!("stream: loop did not stop within {:?}, abandoning it", self.join_timeout);
                }
            }
        }
        if self.socket.lock().unwrap_or_else(|p| p.into_inner()).take().is_some() {
            info!(
                "stream: disconnected ({} sent, {} failed)",
                self.shared.packets_sent.load(Ordering::Relaxed),
                self.shared.packets_failed.load(Ordering::Relaxed)
            );
        }
    }

    /// Replaces the vector; out-of-range values are clamped.
    pub fn set_control(&self, v: ControlVector) {
        *self.shared.control() = v.clamped();
    }

    pub fn set_throttle(&self, throttle: f32) {
        self.set_control(ControlVector::throttle(throttle));
    }

    /// Neutral attitude, zero throttle: the simulator holds altitude.
    pub fn hover(&self) {
        self.set_control(ControlVector::NEUTRAL);
    }

    pub fn control(&self) -> ControlVector {
        *self.shared.control()
    }

    pub fn stats(&self) -> StreamStats {
        let last = *self.shared.last_send.lock().unwrap_or_else(|p| p.into_inner());
        StreamStats {
            running: self.is_running(),
            rate_hz: self.rate_hz,
            packets_sent: self.shared.packets_sent.load(Ordering::Relaxed),
            packets_failed: self.shared.packets_failed.load(Ordering::Relaxed),
            overruns: self.shared.overruns.load(Ordering::Relaxed),
            since_last_send_ms: last.map(|t| t.elapsed().as_millis() as u64),
            control: self.control(),
        }
    }
}

impl Drop for StreamingController {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn stream_loop(shared: &Shared, running: &AtomicBool, socket: &UdpSocket, target: SocketAddr, period: Duration) {
    debug!("stream: loop started, period {:?}", period);
    while running.load(Ordering::Acquire) {
        let tick = Instant::now();
        let packet = shared.control().to_packet();

        // no retry within a tick: the next snapshot supersedes this one
        match socket.send_to(packet.as_bytes(), target) {
            Ok(_) => {
                let n = shared.packets_sent.fetch_add(1, Ordering::Relaxed) + 1;
                *shared.last_send.lock().unwrap_or_else(|p| p.into_inner()) = Some(Instant::now());
                if n % 100 == 0 {
                    debug!("stream: sent {} packets", n);
                }
            }
            Err(e) => {
                let n = shared.packets_failed.fetch_add(1, Ordering::Relaxed) + 1;
                if n == 1 || n % 50 == 0 {
                    warn!("stream: packet send failed (total {}): {}", n, e);
                }
            }
        }

        let elapsed = tick.elapsed();
        if elapsed < period {
            std::thread::sleep(period - elapsed);
        } else if elapsed > period + OVERRUN_MARGIN {
            shared.overruns.fetch_add(1, Ordering::Relaxed);
            warn!("stream: tick took {:.1}ms (period {:.1}ms), dropping it", elapsed.as_secs_f32() * 1e3, period.as_secs_f32() * 1e3);
        }
    }
    debug!("stream: loop stopped");
}
