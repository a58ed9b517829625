use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Cooperative cancellation shared between an operation and whoever may
/// abort it. Sleeping through the token wakes immediately on cancel.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, cv) = &*self.inner;
        *flag.lock().unwrap_or_else(|p| p.into_inner()) = true;
        cv.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Sleeps for `dur`. Returns false if the token was cancelled first.
    pub fn sleep(&self, dur: Duration) -> bool {
        let (flag, cv) = &*self.inner;
        // past the clock's range only a cancel ends the sleep
        let deadline = Instant::now().checked_add(dur);
        let mut cancelled = flag.lock().unwrap_or_else(|p| p.into_inner());
        loop {
            if *cancelled {
                return false;
            }
            cancelled = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return true;
                    }
                    cv.wait_timeout(cancelled, deadline - now).unwrap_or_else(|p| p.into_inner()).0
                }
                None => cv.wait(cancelled).unwrap_or_else(|p| p.into_inner()),
            };
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error("cancelled")]
    Cancelled,
}

/// Bounded retry: re-check a condition every `interval` until it holds,
/// `timeout` elapses, or the token is cancelled.
#[derive(Debug, Clone, Copy)]
pub struct Poll {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Poll {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Returns how long it took for `cond` to hold.
    pub fn until<F: FnMut() -> bool>(&self, cancel: &CancelToken, mut cond: F) -> Result<Duration, WaitError> {
        let start = Instant::now();
        loop {
            if cancel.is_cancelled() {
                return Err(WaitError::Cancelled);
            }
            if cond() {
                return Ok(start.elapsed());
            }
            let elapsed = start.elapsed();
            if elapsed >= self.timeout {
                return Err(WaitError::TimedOut(elapsed));
            }
            let nap = self.interval.min(self.timeout - elapsed);
            if !cancel.sleep(nap) {
                return Err(WaitError::Cancelled);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn returns_immediately_when_condition_holds() {
        let p = Poll::new(Duration::from_secs(1), Duration::from_secs(5));
        let waited = p.until(&CancelToken::new(), || true).unwrap();
        assert!(waited < Duration::from_millis(50));
    }

    #[test]
    fn converges_after_a_few_polls() {
        let calls = AtomicU32::new(0);
        let p = Poll::new(Duration::from_millis(5), Duration::from_secs(2));
        p.until(&CancelToken::new(), || calls.fetch_add(1, Ordering::SeqCst) >= 3).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn times_out_close_to_the_bound() {
        let p = Poll::new(Duration::from_millis(20), Duration::from_millis(150));
        let start = Instant::now();
        let err = p.until(&CancelToken::new(), || false).unwrap_err();
        let took = start.elapsed();
        assert!(matches!(err, WaitError::TimedOut(_)));
        assert!(took >= Duration::from_millis(150));
        assert!(took < Duration::from_millis(600), "took {:?}", took);
    }

    #[test]
    fn cancel_interrupts_a_long_wait() {
        let token = CancelToken::new();
        let t2 = token.clone();
        let h = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            t2.cancel();
        });
        let start = Instant::now();
        let err = Poll::new(Duration::from_secs(5), Duration::from_secs(30)).until(&token, || false).unwrap_err();
        h.join().unwrap();
        assert_eq!(err, WaitError::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn unbounded_sleep_still_wakes_on_cancel() {
        let token = CancelToken::new();
        let t2 = token.clone();
        let h = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            t2.cancel();
        });
        let start = Instant::now();
        assert!(!token.sleep(Duration::MAX));
        h.join().unwrap();
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
