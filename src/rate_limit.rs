use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// Single-slot spacing limiter for outgoing provider calls.
///
/// One instance is built per verifier and shared by the detect and compare
/// paths. Each caller reserves the next free slot under the lock and then
/// sleeps outside it, so concurrent callers within the process are spaced
/// `min_interval` apart. There is no cross-process coordination.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    /// Wait until the caller may issue its request.
    pub async fn acquire(&self) {
        let slot = self.reserve();
        let now = Instant::now();
        if slot > now {
            tracing::debug!(wait_ms = (slot - now).as_millis() as u64, "rate limiter delaying request");
            sleep_until(slot).await;
        }
    }

    fn reserve(&self) -> Instant {
        let now = Instant::now();
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            // a panicked holder cannot leave the timestamp half-written
            Err(poisoned) => poisoned.into_inner(),
        };
        let slot = match *last {
            Some(prev) if prev + self.min_interval > now => prev + self.min_interval,
            _ => now,
        };
        *last = Some(slot);
        slot
    }
}
