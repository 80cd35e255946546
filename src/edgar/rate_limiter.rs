use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces the fixed minimum delay the filing host asks for between
/// requests. Deliberately a flat sleep rather than a token bucket: fetches
/// against EDGAR are sequential in this design, so a single "time of last
/// request" is all the state needed.
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        RateLimiter {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Waits until at least `min_interval` has passed since the previous
    /// acquisition, then records the new request time.
    pub async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.min_interval;
            if Instant::now() < ready_at {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        // SEC allows 10 req/s; 150ms keeps us comfortably under.
        Self::new(Duration::from_millis(150))
    }
}
