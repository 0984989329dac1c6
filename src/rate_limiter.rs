use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};

use crate::server_config::cfg;

/// Process-wide pacing gate for outbound model calls.
///
/// Every caller passes through `acquire`, which suspends until at least the
/// configured interval has elapsed since the previous acquire completed,
/// then stamps the new "last call" time. The timestamp lives behind a
/// `tokio::sync::Mutex` that is held across the delay, so concurrent
/// callers serialize in FIFO wakeup order and cannot under-delay each other
/// by racing the read-modify-write.
#[derive(Clone)]
pub struct RateLimiter {
    last_call: Arc<Mutex<Option<Instant>>>,
    interval: Duration,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            last_call: Arc::new(Mutex::new(None)),
            interval,
        }
    }

    pub fn from_config() -> Self {
        Self::new(Duration::from_millis(cfg.api.min_request_interval_ms))
    }

    pub async fn acquire(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(prev) = *last_call {
            let elapsed = prev.elapsed();
            if elapsed < self.interval {
                sleep(self.interval - elapsed).await;
            }
        }
        *last_call = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sequential_acquires_are_spaced_by_interval() {
        let limiter = RateLimiter::new(Duration::from_millis(1000));

        let mut stamps = Vec::new();
        for _ in 0..4 {
            limiter.acquire().await;
            stamps.push(Instant::now());
        }

        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(1000));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_acquire_returns_immediately() {
        let limiter = RateLimiter::new(Duration::from_millis(1000));
        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_acquires_serialize() {
        let limiter = RateLimiter::new(Duration::from_millis(500));
        let stamps = Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..3 {
            let limiter = limiter.clone();
            let stamps = stamps.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                stamps.lock().unwrap().push(Instant::now());
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut stamps = stamps.lock().unwrap().clone();
        stamps.sort();
        assert_eq!(stamps.len(), 3);
        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(500));
        }
    }
}
