//! Minimum-spacing limiter for outbound request starts.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Hands out request start slots at least `interval` apart.
///
/// Slots are reserved under a lock and awaited outside it, so callers queue
/// in reservation order without holding the lock while sleeping.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until the caller may start a request.
    pub async fn acquire(&self) {
        if self.interval.is_zero() {
            return;
        }

        let slot = {
            let mut next = self.next_slot.lock().await;
            let slot = (*next).max(Instant::now());
            *next = slot + self.interval;
            slot
        };

        tokio::time::sleep_until(slot).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn zero_interval_never_waits() {
        let limiter = RateLimiter::new(Duration::ZERO);
        let start = std::time::Instant::now();
        for _ in 0..100 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn spaces_concurrent_callers() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(40)));
        let start = std::time::Instant::now();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                start.elapsed()
            }));
        }

        let mut starts = Vec::new();
        for handle in handles {
            starts.push(handle.await.unwrap());
        }
        starts.sort();

        // First slot is immediate, the fourth at least three intervals later.
        assert!(starts[3] >= Duration::from_millis(120));
    }
}
