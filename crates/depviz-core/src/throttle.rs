//! Token-bucket limiter for render requests

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

pub const DEFAULT_CAPACITY: u32 = 10;
pub const DEFAULT_RATE: f64 = 10.0;

#[derive(Debug)]
struct Bucket {
    /// Negative when callers have reserved tokens that are not refilled yet.
    tokens: f64,
    updated: Instant,
}

/// Bounds the rate of expensive work. Callers wait for a token and are never rejected.
#[derive(Debug)]
pub struct Throttle {
    capacity: f64,
    rate: f64,
    bucket: Mutex<Bucket>,
}

impl Throttle {
    /// A full bucket of `capacity` tokens refilled at `rate` tokens per second.
    pub fn new(capacity: u32, rate: f64) -> Self {
        Throttle {
            capacity: f64::from(capacity),
            rate,
            bucket: Mutex::new(Bucket {
                tokens: f64::from(capacity),
                updated: Instant::now(),
            }),
        }
    }

    /// Take one token, sleeping until it has been refilled if the bucket is empty.
    pub async fn acquire(&self) {
        let wait = {
            let mut bucket = self.bucket.lock().await;
            let now = Instant::now();
            let elapsed = now.duration_since(bucket.updated).as_secs_f64();
            bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.capacity);
            bucket.updated = now;

            bucket.tokens -= 1.0;
            if bucket.tokens >= 0.0 {
                Duration::ZERO
            } else {
                Duration::from_secs_f64(-bucket.tokens / self.rate)
            }
        };

        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    /// Tokens currently available, after refill.
    pub async fn available(&self) -> f64 {
        let bucket = self.bucket.lock().await;
        let elapsed = Instant::now().duration_since(bucket.updated).as_secs_f64();
        (bucket.tokens + elapsed * self.rate).min(self.capacity)
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_eleventh_request_waits() {
        let throttle = Throttle::default();
        let start = Instant::now();

        for _ in 0..10 {
            throttle.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);

        throttle.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(99));
        assert!(start.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refills_over_time() {
        let throttle = Throttle::default();
        for _ in 0..10 {
            throttle.acquire().await;
        }
        assert!(throttle.available().await < 1.0);

        tokio::time::sleep(Duration::from_millis(500)).await;
        let available = throttle.available().await;
        assert!((available - 5.0).abs() < 0.01, "available {}", available);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(throttle.available().await, 10.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_waiters_are_spread_out() {
        let throttle = Arc::new(Throttle::new(2, 10.0));
        let start = Instant::now();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let throttle = throttle.clone();
                tokio::spawn(async move {
                    throttle.acquire().await;
                    start.elapsed()
                })
            })
            .collect();

        let mut waits = Vec::new();
        for handle in handles {
            waits.push(handle.await.unwrap());
        }
        waits.sort();
        assert_eq!(waits[0], Duration::ZERO);
        assert_eq!(waits[1], Duration::ZERO);
        assert!(waits[2] >= Duration::from_millis(99));
        assert!(waits[3] >= Duration::from_millis(199));
    }
}
