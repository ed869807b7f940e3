//! PIN attempt limiter.
//!
//! ```text
//! failures of one source address within WINDOW
//!    1 2 3 4 5 ──► blocked until now + BLOCK ──► every attempt rate_limited
//!                                                  │
//!              block over ◄────────────────────────┘ (counter cleared)
//! ```
//!
//! A successful login clears the source's counter.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::warn;

use sgir_core::{CoreError, CoreResult};

/// Failed attempts tolerated inside the window.
pub const MAX_FAILURES: usize = 5;

/// Minutes over which failures are counted.
pub const WINDOW_MINUTES: i64 = 15;

/// Minutes a source stays blocked.
pub const BLOCK_MINUTES: i64 = 15;

/// Time source, injectable so windows can be tested without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Default)]
struct Attempts {
    failures: VecDeque<DateTime<Utc>>,
    blocked_until: Option<DateTime<Utc>>,
}

/// Per-source failure counter with a temporary block.
pub struct PinRateLimiter {
    clock: Arc<dyn Clock>,
    sources: Mutex<HashMap<String, Attempts>>,
}

impl PinRateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        PinRateLimiter {
            clock,
            sources: Mutex::new(HashMap::new()),
        }
    }

    /// Fails with `rate_limited` while `source` is blocked.
    pub async fn check(&self, source: &str) -> CoreResult<()> {
        let now = self.clock.now();
        let mut sources = self.sources.lock().await;
        let Some(attempts) = sources.get_mut(source) else {
            return Ok(());
        };

        match attempts.blocked_until {
            Some(until) if now < until => Err(CoreError::RateLimited {
                retry_after_secs: (until - now).num_seconds().max(1),
            }),
            Some(_) => {
                sources.remove(source);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Counts a failure; the failure that reaches the limit starts a block.
    pub async fn record_failure(&self, source: &str) {
        let now = self.clock.now();
        let window_start = now - Duration::minutes(WINDOW_MINUTES);
        let mut sources = self.sources.lock().await;
        let attempts = sources.entry(source.to_string()).or_default();

        while attempts.failures.front().is_some_and(|t| *t < window_start) {
            attempts.failures.pop_front();
        }
        attempts.failures.push_back(now);

        if attempts.failures.len() >= MAX_FAILURES {
            attempts.blocked_until = Some(now + Duration::minutes(BLOCK_MINUTES));
            warn!(source, failures = attempts.failures.len(), "PIN source blocked");
        }
    }

    pub async fn record_success(&self, source: &str) {
        self.sources.lock().await.remove(source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct ManualClock(StdMutex<DateTime<Utc>>);

    impl ManualClock {
        fn advance(&self, by: Duration) {
            let mut now = self.0.lock().unwrap();
            *now = *now + by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn limiter() -> (Arc<ManualClock>, PinRateLimiter) {
        let clock = Arc::new(ManualClock(StdMutex::new(Utc::now())));
        let limiter = PinRateLimiter::new(clock.clone());
        (clock, limiter)
    }

    #[tokio::test]
    async fn test_fifth_failure_blocks_source() {
        let (_, limiter) = limiter();
        for _ in 0..4 {
            limiter.check("10.0.0.9").await.unwrap();
            limiter.record_failure("10.0.0.9").await;
        }
        limiter.check("10.0.0.9").await.unwrap();
        limiter.record_failure("10.0.0.9").await;

        let err = limiter.check("10.0.0.9").await.unwrap_err();
        assert!(matches!(err, CoreError::RateLimited { retry_after_secs } if retry_after_secs > 0));
        limiter.check("10.0.0.10").await.unwrap();
    }

    #[tokio::test]
    async fn test_block_lifts_after_window() {
        let (clock, limiter) = limiter();
        for _ in 0..MAX_FAILURES {
            limiter.record_failure("kiosk").await;
        }
        assert!(limiter.check("kiosk").await.is_err());

        clock.advance(Duration::minutes(BLOCK_MINUTES) + Duration::seconds(1));
        limiter.check("kiosk").await.unwrap();

        limiter.record_failure("kiosk").await;
        limiter.check("kiosk").await.unwrap();
    }

    #[tokio::test]
    async fn test_old_failures_fall_out_of_window() {
        let (clock, limiter) = limiter();
        for _ in 0..4 {
            limiter.record_failure("kiosk").await;
        }
        clock.advance(Duration::minutes(WINDOW_MINUTES + 1));
        limiter.record_failure("kiosk").await;
        limiter.check("kiosk").await.unwrap();
    }

    #[tokio::test]
    async fn test_success_clears_counter() {
        let (_, limiter) = limiter();
        for _ in 0..4 {
            limiter.record_failure("kiosk").await;
        }
        limiter.record_success("kiosk").await;
        limiter.record_failure("kiosk").await;
        limiter.check("kiosk").await.unwrap();
    }
}
