//! Backoff and deadline policy shared by the device link and the outdoor cache.
//!
//! A [`Backoff`] describes how long to wait between attempts (initial delay,
//! multiplier, per-attempt cap) and how long to keep trying overall (the
//! budget). Each use site picks a preset and adjusts it with the builder
//! methods instead of hand-rolling its own loop.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use dewdrop_core::{Backoff, Error};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Error> {
//! let policy = Backoff::outdoor_refresh().budget(Duration::from_secs(30));
//! let cancel = CancellationToken::new();
//!
//! let value = policy
//!     .retry("fetch_outdoor", &cancel, || async { Ok::<_, Error>(12.5) })
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Delay schedule plus total time budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Growth factor applied per attempt (1.0 = fixed interval).
    pub multiplier: f64,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
    /// Total time allowed from the first attempt.
    pub budget: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(5),
            budget: Duration::from_secs(30),
        }
    }
}

impl Backoff {
    // ==================== Per-Use-Site Presets ====================

    /// Polling a serial device: fixed 50 ms interval, 1 s budget.
    pub fn serial_poll() -> Self {
        Self::fixed(Duration::from_millis(50), Duration::from_secs(1))
    }

    /// Polling a device over the local network: fixed 100 ms interval, 1 s
    /// budget.
    pub fn http_poll() -> Self {
        Self::fixed(Duration::from_millis(100), Duration::from_secs(1))
    }

    /// Refreshing the outdoor dew point: 1 s doubling up to 60 s, 5 min budget.
    pub fn outdoor_refresh() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            budget: Duration::from_secs(5 * 60),
        }
    }

    /// A constant interval with the given budget.
    pub fn fixed(interval: Duration, budget: Duration) -> Self {
        Self {
            initial_delay: interval,
            multiplier: 1.0,
            max_delay: interval,
            budget,
        }
    }

    // ==================== Builder Methods ====================

    /// Set the initial delay.
    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the growth factor.
    #[must_use]
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the per-attempt cap.
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the total budget.
    #[must_use]
    pub fn budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// Validate the policy.
    ///
    /// Checks that the multiplier is at least 1.0, the initial delay is
    /// non-zero and does not exceed the cap.
    pub fn validate(&self) -> Result<()> {
        if self.multiplier < 1.0 {
            return Err(Error::invalid_config("backoff multiplier must be >= 1.0"));
        }
        if self.initial_delay.is_zero() {
            return Err(Error::invalid_config("initial delay must be > 0"));
        }
        if self.max_delay < self.initial_delay {
            return Err(Error::invalid_config(
                "max delay must be >= initial delay",
            ));
        }
        Ok(())
    }

    /// Delay to wait after the given (zero-based) failed attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(base.min(self.max_delay.as_secs_f64()))
    }

    /// Start the budget clock.
    pub fn start(&self) -> Deadline {
        Deadline {
            started: Instant::now(),
            budget: self.budget,
        }
    }

    /// Run `operation` until it succeeds, the budget runs out, or `cancel`
    /// fires.
    ///
    /// Every error except [`Error::Cancelled`] is retried. Cancellation is
    /// checked while waiting between attempts, not only at entry. When the
    /// budget is exhausted the last error is returned.
    pub async fn retry<F, Fut, T>(
        &self,
        operation_name: &str,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let deadline = self.start();
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let error = match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("{} succeeded after {} retries", operation_name, attempt);
                    }
                    return Ok(value);
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => e,
            };

            let delay = self.delay_for_attempt(attempt);
            if !deadline.allows(delay) {
                warn!(
                    "{} giving up after {} attempts in {:?}: {}",
                    operation_name,
                    attempt + 1,
                    deadline.elapsed(),
                    error
                );
                return Err(error);
            }

            warn!(
                "{} failed (attempt {}), retrying in {:?}: {}",
                operation_name,
                attempt + 1,
                delay,
                error
            );
            pause(delay, cancel).await?;
            attempt += 1;
        }
    }
}

/// A running budget clock.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    /// Time since the clock started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Whether the budget is used up.
    pub fn expired(&self) -> bool {
        self.elapsed() >= self.budget
    }

    /// Whether waiting `delay` more still fits in the budget.
    pub fn allows(&self, delay: Duration) -> bool {
        self.elapsed() + delay <= self.budget
    }
}

/// Sleep for `delay`, returning [`Error::Cancelled`] as soon as `cancel` fires.
pub async fn pause(delay: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        _ = sleep(delay) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_presets() {
        let serial = Backoff::serial_poll();
        assert_eq!(serial.delay_for_attempt(0), Duration::from_millis(50));
        assert_eq!(serial.delay_for_attempt(10), Duration::from_millis(50));
        assert_eq!(serial.budget, Duration::from_secs(1));

        let refresh = Backoff::outdoor_refresh();
        assert_eq!(refresh.budget, Duration::from_secs(300));
        assert!(refresh.validate().is_ok());
    }

    #[test]
    fn test_delay_calculation() {
        let policy = Backoff::default()
            .initial_delay(Duration::from_millis(100))
            .multiplier(2.0)
            .max_delay(Duration::from_millis(500));

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(500));
    }

    #[test]
    fn test_validate() {
        assert!(Backoff::default().multiplier(0.5).validate().is_err());
        assert!(
            Backoff::default()
                .initial_delay(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            Backoff::default()
                .initial_delay(Duration::from_secs(10))
                .max_delay(Duration::from_secs(1))
                .validate()
                .is_err()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_eventual_success() {
        let policy = Backoff::outdoor_refresh();
        let cancel = CancellationToken::new();
        let attempts = Arc::new(AtomicU32::new(0));

        let result = policy
            .retry("test", &cancel, || {
                let attempts = Arc::clone(&attempts);
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(Error::Weather("flaky".into()))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_exhausted_returns_last_error() {
        // 1 + 2 + 4 = 7 s of waiting fits in 10 s, the next 8 s wait does not.
        let policy = Backoff::outdoor_refresh().budget(Duration::from_secs(10));
        let cancel = CancellationToken::new();
        let attempts = Arc::new(AtomicU32::new(0));

        let result: Result<()> = policy
            .retry("test", &cancel, || {
                let attempts = Arc::clone(&attempts);
                async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Weather(format!("failure {}", n)))
                }
            })
            .await;

        assert!(matches!(result, Err(Error::Weather(ref m)) if m == "failure 3"));
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_cancelled_between_attempts() {
        let policy = Backoff::outdoor_refresh();
        let cancel = CancellationToken::new();
        let attempts = Arc::new(AtomicU32::new(0));

        let canceller = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(1500)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let result: Result<()> = policy
            .retry("test", &cancel, || {
                let attempts = Arc::clone(&attempts);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Weather("down".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_does_not_retry_cancelled() {
        let policy = Backoff::outdoor_refresh();
        let cancel = CancellationToken::new();
        let attempts = Arc::new(AtomicU32::new(0));

        let result: Result<()> = policy
            .retry("test", &cancel, || {
                let attempts = Arc::clone(&attempts);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Cancelled)
                }
            })
            .await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
