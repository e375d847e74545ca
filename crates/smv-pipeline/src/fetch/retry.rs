//! Bounded retry with exponential backoff for fetch implementations.

use std::future::Future;
use std::time::Duration;

use smv_core::Result;

/// Upper bound on a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
        }
    }
}

impl From<&smv_core::config::FetchConfig> for RetryPolicy {
    fn from(cfg: &smv_core::config::FetchConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            base_backoff: Duration::from_millis(cfg.backoff_ms),
        }
    }
}

/// Whether an attempt's failure is worth another try.
pub enum Attempt<T> {
    Done(T),
    Retry(smv_core::Error),
    Fatal(smv_core::Error),
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            base_backoff: Duration::ZERO,
        }
    }

    /// Sleep before attempt `attempt` (1-based); attempt 1 never waits.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 2);
        self.base_backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }

    /// Run `op` until it returns [`Attempt::Done`] or [`Attempt::Fatal`], or
    /// the attempt budget runs out.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Attempt<T>>,
    {
        let max = self.max_attempts.max(1);
        let mut last = None;
        for attempt in 1..=max {
            let wait = self.delay(attempt);
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
            match op(attempt).await {
                Attempt::Done(v) => return Ok(v),
                Attempt::Fatal(e) => return Err(e),
                Attempt::Retry(e) => {
                    tracing::warn!(what, attempt, max, "fetch attempt failed: {e}");
                    last = Some(e);
                }
            }
        }
        Err(last.unwrap_or_else(|| smv_core::Error::fetch(what, "no attempts made")))
    }
}
