use std::future::Future;
use std::time::Duration;

/// Client-side backoff contract for eventually-consistent reads.
///
/// Delays grow exponentially from `initial_delay` and are capped at
/// `max_delay`; the loop is bounded by `max_attempts` and never retries
/// indefinitely.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep after the given zero-based attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Re-run `op` until `accept` passes or attempts run out; the last
    /// outcome is returned either way.
    pub async fn run_until<T, F, Fut, P>(&self, mut op: F, mut accept: P) -> T
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = T>,
        P: FnMut(&T) -> bool,
    {
        let attempts = self.max_attempts.max(1);
        let mut outcome = op().await;
        for attempt in 0..attempts - 1 {
            if accept(&outcome) {
                return outcome;
            }
            tokio::time::sleep(self.delay_for(attempt)).await;
            outcome = op().await;
        }
        outcome
    }
}
