//! Bounded, retrying request pool
//!
//! At most `pool_size` attempts are in flight across all submissions
//! sharing a pool. Each submission runs its own retry loop: after a
//! retryable failure on attempt `n` it waits `interval(n)` plus up to
//! `jitter`, then tries again until `max_attempts` is reached.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::classify::{DefaultClassifier, ResponseClassifier, ServiceResponse, Verdict};
use crate::error::{ResponderError, ResponderResult};
use crate::sleep::Sleeper;

/// Maps a 1-based attempt count to the delay before the next attempt
pub type IntervalFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// Exponential backoff: `2^attempt * base`
pub fn exponential_interval(base: Duration) -> IntervalFn {
    Arc::new(move |attempt| base.saturating_mul(2u32.saturating_pow(attempt)))
}

/// Retry policy for update submission
#[derive(Clone)]
pub struct RetryPolicy {
    pub interval: IntervalFn,
    /// Upper bound of random delay added to each interval
    pub jitter: Duration,
    pub max_attempts: u32,
    /// Maximum attempts in flight at once
    pub pool_size: usize,
    pub classifier: Arc<dyn ResponseClassifier>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("jitter", &self.jitter)
            .field("max_attempts", &self.max_attempts)
            .field("pool_size", &self.pool_size)
            .field("classifier", &self.classifier)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: exponential_interval(Duration::from_millis(1000)),
            jitter: Duration::ZERO,
            max_attempts: 10,
            pool_size: 1,
            classifier: Arc::new(DefaultClassifier),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after attempt `attempt` failed
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = (self.interval)(attempt);
        if self.jitter.is_zero() {
            return base;
        }
        let jitter_ms = self.jitter.as_millis().min(u64::MAX as u128) as u64;
        let extra = rand::thread_rng().gen_range(0..=jitter_ms);
        base.saturating_add(Duration::from_millis(extra))
    }
}

/// Pool executing update requests under a [`RetryPolicy`]
#[derive(Debug)]
pub struct RequestPool {
    policy: RetryPolicy,
    permits: Semaphore,
    sleeper: Arc<dyn Sleeper>,
}

impl RequestPool {
    pub fn new(policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        let permits = Semaphore::new(policy.pool_size.max(1));
        Self {
            policy,
            permits,
            sleeper,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `send` until the classifier resolves, fails, or attempts run out
    ///
    /// The pool permit is held only while an attempt is in flight, never
    /// across the backoff sleep.
    pub async fn execute<F, Fut>(&self, mut send: F) -> ResponderResult<ServiceResponse>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ResponderResult<ServiceResponse>>,
    {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let outcome = {
                let _permit = self
                    .permits
                    .acquire()
                    .await
                    .map_err(|_| ResponderError::Transport("request pool closed".to_string()))?;
                send().await
            };

            match self.policy.classifier.classify(outcome) {
                Verdict::Resolve(response) => {
                    debug!(attempt, status = response.status, "Request settled");
                    return Ok(response);
                }
                Verdict::Fail(e) => {
                    warn!(attempt, error = %e, "Request failed without retry");
                    return Err(e);
                }
                Verdict::Retry(e) => {
                    if attempt >= self.policy.max_attempts {
                        warn!(
                            attempts = attempt,
                            error = %e,
                            "Request failed, retry limit reached"
                        );
                        return Err(e);
                    }

                    let delay = self.policy.delay_for(attempt);
                    debug!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Request failed, retrying"
                    );
                    self.sleeper.sleep(delay).await;
                }
            }
        }
    }
}
