//! Retry, backoff and timeout utilities.
//!
//! `RetryPolicy` bounds request retries for the REST client, and
//! `ReconnectPolicy` holds the capped exponential schedule the realtime feed
//! uses between reconnect attempts.

use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::debug;

/// Default delay before the first feed reconnect.
pub const RECONNECT_INITIAL_DELAY: Duration = Duration::from_millis(1_000);
/// Upper bound on the feed reconnect delay.
pub const RECONNECT_MAX_DELAY: Duration = Duration::from_millis(30_000);
/// Consecutive reconnects scheduled before the feed gives up.
pub const RECONNECT_MAX_ATTEMPTS: u32 = 10;

/// Capped exponential schedule for realtime feed reconnects.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect after a successful connection.
    pub initial_delay: Duration,
    /// Ceiling applied to the doubled delay.
    pub max_delay: Duration,
    /// Number of reconnects scheduled without an intervening success.
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// Returns the delay before the reconnect that follows `attempts`
    /// consecutive failures (0-indexed): `min(initial * 2^attempts, max)`.
    pub fn delay_for_attempt(&self, attempts: u32) -> Duration {
        capped_doubling(self.initial_delay, self.max_delay, attempts)
    }

    /// Whether another reconnect may be scheduled after `attempts` failures.
    pub fn allows(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: RECONNECT_INITIAL_DELAY,
            max_delay: RECONNECT_MAX_DELAY,
            max_attempts: RECONNECT_MAX_ATTEMPTS,
        }
    }
}

/// Policy controlling retry attempts and exponential backoff behavior.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Maximum number of attempts including the first attempt.
    pub max_attempts: usize,
    /// Delay used before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound for exponential backoff delay growth.
    pub max_backoff: Duration,
    /// Maximum random jitter added to each retry delay.
    pub jitter: Duration,
}

impl RetryPolicy {
    /// Single attempt, no retries. Dashboard endpoints carry no retry
    /// contract of their own.
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// A short bounded retry for callers that opt in.
    pub fn bounded(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            jitter: Duration::from_millis(50),
        }
    }

    /// Delay before the retry that follows the 1-based `attempt`.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let exponent = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        capped_doubling(self.initial_backoff, self.max_backoff, exponent)
            + jitter_duration(self.jitter, attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::single_attempt()
    }
}

/// Executes an async operation with retry behavior controlled by `policy`.
///
/// `op` receives the 1-based attempt number. `should_retry` decides whether
/// an error is worth another attempt.
pub async fn retry_async<T, E, Op, Fut, ShouldRetry>(
    policy: &RetryPolicy,
    mut op: Op,
    mut should_retry: ShouldRetry,
) -> Result<T, E>
where
    Op: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    ShouldRetry: FnMut(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt >= max_attempts || !should_retry(&error) {
                    return Err(error);
                }

                let delay = policy.delay_for_attempt(attempt);
                debug!(
                    event = "retry_attempt_failed",
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
        }
    }
}

/// Applies an optional timeout to an async computation.
///
/// `None` waits for the future however long it takes.
pub async fn with_optional_timeout<T, Fut>(
    timeout: Option<Duration>,
    future: Fut,
) -> Result<T, tokio::time::error::Elapsed>
where
    Fut: Future<Output = T>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, future).await,
        None => Ok(future.await),
    }
}

fn capped_doubling(initial: Duration, max: Duration, exponent: u32) -> Duration {
    let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
    std::cmp::min(initial.saturating_mul(factor), max)
}

// Clock-seeded, not cryptographic.
fn jitter_duration(max_jitter: Duration, attempt: usize) -> Duration {
    let limit = u64::try_from(max_jitter.as_nanos()).unwrap_or(u64::MAX);
    if limit == 0 {
        return Duration::ZERO;
    }
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::from(elapsed.subsec_nanos()))
        .unwrap_or_default();
    let mixed = seed ^ (attempt as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    Duration::from_nanos(mixed % limit.saturating_add(1))
}
