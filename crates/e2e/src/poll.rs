//! Bounded polling used by verification steps

use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;
use vflow_common::{Error, Result};

/// Shortest pause between two checks
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// How long and how often a verification re-checks its predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            interval: Duration::from_millis(500),
        }
    }
}

impl PollPolicy {
    /// `interval` is raised to [`MIN_POLL_INTERVAL`] when shorter
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval: interval.max(MIN_POLL_INTERVAL),
        }
    }

    /// Check the predicate exactly once
    pub fn once() -> Self {
        Self {
            timeout: Duration::ZERO,
            interval: Duration::ZERO,
        }
    }
}

/// Run `check` until `accept` holds for its value or the policy times out.
///
/// The first check runs immediately. Retryable check errors count as a
/// failed check; any other error aborts the poll. The last check happens at
/// the deadline, so a predicate that never holds fails after exactly
/// `policy.timeout`.
pub async fn poll_until<T, F, Fut, A>(what: &str, policy: PollPolicy, mut check: F, mut accept: A) -> Result<T>
where
    T: Debug,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    A: FnMut(&T) -> bool,
{
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let interval = policy.interval.max(MIN_POLL_INTERVAL);
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let observed = match check().await {
            Ok(value) if accept(&value) => {
                debug!(what, attempts, "Verification satisfied");
                return Ok(value);
            }
            Ok(value) => format!("{:?}", value),
            Err(e) if e.is_retryable() => {
                debug!(what, error = %e, "Retryable error while polling");
                e.to_string()
            }
            Err(e) => return Err(e),
        };

        let now = Instant::now();
        if now >= deadline {
            return Err(Error::VerificationTimeout {
                what: what.to_string(),
                observed,
                elapsed_ms: now.duration_since(started).as_millis() as u64,
                attempts,
            });
        }

        debug!(what, attempts, observed = %observed, "Predicate not yet satisfied");
        sleep(interval.min(deadline - now)).await;
    }
}
