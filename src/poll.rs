//! Poll-until primitive shared by cluster and library waits
//!
//! The loop fetches an observation, hands it to a decision function, and
//! sleeps between attempts with capped exponential backoff. Cancellation is
//! checked at the top of every iteration and raced against every sleep;
//! an in-flight fetch is never aborted.
//!
//! # Example
//!
//! ```ignore
//! let info = poll_until(&config, &cancel, "cluster running",
//!     || client.get_cluster(id),
//!     |observed| match observed?.state {
//!         Phase::Running => Ok(Check::Done(())),
//!         _ => Ok(Check::Continue),
//!     },
//! ).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::ClientError;

/// Default deadline for a single wait
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Default delay before the second observation
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Shortest sleep between two observations
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Timing and retry budget of a wait
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Give up after this long
    pub timeout: Duration,
    /// Delay between the first two attempts
    pub interval: Duration,
    /// Growth factor applied to the delay after each attempt (1.0 = fixed)
    pub backoff_multiplier: f64,
    /// Upper bound for the delay
    pub max_interval: Duration,
    /// Consecutive transport failures tolerated before giving up
    pub max_transient_errors: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_POLL_TIMEOUT,
            interval: DEFAULT_POLL_INTERVAL,
            backoff_multiplier: 1.5,
            max_interval: Duration::from_secs(60),
            max_transient_errors: 5,
        }
    }
}

impl PollConfig {
    /// Fixed-interval polling with the given deadline
    pub fn fixed(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval,
            backoff_multiplier: 1.0,
            max_interval: interval,
            ..Default::default()
        }
    }

    pub fn with_backoff(mut self, multiplier: f64, max_interval: Duration) -> Self {
        self.backoff_multiplier = multiplier.max(1.0);
        self.max_interval = max_interval.max(self.interval);
        self
    }

    pub fn with_transient_budget(mut self, max_errors: u32) -> Self {
        self.max_transient_errors = max_errors;
        self
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::try_from_secs_f64(delay.as_secs_f64() * self.backoff_multiplier)
            .map_or(self.max_interval, |next| next.min(self.max_interval))
    }
}

/// Outcome of inspecting one observation
#[derive(Debug, Clone, PartialEq)]
pub enum Check<T> {
    /// Target reached
    Done(T),
    /// Not there yet
    Continue,
}

/// Ways a wait ends without reaching its target
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PollError {
    #[error("timed out after {elapsed:?} waiting for {what}")]
    Timeout { what: String, elapsed: Duration },

    #[error("cancelled while waiting for {0}")]
    Cancelled(String),

    /// Transport failures exceeded the retry budget
    #[error("{0}")]
    Client(ClientError),
}

/// Poll until `decide` reports `Done`, returns an error, or the deadline
/// passes. A timeout too large to represent as an instant means no deadline.
///
/// Sleeps never drop below [`MIN_POLL_INTERVAL`].
///
/// Transient fetch failures (see [`ClientError::is_transient`]) are retried
/// up to `max_transient_errors` consecutive times without consulting
/// `decide`. Every other fetch result, including API errors such as
/// not-found, is passed to `decide`, which chooses whether it ends the wait.
pub async fn poll_until<V, T, E, F, Fut, D>(
    config: &PollConfig,
    cancel: &CancellationToken,
    what: &str,
    mut fetch: F,
    mut decide: D,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<V, ClientError>>,
    D: FnMut(Result<V, ClientError>) -> Result<Check<T>, E>,
    E: From<PollError>,
{
    let started = Instant::now();
    let deadline = started.checked_add(config.timeout);
    let mut delay = config.interval.max(MIN_POLL_INTERVAL);
    let mut attempt = 0u32;
    let mut transient_errors = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled(what.to_string()).into());
        }

        attempt += 1;
        match fetch().await {
            Err(e) if e.is_transient() => {
                transient_errors += 1;
                if transient_errors > config.max_transient_errors {
                    warn!(what, attempt, error = %e, "giving up after repeated transport errors");
                    return Err(PollError::Client(e).into());
                }
                warn!(what, attempt, error = %e, "transport error while polling, retrying");
            }
            observed => {
                transient_errors = 0;
                if let Check::Done(value) = decide(observed)? {
                    debug!(what, attempt, elapsed_ms = started.elapsed().as_millis() as u64, "wait complete");
                    return Ok(value);
                }
            }
        }

        let now = Instant::now();
        let sleep_for = match deadline {
            Some(deadline) if now >= deadline => {
                return Err(PollError::Timeout {
                    what: what.to_string(),
                    elapsed: now - started,
                }
                .into());
            }
            Some(deadline) => delay.min(deadline - now),
            None => delay,
        };
        debug!(what, attempt, sleep_ms = sleep_for.as_millis() as u64, "waiting");
        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(PollError::Cancelled(what.to_string()).into());
            }
            _ = tokio::time::sleep(sleep_for) => {}
        }
        delay = config.next_delay(delay).max(MIN_POLL_INTERVAL);
    }
}
