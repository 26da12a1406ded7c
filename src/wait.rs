//! Polling primitives.
//!
//! Every wait in the suite is a fixed-interval poll against a per-call-site
//! deadline. Transient CLI failures ([`Error::is_retryable`]) are absorbed
//! inside the window; everything else ends the wait immediately.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, trace};

use crate::error::{Error, Result};

/// Poll interval used by the preset configurations
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Interval and deadline of one wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollConfig {
    /// Quick checks such as status fields that flip right after creation
    pub const SHORT: Self = Self::new(DEFAULT_POLL_INTERVAL, Duration::from_secs(30));
    pub const DEFAULT: Self = Self::new(DEFAULT_POLL_INTERVAL, Duration::from_secs(60));
    /// Provisioning waits: PVC binding, pod and deployment readiness
    pub const RESOURCE: Self = Self::new(DEFAULT_POLL_INTERVAL, Duration::from_secs(120));
    /// Volume resize and LSO rediscovery
    pub const LONG: Self = Self::new(DEFAULT_POLL_INTERVAL, Duration::from_secs(180));

    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Same interval, different deadline
    pub const fn with_timeout(self, timeout: Duration) -> Self {
        Self::new(self.interval, timeout)
    }

    pub const fn with_interval(self, interval: Duration) -> Self {
        Self::new(interval, self.timeout)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// State a [`wait_for_state`] call waits for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedState {
    /// The queried field equals this value
    Value(String),
    /// The object no longer exists
    Deleted,
}

impl ExpectedState {
    pub fn value(value: impl Into<String>) -> Self {
        Self::Value(value.into())
    }
}

impl fmt::Display for ExpectedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{v:?}"),
            Self::Deleted => f.write_str("deleted"),
        }
    }
}

/// How a not-found query result is treated while waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundPolicy {
    /// Not-found satisfies [`ExpectedState::Deleted`] and is fatal when
    /// waiting for a value
    SatisfiesDeleted,
    /// Not-found keeps polling; the object is expected to come back under
    /// the same name (LSO recreating a released local PV)
    Retry,
}

const NOT_FOUND_OBSERVATION: &str = "<not found>";

/// Poll `condition` until it returns `Ok(true)` or the deadline passes.
///
/// `Ok(false)` and retryable errors keep polling; any other error is
/// returned as is.
pub async fn poll_until<F, Fut>(description: &str, config: PollConfig, mut condition: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let deadline = Instant::now() + config.timeout;
    let mut last_observed = String::from("condition not met");

    loop {
        match condition().await {
            Ok(true) => {
                debug!(description, "Condition met");
                return Ok(());
            }
            Ok(false) => {
                trace!(description, "Condition not yet met");
                last_observed = String::from("condition not met");
            }
            Err(e) if e.is_retryable() => {
                debug!(description, error = %e, "Transient error while polling");
                last_observed = e.to_string();
            }
            Err(e) => return Err(e),
        }

        if !sleep_until_next(deadline, config.interval).await {
            return Err(Error::Timeout {
                description: description.to_string(),
                timeout: config.timeout,
                last_observed,
            });
        }
    }
}

/// Poll `query` until it reports `expected`.
///
/// `query` returns the current value of the watched field (for example a
/// PVC's `status.phase`). Not-found results always satisfy
/// [`ExpectedState::Deleted`]; when waiting for a value they are handled per
/// `policy`.
pub async fn wait_for_state<F, Fut>(
    resource: &str,
    expected: &ExpectedState,
    policy: NotFoundPolicy,
    config: PollConfig,
    mut query: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let description = format!("{resource} to be {expected}");
    let deadline = Instant::now() + config.timeout;
    let mut last_observed = String::from("<none>");

    loop {
        match query().await {
            Ok(value) => {
                if let ExpectedState::Value(want) = expected
                    && *want == value
                {
                    debug!(resource, state = %value, "Reached expected state");
                    return Ok(());
                }
                trace!(resource, observed = %value, expected = %expected, "Waiting for state");
                last_observed = value;
            }
            Err(e) if e.is_not_found() => match (expected, policy) {
                (ExpectedState::Deleted, _) => {
                    debug!(resource, "Resource is gone");
                    return Ok(());
                }
                (ExpectedState::Value(_), NotFoundPolicy::Retry) => {
                    trace!(resource, "Resource not found yet, retrying");
                    last_observed = NOT_FOUND_OBSERVATION.to_string();
                }
                (ExpectedState::Value(_), NotFoundPolicy::SatisfiesDeleted) => return Err(e),
            },
            Err(e) if e.is_retryable() => {
                debug!(resource, error = %e, "Transient error while waiting for state");
                last_observed = e.to_string();
            }
            Err(e) => return Err(e),
        }

        if !sleep_until_next(deadline, config.interval).await {
            return Err(Error::Timeout {
                description,
                timeout: config.timeout,
                last_observed,
            });
        }
    }
}

/// Require `condition` to hold at every poll for the whole window.
///
/// Used for "stays Pending" style checks. Retryable errors are skipped; a
/// false observation fails immediately.
pub async fn check_consistently<F, Fut>(
    description: &str,
    config: PollConfig,
    mut condition: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let deadline = Instant::now() + config.timeout;
    loop {
        match condition().await {
            Ok(true) => {}
            Ok(false) => {
                return Err(Error::Validation(format!(
                    "{description} did not hold for {:?}",
                    config.timeout
                )));
            }
            Err(e) if e.is_retryable() => {
                debug!(description, error = %e, "Transient error during consistency check");
            }
            Err(e) => return Err(e),
        }
        if !sleep_until_next(deadline, config.interval).await {
            return Ok(());
        }
    }
}

/// Sleep one interval, clamped to the deadline; false once it has passed
async fn sleep_until_next(deadline: Instant, interval: Duration) -> bool {
    let now = Instant::now();
    if now >= deadline {
        return false;
    }
    sleep(interval.min(deadline - now)).await;
    true
}
