//! Error types for fixture operations.
//!
//! Every CLI, template and polling failure surfaces as [`Error`]. The
//! classification helpers decide whether a poll loop keeps going
//! ([`Error::is_retryable`]) and whether a query means "the object is gone"
//! ([`Error::is_not_found`]).

use std::time::Duration;
use thiserror::Error;

/// Error type for fixture operations
#[derive(Error, Debug)]
pub enum Error {
    /// The CLI binary could not be started
    #[error("Failed to spawn {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// The CLI ran and exited non-zero
    #[error("`{command}` failed (exit code {code:?}): {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The CLI did not finish within its per-command timeout
    #[error("`{command}` timed out after {timeout:?}")]
    CommandTimeout { command: String, timeout: Duration },

    /// A queried object does not exist
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A poll loop reached its deadline
    #[error("Timed out after {timeout:?} waiting for {description} (last observed: {last_observed})")]
    Timeout {
        description: String,
        timeout: Duration,
        last_observed: String,
    },

    /// Template loading or processing failed
    #[error("Template error: {0}")]
    Template(String),

    /// A negative-mode submission was rejected, as expected
    #[error("{resource} was rejected: {message}")]
    Rejected { resource: String, message: String },

    /// A negative-mode submission was admitted
    #[error("{resource} was expected to be rejected but was admitted")]
    UnexpectedAdmission { resource: String },

    /// An observed value did not match the expectation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Invalid suite configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cloud provider API failure
    #[error("Cloud provider error: {0}")]
    Cloud(String),

    /// Filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// stderr fragments the cluster CLI prints for a missing object
const NOT_FOUND_MARKERS: &[&str] = &["NotFound", "not found"];

/// stderr fragment for a kind the API server does not serve at all
const MISSING_TYPE_MARKER: &str = "doesn't have a resource type";

/// stderr fragments for failures that usually clear up on their own
const TRANSIENT_MARKERS: &[&str] = &[
    "connection refused",
    "connection reset by peer",
    "i/o timeout",
    "TLS handshake timeout",
    "the server is currently unable to handle the request",
    "etcdserver: leader changed",
    "etcdserver: request timed out",
    "Internal error occurred",
    "the object has been modified",
    "Too many requests",
    "ServiceUnavailable",
    "unexpected EOF",
];

impl Error {
    /// Check if this error indicates a not-found condition.
    ///
    /// A kind the server does not know is a setup problem, not an absent
    /// object; see [`Error::is_missing_resource_type`].
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::CommandFailed { stderr, .. } => {
                !stderr.contains(MISSING_TYPE_MARKER)
                    && NOT_FOUND_MARKERS.iter().any(|m| stderr.contains(m))
            }
            _ => false,
        }
    }

    /// Check if the server rejected the request because the kind is not
    /// installed, e.g. a CRD whose operator is absent
    pub fn is_missing_resource_type(&self) -> bool {
        matches!(self, Error::CommandFailed { stderr, .. } if stderr.contains(MISSING_TYPE_MARKER))
    }

    /// Check if this error should be retried inside a poll window
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::CommandFailed { stderr, .. } => {
                TRANSIENT_MARKERS.iter().any(|m| stderr.contains(m))
            }
            Error::CommandTimeout { .. } => true,
            Error::Spawn { .. }
            | Error::NotFound(_)
            | Error::Timeout { .. }
            | Error::Template(_)
            | Error::Rejected { .. }
            | Error::UnexpectedAdmission { .. }
            | Error::Validation(_)
            | Error::Config(_)
            | Error::Cloud(_)
            | Error::Io(_)
            | Error::Serialization(_) => false,
        }
    }

    /// The CLI message of an expected rejection, if this is one
    pub fn rejection_message(&self) -> Option<&str> {
        match self {
            Error::Rejected { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// Result type alias for fixture operations
pub type Result<T> = std::result::Result<T, Error>;
