//! Scenario assertions.
//!
//! These return [`Error::Validation`] instead of panicking so scenarios can
//! attach fixture state (`describe`) before failing.

use std::collections::BTreeMap;

use tracing::info;

use crate::error::{Error, Result};

/// Fragments the API server prints when rejecting a submission
pub mod admission {
    pub const INVALID_VALUE: &str = "Invalid value";
    pub const UNSUPPORTED_VALUE: &str = "Unsupported value";
    pub const FORBIDDEN: &str = "Forbidden";
    pub const IMMUTABLE: &str = "field is immutable";
    pub const ALREADY_EXISTS: &str = "already exists";
    pub const REQUIRED_VALUE: &str = "Required value";
    pub const WEBHOOK_DENIED: &str = "denied the request";
}

/// Require that a negative-mode submission was rejected with `fragment`.
///
/// Returns the full rejection message on success.
pub fn expect_rejection<T>(result: Result<T>, fragment: &str) -> Result<String> {
    match result {
        Err(Error::Rejected { resource, message }) if message.contains(fragment) => {
            info!(resource = %resource, fragment, "Rejection matched");
            Ok(message)
        }
        Err(Error::Rejected { resource, message }) => Err(Error::Validation(format!(
            "{resource} was rejected without {fragment:?}: {message}"
        ))),
        Err(e) => Err(e),
        Ok(_) => Err(Error::Validation(format!(
            "expected a rejection containing {fragment:?}, but the submission succeeded"
        ))),
    }
}

/// Require that some volume attribute value contains `expected`
pub fn assert_attributes_contain(attributes: &BTreeMap<String, String>, expected: &str) -> Result<()> {
    if attributes.values().any(|v| v.contains(expected)) {
        return Ok(());
    }
    Err(Error::Validation(format!(
        "no volume attribute contains {expected:?}: {attributes:?}"
    )))
}

/// Require that `haystack` contains `needle`; `what` names the haystack
pub fn assert_contains(what: &str, haystack: &str, needle: &str) -> Result<()> {
    if haystack.contains(needle) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "{what} does not contain {needle:?}: {haystack}"
        )))
    }
}
