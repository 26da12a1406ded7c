//! Tracing subscriber setup.
//!
//! `RUST_LOG` takes precedence; otherwise `STORAGE_LOG_LEVEL=DEBUG` turns on
//! debug diagnostics for this crate (rendered templates, every CLI command).

use tracing_subscriber::EnvFilter;

use crate::error::{Error, Result};

/// Environment variable selecting the crate log level
pub const LOG_LEVEL_ENV: &str = "STORAGE_LOG_LEVEL";

/// Filter directive for a `STORAGE_LOG_LEVEL` value
pub fn level_directive(level: Option<&str>) -> &'static str {
    match level.map(|l| l.trim().to_ascii_lowercase()).as_deref() {
        Some("debug") => "storage_e2e=debug",
        Some("trace") => "storage_e2e=trace",
        Some("warn") => "storage_e2e=warn",
        Some("error") => "storage_e2e=error",
        _ => "storage_e2e=info",
    }
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var(LOG_LEVEL_ENV).ok();
        EnvFilter::new(level_directive(level.as_deref()))
    })
}

/// Install the global subscriber; JSON output for machine consumption
pub fn init_tracing(json: bool) -> Result<()> {
    let builder = tracing_subscriber::fmt().with_env_filter(filter());
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| Error::Config(format!("failed to install tracing subscriber: {e}")))
}

/// Subscriber for tests; output goes through the test harness capture
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_test_writer()
        .try_init();
}
