//! Shared cluster context.
//!
//! The context (CLI, cloud provider, support matrix) is detected once per
//! test binary; each test derives a namespaced copy from it.

use std::sync::OnceLock;

use storage_e2e::telemetry::init_test_tracing;
use storage_e2e::{StorageContext, SuiteConfig};
use tokio::sync::OnceCell;

/// Global shared context.
static SHARED_CONTEXT: OnceCell<StorageContext> = OnceCell::const_new();

/// Get or detect the shared context.
///
/// Safe to call from many tests concurrently; the first call reads the
/// environment and probes the cluster.
pub async fn shared_context() -> StorageContext {
    init_tracing();
    SHARED_CONTEXT
        .get_or_init(|| async {
            let config = SuiteConfig::from_env().expect("invalid suite configuration");
            StorageContext::detect(&config)
                .await
                .expect("Failed to reach the cluster. Is your kubeconfig configured?")
        })
        .await
        .clone()
}

static TRACING_INIT: OnceLock<()> = OnceLock::new();

pub fn init_tracing() {
    TRACING_INIT.get_or_init(init_test_tracing);
}

/// Default block provisioner, or `None` when the platform has none
pub fn block_provisioner(ctx: &StorageContext) -> Option<String> {
    let provisioner = ctx.default_provisioner();
    if provisioner.is_empty() {
        tracing::warn!(provider = %ctx.cloud_provider(), "No block CSI driver on this platform, skipping");
        None
    } else {
        Some(provisioner)
    }
}
