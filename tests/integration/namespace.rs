//! RAII namespace management for isolated tests.
//!
//! IMPORTANT: Tests using TestNamespace must use `#[tokio::test(flavor = "multi_thread")]`
//! to support synchronous cleanup via `block_in_place`.

use std::sync::atomic::{AtomicBool, Ordering};

use storage_e2e::StorageContext;
use uuid::Uuid;

/// A test namespace deleted when dropped.
pub struct TestNamespace {
    ctx: StorageContext,
    name: String,
    cleanup_initiated: AtomicBool,
}

impl TestNamespace {
    /// Create `{prefix}-{uuid8}` with admin credentials.
    pub async fn create(base: &StorageContext, prefix: &str) -> Self {
        let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
        let name = format!("{prefix}-{suffix}");

        let admin = base.admin().without_namespace();
        admin
            .run(&["create", "namespace", &name])
            .await
            .unwrap_or_else(|e| panic!("Failed to create test namespace {name}: {e}"));
        admin
            .run(&[
                "label",
                "namespace",
                &name,
                "app.kubernetes.io/managed-by=storage-e2e",
            ])
            .await
            .unwrap_or_else(|e| panic!("Failed to label test namespace {name}: {e}"));

        tracing::info!(namespace = %name, "Created test namespace");

        Self {
            ctx: base.for_namespace(&name),
            name,
            cleanup_initiated: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Context whose namespaced fixtures land in this namespace
    pub fn ctx(&self) -> &StorageContext {
        &self.ctx
    }
}

impl Drop for TestNamespace {
    fn drop(&mut self) {
        if self.cleanup_initiated.swap(true, Ordering::SeqCst) {
            return;
        }

        let name = self.name.clone();
        let admin = self.ctx.admin().without_namespace();
        tracing::debug!(namespace = %name, "Drop: deleting test namespace");

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                if let Err(e) = admin
                    .delete("namespace", &name, &["--wait=false"])
                    .await
                {
                    tracing::warn!(namespace = %name, error = %e, "Drop: failed to delete namespace");
                }
            });
        });
    }
}
