//! Deferred teardown.
//!
//! Scenarios register an undo action right after each successful create.
//! [`CleanupStack::run`] drains the actions newest first; a stack dropped
//! with actions left (a failed assertion unwinding) drains them
//! synchronously.
//!
//! IMPORTANT: the drop path needs the multi-threaded runtime
//! (`#[tokio::test(flavor = "multi_thread")]`) to use `block_in_place`.

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, warn};

use crate::context::StorageContext;
use crate::resources::Fixture;

type CleanupAction = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// LIFO list of teardown actions
#[derive(Default)]
pub struct CleanupStack {
    actions: Vec<(String, CleanupAction)>,
}

impl std::fmt::Debug for CleanupStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let labels: Vec<&str> = self.actions.iter().map(|(l, _)| l.as_str()).collect();
        f.debug_struct("CleanupStack").field("actions", &labels).finish()
    }
}

impl CleanupStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an arbitrary async action
    pub fn defer<F>(&mut self, label: impl Into<String>, action: F)
    where
        F: FnOnce() -> BoxFuture<'static, ()> + Send + 'static,
    {
        self.actions.push((label.into(), Box::new(action)));
    }

    /// Register a best-effort admin delete of `fixture`
    pub fn defer_delete<F>(&mut self, ctx: &StorageContext, fixture: &F)
    where
        F: Fixture + Clone + 'static,
    {
        let label = format!("delete {} {}", fixture.kind(), fixture.name());
        let ctx = ctx.clone();
        let fixture = fixture.clone();
        self.defer(label, move || {
            async move { fixture.delete_as_admin(&ctx).await }.boxed()
        });
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every action, newest first
    pub async fn run(&mut self) {
        while let Some((label, action)) = self.actions.pop() {
            debug!(action = %label, "Running cleanup");
            action().await;
        }
    }
}

impl Drop for CleanupStack {
    fn drop(&mut self) {
        if self.actions.is_empty() {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            warn!(pending = self.actions.len(), "Cleanup stack dropped outside a runtime; resources leaked");
            return;
        };
        if handle.runtime_flavor() != RuntimeFlavor::MultiThread {
            warn!(pending = self.actions.len(), "Cleanup stack dropped on a current-thread runtime; resources leaked");
            return;
        }
        debug!(pending = self.actions.len(), "Drop: draining cleanup stack");
        tokio::task::block_in_place(|| handle.block_on(self.run()));
    }
}
