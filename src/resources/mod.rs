//! Resource fixtures.
//!
//! Each fixture is a plain value built from a [`StorageContext`] with
//! provider-aware defaults. Construction never touches the cluster;
//! `create*` renders the fixture's template and submits it once.
//!
//! | Fixture | Template |
//! |---------|----------|
//! | StorageClass | `storageclass-template.yaml` |
//! | PersistentVolumeClaim | `pvc-template.yaml` |
//! | PersistentVolume | `pv-template.yaml` |
//! | Pod | `pod-template.yaml` |
//! | Deployment | `dep-template.yaml` |
//! | Service | `service-template.yaml` |
//! | NfsServer | `nfs-server-deploy-template.yaml` + Service |
//! | LocalVolume / LocalVolumeSet | typed custom resources |

pub mod deployment;
pub mod local_volume;
pub mod nfs;
pub mod pod;
pub mod pv;
pub mod pvc;
pub mod storage_class;

pub use deployment::{Deployment, DeploymentBuilder};
pub use local_volume::{LocalVolume, LocalVolumeBuilder, LocalVolumeSet, LocalVolumeSetBuilder};
pub use nfs::{NfsServer, Service, ServiceBuilder};
pub use pod::{Pod, PodBuilder};
pub use pv::{PersistentVolume, PersistentVolumeBuilder, PvKind};
pub use pvc::{PersistentVolumeClaim, PersistentVolumeClaimBuilder};
pub use storage_class::{StorageClass, StorageClassBuilder};

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::cli::Cli;
use crate::context::StorageContext;
use crate::error::{Error, Result};
use crate::template::{ExtraParameters, TemplateParams};

/// Image with a shell and the `/hello` binary used for exec-right checks
pub const DEFAULT_POD_IMAGE: &str = "quay.io/openshifttest/hello-openshift:1.2.0";
pub const DEFAULT_MOUNT_PATH: &str = "/mnt/storage";
/// Device path raw block volumes are exposed at
pub const DEFAULT_DEVICE_PATH: &str = "/dev/dblock";
/// Provisioning deadline for PVCs, pods and deployments
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(120);

/// Path of the first rendered object
pub const FIRST_ITEM: &str = "items.0";

/// Something the suite created and must tear down
#[async_trait]
pub trait Fixture: Send + Sync {
    /// Kind as accepted by the CLI (`pvc`, `storageclass`, ...)
    fn kind(&self) -> &'static str;

    fn name(&self) -> &str;

    /// Best-effort delete with cluster-admin credentials; never fails
    async fn delete_as_admin(&self, ctx: &StorageContext);
}

/// How a pod consumes its claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VolumeType {
    /// Filesystem mounted at a path
    #[default]
    Mount,
    /// Raw block device exposed at a path
    RawDevice,
}

impl VolumeType {
    /// Container field holding the volume (`volumeMounts` / `volumeDevices`)
    pub fn container_field(&self) -> &'static str {
        match self {
            VolumeType::Mount => "volumeMounts",
            VolumeType::RawDevice => "volumeDevices",
        }
    }

    /// Path key inside that field (`mountPath` / `devicePath`)
    pub fn path_field(&self) -> &'static str {
        match self {
            VolumeType::Mount => "mountPath",
            VolumeType::RawDevice => "devicePath",
        }
    }
}

/// Namespace a fixture lives in: its own, or the context's current one
pub(crate) fn effective_namespace(namespace: &str, ctx: &StorageContext) -> String {
    if namespace.is_empty() {
        ctx.namespace()
    } else {
        namespace.to_string()
    }
}

/// Turn a submission result into the negative-mode contract.
///
/// With `negative` set, a CLI failure becomes [`Error::Rejected`] and a
/// success becomes [`Error::UnexpectedAdmission`].
pub(crate) fn settle_submission<T>(resource: String, negative: bool, result: Result<T>) -> Result<()> {
    match (negative, result) {
        (false, result) => result.map(|_| ()),
        (true, Ok(_)) => Err(Error::UnexpectedAdmission { resource }),
        (true, Err(Error::CommandFailed { stderr, .. })) => {
            info!(resource = %resource, message = %stderr, "Submission rejected as expected");
            Err(Error::Rejected {
                resource,
                message: stderr,
            })
        }
        (true, Err(e)) => Err(e),
    }
}

/// Render a fixture template and submit it through `cli`
pub(crate) async fn submit_template(
    ctx: &StorageContext,
    cli: &Cli,
    template: &str,
    params: &TemplateParams,
    extra: &ExtraParameters,
    resource: String,
    negative: bool,
) -> Result<()> {
    let path = ctx.template(template);
    let result = ctx
        .renderer()
        .render_and_apply(cli, &path, params, extra)
        .await;
    let settled = settle_submission(resource.clone(), negative, result);
    if settled.is_ok() {
        info!(resource = %resource, "Created");
    }
    settled
}

/// Wrap a typed object in a `v1/List`, merge extras and submit it
pub(crate) async fn submit_object(
    cli: &Cli,
    object: Value,
    extra: &ExtraParameters,
    resource: String,
) -> Result<()> {
    let mut list = json!({"apiVersion": "v1", "kind": "List", "items": [object]});
    extra.apply_to(&mut list)?;
    debug!(resource = %resource, rendered = %list, "Submitting object");
    cli.apply_json(&list).await?;
    info!(resource = %resource, "Created");
    Ok(())
}

/// Delete ignoring every failure
pub(crate) async fn delete_best_effort(cli: &Cli, kind: &str, name: &str, extra: &[&str]) {
    if let Err(e) = cli.delete(kind, name, extra).await {
        debug!(kind, name, error = %e, "Best-effort delete failed");
    }
}

/// `requiredDuringScheduling` node affinity with one match expression
pub fn node_affinity(key: &str, operator: &str, values: &[&str]) -> Value {
    json!({
        "nodeAffinity": {
            "requiredDuringSchedulingIgnoredDuringExecution": {
                "nodeSelectorTerms": [{
                    "matchExpressions": [{
                        "key": key,
                        "operator": operator,
                        "values": values,
                    }]
                }]
            }
        }
    })
}
