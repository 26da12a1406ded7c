//! PersistentVolume fixture and PV lookups.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::PersistentVolume as PersistentVolumeObject;
use serde_json::json;
use tracing::info;

use super::{Fixture, delete_best_effort, submit_template};
use crate::cli::{Cli, PatchType};
use crate::context::StorageContext;
use crate::error::{Error, Result};
use crate::template::{ExtraParameters, TemplateParams};
use crate::util::random::unique_name;
use crate::wait::{ExpectedState, NotFoundPolicy, PollConfig, wait_for_state};

pub const TEMPLATE: &str = "pv-template.yaml";

/// Volume source of a statically provisioned PV
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PvKind {
    #[default]
    Csi,
    Nfs,
    Local,
}

/// A statically provisioned PV
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistentVolume {
    pub name: String,
    pub template: String,
    pub capacity: String,
    pub access_mode: String,
    pub volume_mode: String,
    /// CSI driver (`csi` kind)
    pub driver: String,
    /// CSI volume handle (`csi` kind)
    pub volume_handle: String,
    pub reclaim_policy: String,
    pub storage_class: String,
    pub kind: PvKind,
    /// NFS server address (`nfs` kind)
    pub nfs_server_ip: Option<String>,
    /// Host path (`local` kind)
    pub local_path: Option<String>,
    /// Node holding the disk (`local` kind)
    pub local_node: Option<String>,
}

/// Builder for [`PersistentVolume`]
#[derive(Debug, Clone)]
pub struct PersistentVolumeBuilder {
    pv: PersistentVolume,
}

impl PersistentVolumeBuilder {
    pub fn new(ctx: &StorageContext) -> Self {
        Self {
            pv: PersistentVolume {
                name: unique_name("mypv"),
                template: TEMPLATE.to_string(),
                capacity: ctx.default_capacity(),
                access_mode: "ReadWriteOnce".to_string(),
                volume_mode: "Filesystem".to_string(),
                driver: ctx.default_provisioner(),
                volume_handle: String::new(),
                reclaim_policy: "Delete".to_string(),
                storage_class: String::new(),
                kind: PvKind::Csi,
                nfs_server_ip: None,
                local_path: None,
                local_node: None,
            },
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.pv.name = name.into();
        self
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.pv.template = template.into();
        self
    }

    pub fn capacity(mut self, capacity: impl Into<String>) -> Self {
        self.pv.capacity = capacity.into();
        self
    }

    pub fn access_mode(mut self, mode: impl Into<String>) -> Self {
        self.pv.access_mode = mode.into();
        self
    }

    pub fn volume_mode(mut self, mode: impl Into<String>) -> Self {
        self.pv.volume_mode = mode.into();
        self
    }

    pub fn driver(mut self, driver: impl Into<String>) -> Self {
        self.pv.driver = driver.into();
        self
    }

    pub fn volume_handle(mut self, handle: impl Into<String>) -> Self {
        self.pv.volume_handle = handle.into();
        self
    }

    pub fn reclaim_policy(mut self, policy: impl Into<String>) -> Self {
        self.pv.reclaim_policy = policy.into();
        self
    }

    pub fn storage_class(mut self, storage_class: impl Into<String>) -> Self {
        self.pv.storage_class = storage_class.into();
        self
    }

    pub fn kind(mut self, kind: PvKind) -> Self {
        self.pv.kind = kind;
        self
    }

    /// NFS-backed PV exporting `/` of `server_ip`
    pub fn nfs_server_ip(mut self, server_ip: impl Into<String>) -> Self {
        self.pv.kind = PvKind::Nfs;
        self.pv.nfs_server_ip = Some(server_ip.into());
        self
    }

    /// Local PV at `path` on `node`
    pub fn local(mut self, path: impl Into<String>, node: impl Into<String>) -> Self {
        self.pv.kind = PvKind::Local;
        self.pv.local_path = Some(path.into());
        self.pv.local_node = Some(node.into());
        self
    }

    pub fn build(self) -> PersistentVolume {
        self.pv
    }
}

impl PersistentVolume {
    pub fn builder(ctx: &StorageContext) -> PersistentVolumeBuilder {
        PersistentVolumeBuilder::new(ctx)
    }

    fn params(&self) -> TemplateParams {
        TemplateParams::new()
            .param("PVNAME", &self.name)
            .param("PVCAPACITY", &self.capacity)
            .param("ACCESSMODE", &self.access_mode)
            .param("VOLUMEMODE", &self.volume_mode)
            .param("RECLAIMPOLICY", &self.reclaim_policy)
            .param("SCNAME", &self.storage_class)
    }

    /// Volume source merged into the rendered PV
    pub fn source_extra(&self) -> Result<ExtraParameters> {
        let extra = ExtraParameters::new();
        Ok(match self.kind {
            PvKind::Csi => {
                if self.volume_handle.is_empty() {
                    return Err(Error::Validation(format!("CSI PV {} has no volume handle", self.name)));
                }
                extra.spec(json!({"csi": {"driver": self.driver, "volumeHandle": self.volume_handle}}))
            }
            PvKind::Nfs => {
                let server = self.nfs_server_ip.as_deref().ok_or_else(|| {
                    Error::Validation(format!("NFS PV {} has no server address", self.name))
                })?;
                extra.spec(json!({"nfs": {"server": server, "path": "/"}}))
            }
            PvKind::Local => {
                let (Some(path), Some(node)) = (self.local_path.as_deref(), self.local_node.as_deref())
                else {
                    return Err(Error::Validation(format!("local PV {} needs a path and a node", self.name)));
                };
                extra.spec(json!({
                    "local": {"path": path},
                    "nodeAffinity": {"required": {"nodeSelectorTerms": [{
                        "matchExpressions": [{
                            "key": "kubernetes.io/hostname",
                            "operator": "In",
                            "values": [node],
                        }]
                    }]}}
                }))
            }
        })
    }

    fn resource(&self) -> String {
        format!("PersistentVolume {}", self.name)
    }

    fn admin_cli(ctx: &StorageContext) -> Cli {
        ctx.admin().without_namespace()
    }

    pub async fn create(&self, ctx: &StorageContext) -> Result<()> {
        self.create_with_extra_parameters(ctx, &ExtraParameters::new())
            .await
    }

    /// Create with the kind's volume source plus `extra`
    pub async fn create_with_extra_parameters(
        &self,
        ctx: &StorageContext,
        extra: &ExtraParameters,
    ) -> Result<()> {
        let merged = self.source_extra()?.merge(extra);
        submit_template(
            ctx,
            &Self::admin_cli(ctx),
            &self.template,
            &self.params(),
            &merged,
            self.resource(),
            false,
        )
        .await
    }

    /// Delete as the test user; errors propagate
    pub async fn delete(&self, ctx: &StorageContext) -> Result<()> {
        ctx.cli()
            .without_namespace()
            .delete("pv", &self.name, &[])
            .await
    }

    pub async fn get(&self, ctx: &StorageContext) -> Result<PersistentVolumeObject> {
        Self::admin_cli(ctx).get_json("pv", &self.name).await
    }

    pub async fn status(&self, ctx: &StorageContext) -> Result<String> {
        pv_status(ctx, &self.name).await
    }

    pub async fn wait_status(&self, ctx: &StorageContext, phase: &str) -> Result<()> {
        wait_for_pv_status(ctx, &self.name, phase, NotFoundPolicy::SatisfiesDeleted, PollConfig::RESOURCE).await
    }

    /// `spec.capacity.storage`
    pub async fn capacity_on_cluster(&self, ctx: &StorageContext) -> Result<String> {
        Self::admin_cli(ctx)
            .get_jsonpath("pv", &self.name, "{.spec.capacity.storage}")
            .await
    }

    /// Patch `spec.capacity.storage` after the backing volume has grown
    pub async fn expand_capacity(&mut self, ctx: &StorageContext, capacity: &str) -> Result<()> {
        expand_pv_capacity(ctx, &self.name, capacity).await?;
        self.capacity = capacity.to_string();
        Ok(())
    }
}

#[async_trait]
impl Fixture for PersistentVolume {
    fn kind(&self) -> &'static str {
        "pv"
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn delete_as_admin(&self, ctx: &StorageContext) {
        delete_best_effort(&Self::admin_cli(ctx), "pv", &self.name, &[]).await;
    }
}

/// Name of the PV bound to a claim
pub async fn pv_name_by_pvc(ctx: &StorageContext, namespace: &str, pvc: &str) -> Result<String> {
    let name = ctx
        .admin()
        .with_namespace(namespace)
        .get_jsonpath("pvc", pvc, "{.spec.volumeName}")
        .await?;
    if name.is_empty() {
        return Err(Error::Validation(format!("PVC {namespace}/{pvc} is not bound")));
    }
    Ok(name)
}

/// `status.phase` of a PV
pub async fn pv_status(ctx: &StorageContext, name: &str) -> Result<String> {
    ctx.admin()
        .without_namespace()
        .get_jsonpath("pv", name, "{.status.phase}")
        .await
}

/// Wait for a PV phase, treating not-found per `policy`
pub async fn wait_for_pv_status(
    ctx: &StorageContext,
    name: &str,
    phase: &str,
    policy: NotFoundPolicy,
    config: PollConfig,
) -> Result<()> {
    wait_for_state(
        &format!("PersistentVolume {name}"),
        &ExpectedState::value(phase),
        policy,
        config,
        || pv_status(ctx, name),
    )
    .await
}

/// Wait for a PV to disappear
pub async fn wait_pv_deleted(ctx: &StorageContext, name: &str, config: PollConfig) -> Result<()> {
    wait_for_state(
        &format!("PersistentVolume {name}"),
        &ExpectedState::Deleted,
        NotFoundPolicy::SatisfiesDeleted,
        config,
        || pv_status(ctx, name),
    )
    .await
}

/// Patch `spec.capacity.storage` of a PV
pub async fn expand_pv_capacity(ctx: &StorageContext, name: &str, capacity: &str) -> Result<()> {
    let patch = json!({"spec": {"capacity": {"storage": capacity}}});
    ctx.admin()
        .without_namespace()
        .patch("pv", name, &patch, PatchType::Merge)
        .await?;
    info!(pv = name, capacity, "Patched PV capacity");
    Ok(())
}
