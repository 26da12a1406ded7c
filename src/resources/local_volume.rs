//! Local Storage Operator fixtures.
//!
//! LocalVolume and LocalVolumeSet are submitted as typed custom resources.
//! The operator creates one local PV per matched device; PVs are left
//! behind when the custom resource is deleted, and a released PV is
//! recreated under the same name once its disk is wiped.

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::PersistentVolume as PersistentVolumeObject;
use kube::core::ObjectMeta;
use serde_json::json;
use tracing::{debug, info};

use super::pv::wait_for_pv_status;
use super::{DEFAULT_MAX_WAIT, Fixture, delete_best_effort, submit_object};
use crate::cli::Cli;
use crate::context::StorageContext;
use crate::crd::{
    DeviceInclusionSpec, LSO_NAMESPACE, LocalVolumeResource, LocalVolumeSetResource,
    LocalVolumeSetSpec, LocalVolumeSpec, NodeSelector, StorageClassDevice, condition_true,
};
use crate::error::{Error, Result};
use crate::template::ExtraParameters;
use crate::util::random::unique_name;
use crate::wait::{NotFoundPolicy, PollConfig, poll_until};

/// Condition the operator sets once the diskmaker is running
pub const AVAILABLE_CONDITION: &str = "Available";

fn object_meta(name: &str, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    }
}

fn node_selector(hosts: &[String]) -> Option<NodeSelector> {
    (!hosts.is_empty()).then(|| NodeSelector::hostnames(hosts.to_vec()))
}

/// A LocalVolume exposing one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVolume {
    pub name: String,
    pub namespace: String,
    /// Device path, preferably under `/dev/disk/by-id`
    pub device_id: String,
    pub fs_type: String,
    pub volume_mode: String,
    pub storage_class: String,
    /// Restrict the diskmaker to these hostnames; empty selects every node
    pub nodes: Vec<String>,
    pub max_wait: Duration,
}

/// Builder for [`LocalVolume`]
#[derive(Debug, Clone)]
pub struct LocalVolumeBuilder {
    lv: LocalVolume,
}

impl LocalVolumeBuilder {
    pub fn new(_ctx: &StorageContext) -> Self {
        Self {
            lv: LocalVolume {
                name: unique_name("lv"),
                namespace: LSO_NAMESPACE.to_string(),
                device_id: String::new(),
                fs_type: "ext4".to_string(),
                volume_mode: "Filesystem".to_string(),
                storage_class: unique_name("lvsc"),
                nodes: Vec::new(),
                max_wait: DEFAULT_MAX_WAIT,
            },
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.lv.name = name.into();
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.lv.namespace = namespace.into();
        self
    }

    pub fn device_id(mut self, device_id: impl Into<String>) -> Self {
        self.lv.device_id = device_id.into();
        self
    }

    pub fn fs_type(mut self, fs_type: impl Into<String>) -> Self {
        self.lv.fs_type = fs_type.into();
        self
    }

    pub fn volume_mode(mut self, mode: impl Into<String>) -> Self {
        self.lv.volume_mode = mode.into();
        self
    }

    pub fn storage_class(mut self, storage_class: impl Into<String>) -> Self {
        self.lv.storage_class = storage_class.into();
        self
    }

    pub fn nodes(mut self, nodes: Vec<String>) -> Self {
        self.lv.nodes = nodes;
        self
    }

    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.lv.max_wait = max_wait;
        self
    }

    pub fn build(self) -> LocalVolume {
        self.lv
    }
}

impl LocalVolume {
    pub fn builder(ctx: &StorageContext) -> LocalVolumeBuilder {
        LocalVolumeBuilder::new(ctx)
    }

    /// The custom resource submitted by `create`
    pub fn to_resource(&self) -> LocalVolumeResource {
        let fs_type = (self.volume_mode == "Filesystem").then(|| self.fs_type.clone());
        let mut resource = LocalVolumeResource::new(
            &self.name,
            LocalVolumeSpec {
                node_selector: node_selector(&self.nodes),
                tolerations: Vec::new(),
                storage_class_devices: vec![StorageClassDevice {
                    storage_class_name: self.storage_class.clone(),
                    volume_mode: self.volume_mode.clone(),
                    fs_type,
                    device_paths: vec![self.device_id.clone()],
                }],
            },
        );
        resource.metadata = object_meta(&self.name, &self.namespace);
        resource
    }

    fn resource(&self) -> String {
        format!("LocalVolume {}/{}", self.namespace, self.name)
    }

    fn admin_cli(&self, ctx: &StorageContext) -> Cli {
        ctx.admin().with_namespace(&self.namespace)
    }

    pub async fn create(&self, ctx: &StorageContext) -> Result<()> {
        self.create_with_extra_parameters(ctx, &ExtraParameters::new())
            .await
    }

    pub async fn create_with_extra_parameters(
        &self,
        ctx: &StorageContext,
        extra: &ExtraParameters,
    ) -> Result<()> {
        if self.device_id.is_empty() {
            return Err(Error::Validation(format!("{} has no device", self.resource())));
        }
        let object = serde_json::to_value(self.to_resource())?;
        submit_object(&self.admin_cli(ctx), object, extra, self.resource()).await
    }

    /// Delete as the test user; errors propagate
    pub async fn delete(&self, ctx: &StorageContext) -> Result<()> {
        ctx.cli()
            .with_namespace(&self.namespace)
            .delete("localvolume", &self.name, &[])
            .await
    }

    pub async fn get(&self, ctx: &StorageContext) -> Result<LocalVolumeResource> {
        self.admin_cli(ctx).get_json("localvolume", &self.name).await
    }

    /// Wait for the operator to report the LocalVolume available
    pub async fn wait_available(&self, ctx: &StorageContext) -> Result<()> {
        let description = format!("{} to be {AVAILABLE_CONDITION}", self.resource());
        poll_until(&description, PollConfig::RESOURCE.with_timeout(self.max_wait), || async move {
            let lv = self.get(ctx).await?;
            Ok(lv
                .status
                .is_some_and(|s| condition_true(&s.conditions, AVAILABLE_CONDITION)))
        })
        .await
    }

    /// Local PVs created for this LocalVolume's StorageClass
    pub async fn local_pvs(&self, ctx: &StorageContext) -> Result<Vec<String>> {
        local_pvs_by_storage_class(ctx, &self.storage_class).await
    }
}

#[async_trait]
impl Fixture for LocalVolume {
    fn kind(&self) -> &'static str {
        "localvolume"
    }

    fn name(&self) -> &str {
        &self.name
    }

    /// Also removes the PVs the operator left behind
    async fn delete_as_admin(&self, ctx: &StorageContext) {
        delete_best_effort(&self.admin_cli(ctx), "localvolume", &self.name, &[]).await;
        delete_local_pvs(ctx, &self.storage_class).await;
    }
}

/// A LocalVolumeSet matching devices by filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVolumeSet {
    pub name: String,
    pub namespace: String,
    pub fs_type: String,
    pub volume_mode: String,
    pub storage_class: String,
    pub max_device_count: Option<i32>,
    pub device_types: Vec<String>,
    pub min_size: Option<String>,
    pub max_size: Option<String>,
    pub nodes: Vec<String>,
    pub max_wait: Duration,
}

/// Builder for [`LocalVolumeSet`]
#[derive(Debug, Clone)]
pub struct LocalVolumeSetBuilder {
    lvs: LocalVolumeSet,
}

impl LocalVolumeSetBuilder {
    pub fn new(_ctx: &StorageContext) -> Self {
        Self {
            lvs: LocalVolumeSet {
                name: unique_name("lvs"),
                namespace: LSO_NAMESPACE.to_string(),
                fs_type: "ext4".to_string(),
                volume_mode: "Filesystem".to_string(),
                storage_class: unique_name("lvs-sc"),
                max_device_count: Some(10),
                device_types: vec!["disk".to_string(), "part".to_string()],
                min_size: Some("1Gi".to_string()),
                max_size: None,
                nodes: Vec::new(),
                max_wait: DEFAULT_MAX_WAIT,
            },
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.lvs.name = name.into();
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.lvs.namespace = namespace.into();
        self
    }

    pub fn fs_type(mut self, fs_type: impl Into<String>) -> Self {
        self.lvs.fs_type = fs_type.into();
        self
    }

    pub fn volume_mode(mut self, mode: impl Into<String>) -> Self {
        self.lvs.volume_mode = mode.into();
        self
    }

    pub fn storage_class(mut self, storage_class: impl Into<String>) -> Self {
        self.lvs.storage_class = storage_class.into();
        self
    }

    pub fn max_device_count(mut self, count: i32) -> Self {
        self.lvs.max_device_count = Some(count);
        self
    }

    pub fn device_types(mut self, types: Vec<String>) -> Self {
        self.lvs.device_types = types;
        self
    }

    pub fn min_size(mut self, size: impl Into<String>) -> Self {
        self.lvs.min_size = Some(size.into());
        self
    }

    pub fn max_size(mut self, size: impl Into<String>) -> Self {
        self.lvs.max_size = Some(size.into());
        self
    }

    pub fn nodes(mut self, nodes: Vec<String>) -> Self {
        self.lvs.nodes = nodes;
        self
    }

    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.lvs.max_wait = max_wait;
        self
    }

    pub fn build(self) -> LocalVolumeSet {
        self.lvs
    }
}

impl LocalVolumeSet {
    pub fn builder(ctx: &StorageContext) -> LocalVolumeSetBuilder {
        LocalVolumeSetBuilder::new(ctx)
    }

    /// The custom resource submitted by `create`
    pub fn to_resource(&self) -> LocalVolumeSetResource {
        let fs_type = (self.volume_mode == "Filesystem").then(|| self.fs_type.clone());
        let mut resource = LocalVolumeSetResource::new(
            &self.name,
            LocalVolumeSetSpec {
                storage_class_name: self.storage_class.clone(),
                volume_mode: self.volume_mode.clone(),
                fs_type,
                max_device_count: self.max_device_count,
                node_selector: node_selector(&self.nodes),
                tolerations: Vec::new(),
                device_inclusion_spec: Some(DeviceInclusionSpec {
                    device_types: self.device_types.clone(),
                    device_mechanical_properties: Vec::new(),
                    min_size: self.min_size.clone(),
                    max_size: self.max_size.clone(),
                }),
            },
        );
        resource.metadata = object_meta(&self.name, &self.namespace);
        resource
    }

    fn resource(&self) -> String {
        format!("LocalVolumeSet {}/{}", self.namespace, self.name)
    }

    fn admin_cli(&self, ctx: &StorageContext) -> Cli {
        ctx.admin().with_namespace(&self.namespace)
    }

    pub async fn create(&self, ctx: &StorageContext) -> Result<()> {
        self.create_with_extra_parameters(ctx, &ExtraParameters::new())
            .await
    }

    pub async fn create_with_extra_parameters(
        &self,
        ctx: &StorageContext,
        extra: &ExtraParameters,
    ) -> Result<()> {
        let object = serde_json::to_value(self.to_resource())?;
        submit_object(&self.admin_cli(ctx), object, extra, self.resource()).await
    }

    /// Only provision devices of the given types (`disk`, `part`, `mpath`)
    pub async fn create_with_specified_device_types(
        &self,
        ctx: &StorageContext,
        device_types: &[&str],
    ) -> Result<()> {
        let extra = ExtraParameters::new().at(
            "items.0.spec.deviceInclusionSpec",
            json!({"deviceTypes": device_types}),
        );
        self.create_with_extra_parameters(ctx, &extra).await
    }

    /// Delete as the test user; errors propagate
    pub async fn delete(&self, ctx: &StorageContext) -> Result<()> {
        ctx.cli()
            .with_namespace(&self.namespace)
            .delete("localvolumeset", &self.name, &[])
            .await
    }

    pub async fn get(&self, ctx: &StorageContext) -> Result<LocalVolumeSetResource> {
        self.admin_cli(ctx)
            .get_json("localvolumeset", &self.name)
            .await
    }

    /// `status.totalProvisionedDeviceCount`, zero when unset
    pub async fn provisioned_device_count(&self, ctx: &StorageContext) -> Result<i32> {
        Ok(self
            .get(ctx)
            .await?
            .status
            .and_then(|s| s.total_provisioned_device_count)
            .unwrap_or(0))
    }

    /// Wait until at least `min_count` devices have been provisioned
    pub async fn wait_device_provisioned(&self, ctx: &StorageContext, min_count: i32) -> Result<()> {
        let description = format!("{} to provision {min_count} devices", self.resource());
        poll_until(&description, PollConfig::LONG, || async move {
            Ok(self.provisioned_device_count(ctx).await? >= min_count)
        })
        .await?;
        info!(lvs = %self.name, min_count, "LocalVolumeSet devices provisioned");
        Ok(())
    }

    pub async fn wait_available(&self, ctx: &StorageContext) -> Result<()> {
        let description = format!("{} to be {AVAILABLE_CONDITION}", self.resource());
        poll_until(&description, PollConfig::RESOURCE.with_timeout(self.max_wait), || async move {
            let lvs = self.get(ctx).await?;
            Ok(lvs
                .status
                .is_some_and(|s| condition_true(&s.conditions, AVAILABLE_CONDITION)))
        })
        .await
    }

    pub async fn local_pvs(&self, ctx: &StorageContext) -> Result<Vec<String>> {
        local_pvs_by_storage_class(ctx, &self.storage_class).await
    }
}

#[async_trait]
impl Fixture for LocalVolumeSet {
    fn kind(&self) -> &'static str {
        "localvolumeset"
    }

    fn name(&self) -> &str {
        &self.name
    }

    /// Also removes the PVs the operator left behind
    async fn delete_as_admin(&self, ctx: &StorageContext) {
        delete_best_effort(&self.admin_cli(ctx), "localvolumeset", &self.name, &[]).await;
        delete_local_pvs(ctx, &self.storage_class).await;
    }
}

/// Names of PVs belonging to `storage_class`
pub async fn local_pvs_by_storage_class(ctx: &StorageContext, storage_class: &str) -> Result<Vec<String>> {
    let pvs: Vec<PersistentVolumeObject> = ctx
        .admin()
        .without_namespace()
        .list_json("pv", None)
        .await?;
    Ok(pvs
        .into_iter()
        .filter(|pv| {
            pv.spec
                .as_ref()
                .and_then(|s| s.storage_class_name.as_deref())
                == Some(storage_class)
        })
        .filter_map(|pv| pv.metadata.name)
        .collect())
}

async fn delete_local_pvs(ctx: &StorageContext, storage_class: &str) {
    let cli = ctx.admin().without_namespace();
    match local_pvs_by_storage_class(ctx, storage_class).await {
        Ok(pvs) => {
            for pv in pvs {
                delete_best_effort(&cli, "pv", &pv, &[]).await;
            }
        }
        Err(e) => debug!(storage_class, error = %e, "Failed to list local PVs for cleanup"),
    }
}

/// Wait for the operator to recreate a released local PV as `Available`.
///
/// The PV disappears while its disk is wiped, so not-found keeps polling.
pub async fn wait_local_pv_recreated(ctx: &StorageContext, pv_name: &str, config: PollConfig) -> Result<()> {
    wait_for_pv_status(ctx, pv_name, "Available", NotFoundPolicy::Retry, config).await
}
