//! PersistentVolumeClaim fixture.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolume as PersistentVolumeObject, PersistentVolumeClaim as PersistentVolumeClaimObject};
use serde_json::{Value, json};
use tracing::info;

use super::{DEFAULT_MAX_WAIT, Fixture, delete_best_effort, effective_namespace, submit_template};
use crate::cli::{Cli, PatchType};
use crate::context::StorageContext;
use crate::error::{Error, Result};
use crate::template::{DEFAULT_EXTRA_PREFIX, ExtraParameters, TemplateParams};
use crate::util::random::unique_name;
use crate::wait::{ExpectedState, NotFoundPolicy, PollConfig, check_consistently, wait_for_state};

pub const TEMPLATE: &str = "pvc-template.yaml";

/// A PVC the scenario owns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistentVolumeClaim {
    pub name: String,
    /// Empty means the context's current namespace
    pub namespace: String,
    pub storage_class: String,
    pub access_mode: String,
    pub volume_mode: String,
    pub capacity: String,
    /// Source PVC or snapshot for clone/restore claims
    pub data_source_name: Option<String>,
    pub template: String,
    pub max_wait: Duration,
}

/// Builder for [`PersistentVolumeClaim`]
#[derive(Debug, Clone)]
pub struct PersistentVolumeClaimBuilder {
    pvc: PersistentVolumeClaim,
}

impl PersistentVolumeClaimBuilder {
    pub fn new(ctx: &StorageContext) -> Self {
        Self {
            pvc: PersistentVolumeClaim {
                name: unique_name("my-pvc"),
                namespace: String::new(),
                storage_class: String::new(),
                access_mode: "ReadWriteOnce".to_string(),
                volume_mode: "Filesystem".to_string(),
                capacity: ctx.default_capacity(),
                data_source_name: None,
                template: TEMPLATE.to_string(),
                max_wait: DEFAULT_MAX_WAIT,
            },
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.pvc.name = name.into();
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.pvc.namespace = namespace.into();
        self
    }

    pub fn storage_class(mut self, storage_class: impl Into<String>) -> Self {
        self.pvc.storage_class = storage_class.into();
        self
    }

    pub fn access_mode(mut self, mode: impl Into<String>) -> Self {
        self.pvc.access_mode = mode.into();
        self
    }

    pub fn volume_mode(mut self, mode: impl Into<String>) -> Self {
        self.pvc.volume_mode = mode.into();
        self
    }

    pub fn capacity(mut self, capacity: impl Into<String>) -> Self {
        self.pvc.capacity = capacity.into();
        self
    }

    pub fn data_source_name(mut self, name: impl Into<String>) -> Self {
        self.pvc.data_source_name = Some(name.into());
        self
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.pvc.template = template.into();
        self
    }

    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.pvc.max_wait = max_wait;
        self
    }

    pub fn build(self) -> PersistentVolumeClaim {
        self.pvc
    }
}

impl PersistentVolumeClaim {
    pub fn builder(ctx: &StorageContext) -> PersistentVolumeClaimBuilder {
        PersistentVolumeClaimBuilder::new(ctx)
    }

    pub fn namespace(&self, ctx: &StorageContext) -> String {
        effective_namespace(&self.namespace, ctx)
    }

    fn user_cli(&self, ctx: &StorageContext) -> Cli {
        ctx.cli().with_namespace(self.namespace(ctx))
    }

    fn admin_cli(&self, ctx: &StorageContext) -> Cli {
        ctx.admin().with_namespace(self.namespace(ctx))
    }

    fn params(&self, ctx: &StorageContext) -> TemplateParams {
        TemplateParams::new()
            .param("PVCNAME", &self.name)
            .param("PVCNAMESPACE", self.namespace(ctx))
            .param("SCNAME", &self.storage_class)
            .param("ACCESSMODE", &self.access_mode)
            .param("VOLUMEMODE", &self.volume_mode)
            .param("PVCCAPACITY", &self.capacity)
    }

    fn resource(&self, ctx: &StorageContext) -> String {
        format!("PersistentVolumeClaim {}/{}", self.namespace(ctx), self.name)
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
        submit_template(
            ctx,
            &self.user_cli(ctx),
            &self.template,
            &self.params(ctx),
            extra,
            self.resource(ctx),
            false,
        )
        .await
    }

    fn data_source(&self, kind: &str, api_group: Option<&str>) -> Result<Value> {
        let name = self.data_source_name.as_deref().ok_or_else(|| {
            Error::Validation(format!("PVC {} has no data source name", self.name))
        })?;
        let mut source = json!({"kind": kind, "name": name});
        if let (Some(group), Some(obj)) = (api_group, source.as_object_mut()) {
            obj.insert("apiGroup".to_string(), Value::String(group.to_string()));
        }
        Ok(source)
    }

    /// Clone `data_source_name` (another PVC)
    pub async fn create_with_clone_data_source(&self, ctx: &StorageContext) -> Result<()> {
        let extra = ExtraParameters::new().spec(json!({
            "dataSource": self.data_source("PersistentVolumeClaim", None)?
        }));
        self.create_with_extra_parameters(ctx, &extra).await
    }

    /// Restore from the VolumeSnapshot `data_source_name`
    pub async fn create_with_snapshot_data_source(&self, ctx: &StorageContext) -> Result<()> {
        let extra = ExtraParameters::new().spec(json!({
            "dataSource": self.data_source("VolumeSnapshot", Some("snapshot.storage.k8s.io"))?
        }));
        self.create_with_extra_parameters(ctx, &extra).await
    }

    /// Pre-bind to the PV `pv_name`
    pub async fn create_with_specified_pv(&self, ctx: &StorageContext, pv_name: &str) -> Result<()> {
        let extra = ExtraParameters::new().spec(json!({"volumeName": pv_name}));
        self.create_with_extra_parameters(ctx, &extra).await
    }

    /// Omit `storageClassName` so the cluster default class applies
    pub async fn create_without_storage_class_name(&self, ctx: &StorageContext) -> Result<()> {
        let extra =
            ExtraParameters::new().remove(format!("{DEFAULT_EXTRA_PREFIX}.storageClassName"));
        self.create_with_extra_parameters(ctx, &extra).await
    }

    /// Delete as the test user; errors propagate
    pub async fn delete(&self, ctx: &StorageContext) -> Result<()> {
        self.user_cli(ctx).delete("pvc", &self.name, &[]).await
    }

    pub async fn get(&self, ctx: &StorageContext) -> Result<PersistentVolumeClaimObject> {
        self.admin_cli(ctx).get_json("pvc", &self.name).await
    }

    async fn jsonpath(&self, ctx: &StorageContext, path: &str) -> Result<String> {
        self.admin_cli(ctx)
            .get_jsonpath("pvc", &self.name, path)
            .await
    }

    /// `status.phase`
    pub async fn status(&self, ctx: &StorageContext) -> Result<String> {
        self.jsonpath(ctx, "{.status.phase}").await
    }

    /// Bound PV name
    pub async fn volume_name(&self, ctx: &StorageContext) -> Result<String> {
        let name = self.jsonpath(ctx, "{.spec.volumeName}").await?;
        if name.is_empty() {
            return Err(Error::Validation(format!("PVC {} is not bound to a volume", self.name)));
        }
        Ok(name)
    }

    async fn bound_pv(&self, ctx: &StorageContext) -> Result<PersistentVolumeObject> {
        let pv_name = self.volume_name(ctx).await?;
        ctx.admin()
            .without_namespace()
            .get_json("pv", &pv_name)
            .await
    }

    /// CSI volume handle of the bound PV
    pub async fn volume_id(&self, ctx: &StorageContext) -> Result<String> {
        self.bound_pv(ctx)
            .await?
            .spec
            .and_then(|s| s.csi)
            .map(|csi| csi.volume_handle)
            .ok_or_else(|| Error::Validation(format!("PV of PVC {} is not a CSI volume", self.name)))
    }

    /// CSI `volumeAttributes` of the bound PV
    pub async fn volume_attributes(&self, ctx: &StorageContext) -> Result<BTreeMap<String, String>> {
        Ok(self
            .bound_pv(ctx)
            .await?
            .spec
            .and_then(|s| s.csi)
            .and_then(|csi| csi.volume_attributes)
            .unwrap_or_default())
    }

    /// `status.capacity.storage`
    pub async fn size_from_status(&self, ctx: &StorageContext) -> Result<String> {
        self.jsonpath(ctx, "{.status.capacity.storage}").await
    }

    /// Condition types currently set (`Resizing`, `FileSystemResizePending`, ...)
    pub async fn resize_conditions(&self, ctx: &StorageContext) -> Result<Vec<String>> {
        Ok(self
            .get(ctx)
            .await?
            .status
            .and_then(|s| s.conditions)
            .unwrap_or_default()
            .into_iter()
            .map(|c| c.type_)
            .collect())
    }

    /// Request a new size; the fixture remembers it
    pub async fn expand(&mut self, ctx: &StorageContext, capacity: &str) -> Result<()> {
        let patch = json!({"spec": {"resources": {"requests": {"storage": capacity}}}});
        self.user_cli(ctx)
            .patch("pvc", &self.name, &patch, PatchType::Merge)
            .await?;
        info!(pvc = %self.name, capacity, "Requested PVC expansion");
        self.capacity = capacity.to_string();
        Ok(())
    }

    /// Wait for `status.phase` within `max_wait`
    pub async fn wait_status(&self, ctx: &StorageContext, phase: &str) -> Result<()> {
        let resource = self.resource(ctx);
        wait_for_state(
            &resource,
            &ExpectedState::value(phase),
            NotFoundPolicy::SatisfiesDeleted,
            PollConfig::RESOURCE.with_timeout(self.max_wait),
            || self.status(ctx),
        )
        .await
    }

    pub async fn wait_bound(&self, ctx: &StorageContext) -> Result<()> {
        self.wait_status(ctx, "Bound").await
    }

    /// Wait until `status.capacity.storage` reports `capacity`
    pub async fn wait_resize_success(&self, ctx: &StorageContext, capacity: &str) -> Result<()> {
        let resource = format!("{} capacity", self.resource(ctx));
        wait_for_state(
            &resource,
            &ExpectedState::value(capacity),
            NotFoundPolicy::SatisfiesDeleted,
            PollConfig::LONG,
            || self.size_from_status(ctx),
        )
        .await
    }

    /// Require `status.phase` to stay `phase` for `window`
    pub async fn check_status_consistently(
        &self,
        ctx: &StorageContext,
        phase: &str,
        window: Duration,
    ) -> Result<()> {
        let description = format!("{} staying {phase}", self.resource(ctx));
        check_consistently(&description, PollConfig::SHORT.with_timeout(window), || async move {
            Ok(self.status(ctx).await? == phase)
        })
        .await
    }

    pub async fn wait_deleted(&self, ctx: &StorageContext) -> Result<()> {
        wait_for_state(
            &self.resource(ctx),
            &ExpectedState::Deleted,
            NotFoundPolicy::SatisfiesDeleted,
            PollConfig::RESOURCE,
            || self.status(ctx),
        )
        .await
    }

    pub async fn describe(&self, ctx: &StorageContext) -> Result<String> {
        self.admin_cli(ctx).describe("pvc", &self.name).await
    }
}

#[async_trait]
impl Fixture for PersistentVolumeClaim {
    fn kind(&self) -> &'static str {
        "pvc"
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn delete_as_admin(&self, ctx: &StorageContext) {
        delete_best_effort(&self.admin_cli(ctx), "pvc", &self.name, &[]).await;
    }
}
