//! Deployment fixture.

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod as PodObject;
use serde_json::json;
use tracing::info;

use super::pod::{check_data_exist, check_exec_right, check_raw_block, check_read_write, write_raw_block};
use super::{
    DEFAULT_MAX_WAIT, DEFAULT_MOUNT_PATH, Fixture, VolumeType, delete_best_effort,
    effective_namespace, node_affinity, submit_template,
};
use crate::cli::Cli;
use crate::context::StorageContext;
use crate::error::{Error, Result};
use crate::template::{ExtraParameters, TemplateParams};
use crate::util::random::unique_name;
use crate::wait::{ExpectedState, NotFoundPolicy, PollConfig, wait_for_state};

pub const TEMPLATE: &str = "dep-template.yaml";

/// A Deployment whose pods share one PVC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub name: String,
    /// Empty means the context's current namespace
    pub namespace: String,
    pub replicas: u32,
    /// Value of the `app` label on the pod template
    pub app_label: String,
    pub mount_path: String,
    pub pvc_name: String,
    pub template: String,
    pub volume_type: VolumeType,
    pub max_wait: Duration,
}

/// Builder for [`Deployment`]
#[derive(Debug, Clone)]
pub struct DeploymentBuilder {
    dep: Deployment,
}

impl DeploymentBuilder {
    pub fn new(_ctx: &StorageContext) -> Self {
        let name = unique_name("mydep");
        Self {
            dep: Deployment {
                app_label: name.clone(),
                name,
                namespace: String::new(),
                replicas: 1,
                mount_path: DEFAULT_MOUNT_PATH.to_string(),
                pvc_name: String::new(),
                template: TEMPLATE.to_string(),
                volume_type: VolumeType::Mount,
                max_wait: DEFAULT_MAX_WAIT,
            },
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.dep.name = name.into();
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.dep.namespace = namespace.into();
        self
    }

    pub fn replicas(mut self, replicas: u32) -> Self {
        self.dep.replicas = replicas;
        self
    }

    pub fn app_label(mut self, label: impl Into<String>) -> Self {
        self.dep.app_label = label.into();
        self
    }

    pub fn mount_path(mut self, path: impl Into<String>) -> Self {
        self.dep.mount_path = path.into();
        self
    }

    pub fn pvc_name(mut self, pvc_name: impl Into<String>) -> Self {
        self.dep.pvc_name = pvc_name.into();
        self
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.dep.template = template.into();
        self
    }

    pub fn volume_type(mut self, volume_type: VolumeType) -> Self {
        self.dep.volume_type = volume_type;
        self
    }

    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.dep.max_wait = max_wait;
        self
    }

    pub fn build(self) -> Deployment {
        self.dep
    }
}

impl Deployment {
    pub fn builder(ctx: &StorageContext) -> DeploymentBuilder {
        DeploymentBuilder::new(ctx)
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
            .param("DNAME", &self.name)
            .param("DNAMESPACE", self.namespace(ctx))
            .param("REPLICASNUM", self.replicas.to_string())
            .param("DLABEL", &self.app_label)
            .param("MPATH", &self.mount_path)
            .param("PVCNAME", &self.pvc_name)
            .param("VOLUMETYPE", self.volume_type.container_field())
            .param("TYPEPATH", self.volume_type.path_field())
    }

    fn resource(&self, ctx: &StorageContext) -> String {
        format!("Deployment {}/{}", self.namespace(ctx), self.name)
    }

    /// Label selector matching the deployment's pods
    pub fn selector(&self) -> String {
        format!("app={}", self.app_label)
    }

    pub async fn create(&self, ctx: &StorageContext) -> Result<()> {
        self.create_with_extra_parameters(ctx, &ExtraParameters::new())
            .await
    }

    pub(crate) async fn create_with_cli(
        &self,
        ctx: &StorageContext,
        cli: &Cli,
        extra: &ExtraParameters,
    ) -> Result<()> {
        submit_template(
            ctx,
            cli,
            &self.template,
            &self.params(ctx),
            extra,
            self.resource(ctx),
            false,
        )
        .await
    }

    pub async fn create_with_extra_parameters(
        &self,
        ctx: &StorageContext,
        extra: &ExtraParameters,
    ) -> Result<()> {
        self.create_with_cli(ctx, &self.user_cli(ctx), extra).await
    }

    /// Schedule pods onto nodes labelled `key=value`
    pub async fn create_with_node_selector(
        &self,
        ctx: &StorageContext,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let extra = ExtraParameters::new()
            .at("items.0.spec.template.spec", json!({"nodeSelector": {key: value}}));
        self.create_with_extra_parameters(ctx, &extra).await
    }

    /// Require node affinity `key <operator> values` for every pod
    pub async fn create_with_node_affinity(
        &self,
        ctx: &StorageContext,
        key: &str,
        operator: &str,
        values: &[&str],
    ) -> Result<()> {
        let extra = ExtraParameters::new().at(
            "items.0.spec.template.spec",
            json!({"affinity": node_affinity(key, operator, values)}),
        );
        self.create_with_extra_parameters(ctx, &extra).await
    }

    /// Delete as the test user; errors propagate
    pub async fn delete(&self, ctx: &StorageContext) -> Result<()> {
        self.user_cli(ctx)
            .delete("deployment", &self.name, &[])
            .await
    }

    /// Scale and remember the new replica count
    pub async fn scale(&mut self, ctx: &StorageContext, replicas: u32) -> Result<()> {
        self.user_cli(ctx)
            .scale("deployment", &self.name, replicas)
            .await?;
        info!(deployment = %self.name, replicas, "Scaled deployment");
        self.replicas = replicas;
        Ok(())
    }

    pub async fn restart(&self, ctx: &StorageContext) -> Result<()> {
        self.user_cli(ctx)
            .rollout_restart("deployment", &self.name)
            .await
    }

    /// `status.readyReplicas`, zero when unset
    pub async fn ready_replicas(&self, ctx: &StorageContext) -> Result<String> {
        let ready = self
            .admin_cli(ctx)
            .get_jsonpath("deployment", &self.name, "{.status.readyReplicas}")
            .await?;
        Ok(if ready.is_empty() { "0".to_string() } else { ready })
    }

    /// Wait until every replica is ready
    pub async fn wait_ready(&self, ctx: &StorageContext) -> Result<()> {
        wait_for_state(
            &format!("{} ready replicas", self.resource(ctx)),
            &ExpectedState::value(self.replicas.to_string()),
            NotFoundPolicy::SatisfiesDeleted,
            PollConfig::RESOURCE.with_timeout(self.max_wait),
            || self.ready_replicas(ctx),
        )
        .await
    }

    /// Names of the running (not terminating) pods
    pub async fn pod_list(&self, ctx: &StorageContext) -> Result<Vec<String>> {
        let pods: Vec<PodObject> = self
            .admin_cli(ctx)
            .list_json("pod", Some(&self.selector()))
            .await?;
        Ok(pods
            .into_iter()
            .filter(|p| p.metadata.deletion_timestamp.is_none())
            .filter_map(|p| p.metadata.name)
            .collect())
    }

    async fn first_pod(&self, ctx: &StorageContext) -> Result<String> {
        self.pod_list(ctx)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("pods of {}", self.resource(ctx))))
    }

    /// Nodes the pods run on
    pub async fn pod_node_names(&self, ctx: &StorageContext) -> Result<Vec<String>> {
        let pods: Vec<PodObject> = self
            .admin_cli(ctx)
            .list_json("pod", Some(&self.selector()))
            .await?;
        Ok(pods
            .into_iter()
            .filter_map(|p| p.spec.and_then(|s| s.node_name))
            .collect())
    }

    pub async fn check_pods_mounted_volume_can_read_write(&self, ctx: &StorageContext) -> Result<()> {
        let cli = self.user_cli(ctx);
        for pod in self.pod_list(ctx).await? {
            check_read_write(&cli, &pod, &self.mount_path).await?;
        }
        Ok(())
    }

    pub async fn check_pods_mounted_volume_have_exec_right(&self, ctx: &StorageContext) -> Result<()> {
        let cli = self.user_cli(ctx);
        for pod in self.pod_list(ctx).await? {
            check_exec_right(&cli, &pod, &self.mount_path).await?;
        }
        Ok(())
    }

    pub async fn check_pods_mounted_volume_data_exist(
        &self,
        ctx: &StorageContext,
        expect_exist: bool,
    ) -> Result<()> {
        let cli = self.user_cli(ctx);
        for pod in self.pod_list(ctx).await? {
            check_data_exist(&cli, &pod, &self.mount_path, expect_exist).await?;
        }
        Ok(())
    }

    /// Write test data through the first pod's raw block device
    pub async fn write_data_block_type(&self, ctx: &StorageContext) -> Result<()> {
        let pod = self.first_pod(ctx).await?;
        write_raw_block(&self.user_cli(ctx), &pod, &self.mount_path).await
    }

    pub async fn check_data_block_type(&self, ctx: &StorageContext) -> Result<()> {
        let pod = self.first_pod(ctx).await?;
        check_raw_block(&self.user_cli(ctx), &pod, &self.mount_path).await
    }

    pub async fn describe(&self, ctx: &StorageContext) -> Result<String> {
        self.admin_cli(ctx).describe("deployment", &self.name).await
    }
}

#[async_trait]
impl Fixture for Deployment {
    fn kind(&self) -> &'static str {
        "deployment"
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn delete_as_admin(&self, ctx: &StorageContext) {
        delete_best_effort(&self.admin_cli(ctx), "deployment", &self.name, &[]).await;
    }
}
