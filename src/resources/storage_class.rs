//! StorageClass fixture.

use async_trait::async_trait;
use k8s_openapi::api::storage::v1::StorageClass as StorageClassObject;
use serde_json::Value;
use tracing::debug;

use super::{Fixture, delete_best_effort, submit_template};
use crate::context::StorageContext;
use crate::error::Result;
use crate::template::{ExtraParameters, TemplateParams};
use crate::util::random::unique_name;

pub const TEMPLATE: &str = "storageclass-template.yaml";
/// Where StorageClass `parameters` live in a rendered list
pub const PARAMETERS_PATH: &str = "items.0.parameters";
/// Annotation marking the cluster default StorageClass
pub const DEFAULT_CLASS_ANNOTATION: &str = "storageclass.kubernetes.io/is-default-class";

/// A StorageClass the scenario owns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageClass {
    pub name: String,
    pub template: String,
    pub provisioner: String,
    pub reclaim_policy: String,
    pub volume_binding_mode: String,
    /// Creation is expected to be rejected
    pub negative: bool,
}

/// Builder for [`StorageClass`]
#[derive(Debug, Clone)]
pub struct StorageClassBuilder {
    sc: StorageClass,
}

impl StorageClassBuilder {
    pub fn new(ctx: &StorageContext) -> Self {
        Self {
            sc: StorageClass {
                name: unique_name("mystorageclass"),
                template: TEMPLATE.to_string(),
                provisioner: ctx.default_provisioner(),
                reclaim_policy: "Delete".to_string(),
                volume_binding_mode: "WaitForFirstConsumer".to_string(),
                negative: false,
            },
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.sc.name = name.into();
        self
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.sc.template = template.into();
        self
    }

    pub fn provisioner(mut self, provisioner: impl Into<String>) -> Self {
        self.sc.provisioner = provisioner.into();
        self
    }

    pub fn reclaim_policy(mut self, policy: impl Into<String>) -> Self {
        self.sc.reclaim_policy = policy.into();
        self
    }

    pub fn volume_binding_mode(mut self, mode: impl Into<String>) -> Self {
        self.sc.volume_binding_mode = mode.into();
        self
    }

    /// Expect the API to reject the StorageClass
    pub fn negative(mut self) -> Self {
        self.sc.negative = true;
        self
    }

    pub fn build(self) -> StorageClass {
        self.sc
    }
}

/// Extra parameters setting StorageClass `parameters` and, optionally,
/// `allowVolumeExpansion`
pub fn storage_class_extra(parameters: Value, allow_volume_expansion: Option<bool>) -> ExtraParameters {
    let mut extra = ExtraParameters::new().at(PARAMETERS_PATH, parameters);
    if let Some(allow) = allow_volume_expansion {
        extra = extra.at("items.0.allowVolumeExpansion", Value::Bool(allow));
    }
    extra
}

impl StorageClass {
    pub fn builder(ctx: &StorageContext) -> StorageClassBuilder {
        StorageClassBuilder::new(ctx)
    }

    fn params(&self) -> TemplateParams {
        TemplateParams::new()
            .param("SCNAME", &self.name)
            .param("RECLAIMPOLICY", &self.reclaim_policy)
            .param("PROVISIONER", &self.provisioner)
            .param("VOLUMEBINDINGMODE", &self.volume_binding_mode)
    }

    fn resource(&self) -> String {
        format!("StorageClass {}", self.name)
    }

    pub async fn create(&self, ctx: &StorageContext) -> Result<()> {
        self.create_with_extra_parameters(ctx, &ExtraParameters::new())
            .await
    }

    /// Create with parameters merged into the rendered object.
    ///
    /// StorageClasses are cluster-scoped and always created as admin.
    pub async fn create_with_extra_parameters(
        &self,
        ctx: &StorageContext,
        extra: &ExtraParameters,
    ) -> Result<()> {
        let cli = ctx.admin().without_namespace();
        submit_template(
            ctx,
            &cli,
            &self.template,
            &self.params(),
            extra,
            self.resource(),
            self.negative,
        )
        .await
    }

    /// Delete as the test user; errors propagate
    pub async fn delete(&self, ctx: &StorageContext) -> Result<()> {
        ctx.cli()
            .without_namespace()
            .delete("storageclass", &self.name, &[])
            .await
    }

    pub async fn get(&self, ctx: &StorageContext) -> Result<StorageClassObject> {
        ctx.admin()
            .without_namespace()
            .get_json("storageclass", &self.name)
            .await
    }

    /// Read one field with a jsonpath expression
    pub async fn field(&self, ctx: &StorageContext, jsonpath: &str) -> Result<String> {
        ctx.admin()
            .without_namespace()
            .get_jsonpath("storageclass", &self.name, jsonpath)
            .await
    }

    pub async fn exists(&self, ctx: &StorageContext) -> Result<bool> {
        storage_class_exists(ctx, &self.name).await
    }
}

#[async_trait]
impl Fixture for StorageClass {
    fn kind(&self) -> &'static str {
        "storageclass"
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn delete_as_admin(&self, ctx: &StorageContext) {
        delete_best_effort(&ctx.admin().without_namespace(), "storageclass", &self.name, &[]).await;
    }
}

/// Whether a StorageClass with `name` exists
pub async fn storage_class_exists(ctx: &StorageContext, name: &str) -> Result<bool> {
    match ctx
        .admin()
        .without_namespace()
        .get_jsonpath("storageclass", name, "{.metadata.name}")
        .await
    {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Name of the cluster default StorageClass, if one is marked
pub async fn default_storage_class(ctx: &StorageContext) -> Result<Option<String>> {
    let classes: Vec<StorageClassObject> = ctx
        .admin()
        .without_namespace()
        .list_json("storageclass", None)
        .await?;
    let default = classes.into_iter().find_map(|sc| {
        let is_default = sc
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(DEFAULT_CLASS_ANNOTATION))
            .is_some_and(|v| v == "true");
        if is_default { sc.metadata.name } else { None }
    });
    debug!(default = ?default, "Resolved default StorageClass");
    Ok(default)
}
