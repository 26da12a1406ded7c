//! In-cluster NFS server.
//!
//! An NFS server is a privileged Deployment exporting an `emptyDir` plus a
//! Service in front of it. NFS PVs point at the Service's cluster IP.

use async_trait::async_trait;
use tracing::info;

use super::deployment::Deployment;
use super::{Fixture, delete_best_effort, effective_namespace, submit_template};
use crate::cli::Cli;
use crate::context::StorageContext;
use crate::error::{Error, Result};
use crate::template::{ExtraParameters, TemplateParams};
use crate::util::random::unique_name;

pub const SERVICE_TEMPLATE: &str = "service-template.yaml";
pub const NFS_SERVER_TEMPLATE: &str = "nfs-server-deploy-template.yaml";
pub const NFS_PORT: u16 = 2049;
pub const NFS_SERVER_LABEL: &str = "nfs-server";
pub const NFS_EXPORT_PATH: &str = "/mnt/data";

/// A Service selecting pods by `app` label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub name: String,
    /// Empty means the context's current namespace
    pub namespace: String,
    pub port: u16,
    pub protocol: String,
    pub target_port: u16,
    /// `0` lets the cluster assign one (ClusterIP services ignore it)
    pub node_port: u16,
    pub selector_label: String,
    pub template: String,
    /// Filled by [`Service::get_cluster_ip`]
    pub cluster_ip: String,
}

/// Builder for [`Service`]
#[derive(Debug, Clone)]
pub struct ServiceBuilder {
    svc: Service,
}

impl ServiceBuilder {
    pub fn new(_ctx: &StorageContext) -> Self {
        Self {
            svc: Service {
                name: unique_name("storage-svc"),
                namespace: String::new(),
                port: NFS_PORT,
                protocol: "TCP".to_string(),
                target_port: NFS_PORT,
                node_port: 0,
                selector_label: NFS_SERVER_LABEL.to_string(),
                template: SERVICE_TEMPLATE.to_string(),
                cluster_ip: String::new(),
            },
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.svc.name = name.into();
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.svc.namespace = namespace.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.svc.port = port;
        self
    }

    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.svc.protocol = protocol.into();
        self
    }

    pub fn target_port(mut self, port: u16) -> Self {
        self.svc.target_port = port;
        self
    }

    pub fn node_port(mut self, port: u16) -> Self {
        self.svc.node_port = port;
        self
    }

    pub fn selector_label(mut self, label: impl Into<String>) -> Self {
        self.svc.selector_label = label.into();
        self
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.svc.template = template.into();
        self
    }

    pub fn build(self) -> Service {
        self.svc
    }
}

impl Service {
    pub fn builder(ctx: &StorageContext) -> ServiceBuilder {
        ServiceBuilder::new(ctx)
    }

    pub fn namespace(&self, ctx: &StorageContext) -> String {
        effective_namespace(&self.namespace, ctx)
    }

    fn admin_cli(&self, ctx: &StorageContext) -> Cli {
        ctx.admin().with_namespace(self.namespace(ctx))
    }

    fn params(&self, ctx: &StorageContext) -> TemplateParams {
        TemplateParams::new()
            .param("SERVICENAME", &self.name)
            .param("SERVICENAMESPACE", self.namespace(ctx))
            .param("PORT", self.port.to_string())
            .param("PROTOCOL", &self.protocol)
            .param("TARGETPORT", self.target_port.to_string())
            .param("NODEPORT", self.node_port.to_string())
            .param("SELECTORLABEL", &self.selector_label)
    }

    fn resource(&self, ctx: &StorageContext) -> String {
        format!("Service {}/{}", self.namespace(ctx), self.name)
    }

    pub async fn create(&self, ctx: &StorageContext) -> Result<()> {
        submit_template(
            ctx,
            &ctx.cli().with_namespace(self.namespace(ctx)),
            &self.template,
            &self.params(ctx),
            &ExtraParameters::new(),
            self.resource(ctx),
            false,
        )
        .await
    }

    /// Delete as the test user; errors propagate
    pub async fn delete(&self, ctx: &StorageContext) -> Result<()> {
        ctx.cli()
            .with_namespace(self.namespace(ctx))
            .delete("service", &self.name, &[])
            .await
    }

    /// Read `spec.clusterIP` and remember it
    pub async fn get_cluster_ip(&mut self, ctx: &StorageContext) -> Result<String> {
        let ip = self
            .admin_cli(ctx)
            .get_jsonpath("service", &self.name, "{.spec.clusterIP}")
            .await?;
        if ip.is_empty() {
            return Err(Error::Validation(format!(
                "{} has no cluster IP",
                self.resource(ctx)
            )));
        }
        self.cluster_ip = ip.clone();
        Ok(ip)
    }
}

#[async_trait]
impl Fixture for Service {
    fn kind(&self) -> &'static str {
        "service"
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn delete_as_admin(&self, ctx: &StorageContext) {
        delete_best_effort(&self.admin_cli(ctx), "service", &self.name, &[]).await;
    }
}

/// NFS server Deployment and the Service exposing it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NfsServer {
    pub deployment: Deployment,
    pub service: Service,
}

impl NfsServer {
    /// Server named after a fresh Deployment, in the context's namespace
    pub fn new(ctx: &StorageContext) -> Self {
        let deployment = Deployment::builder(ctx)
            .name(unique_name("nfs-server"))
            .app_label(NFS_SERVER_LABEL)
            .mount_path(NFS_EXPORT_PATH)
            .template(NFS_SERVER_TEMPLATE)
            .build();
        let service = Service::builder(ctx)
            .name(unique_name("nfs-svc"))
            .selector_label(NFS_SERVER_LABEL)
            .build();
        Self {
            deployment,
            service,
        }
    }

    /// Place both objects in `namespace`
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        self.deployment.namespace = namespace.clone();
        self.service.namespace = namespace;
        self
    }

    /// Address NFS PVs mount from; empty before `install`
    pub fn server_ip(&self) -> &str {
        &self.service.cluster_ip
    }

    /// Deploy the server, wait for it and resolve the Service IP.
    ///
    /// The server pod runs privileged, so the Deployment is submitted with
    /// admin credentials.
    pub async fn install(&mut self, ctx: &StorageContext) -> Result<()> {
        let admin = ctx.admin().with_namespace(self.deployment.namespace(ctx));
        self.deployment
            .create_with_cli(ctx, &admin, &ExtraParameters::new())
            .await?;
        self.deployment.wait_ready(ctx).await?;
        self.service.create(ctx).await?;
        let ip = self.service.get_cluster_ip(ctx).await?;
        info!(server = %self.deployment.name, ip = %ip, "NFS server installed");
        Ok(())
    }

    /// Remove the Service and Deployment, ignoring failures
    pub async fn uninstall(&self, ctx: &StorageContext) {
        self.service.delete_as_admin(ctx).await;
        self.deployment.delete_as_admin(ctx).await;
    }
}

#[async_trait]
impl Fixture for NfsServer {
    fn kind(&self) -> &'static str {
        "deployment"
    }

    fn name(&self) -> &str {
        &self.deployment.name
    }

    async fn delete_as_admin(&self, ctx: &StorageContext) {
        self.uninstall(ctx).await;
    }
}
