//! Per-run context threaded into every fixture.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::cli::{Cli, ProcessRunner};
use crate::cloud::{AwsCliVolumes, CloudProvider, SupportMatrix, detect_cloud_provider};
use crate::config::SuiteConfig;
use crate::error::Result;
use crate::template::TemplateRenderer;
use crate::util::capacity::valid_volume_size;
use crate::wait::PollConfig;

/// Immutable run context: CLI handle, cloud provider and fixture location.
///
/// Cheap to clone; the provider is resolved once and never changes.
#[derive(Debug, Clone)]
pub struct StorageContext {
    cli: Cli,
    cloud_provider: CloudProvider,
    fixtures_dir: PathBuf,
    matrix: SupportMatrix,
    renderer: TemplateRenderer,
    aws_region: Option<String>,
}

impl StorageContext {
    pub fn new(cli: Cli, cloud_provider: CloudProvider, fixtures_dir: impl Into<PathBuf>) -> Self {
        Self {
            cli,
            renderer: TemplateRenderer::new(cloud_provider.clone()),
            cloud_provider,
            fixtures_dir: fixtures_dir.into(),
            matrix: SupportMatrix::default(),
            aws_region: None,
        }
    }

    pub fn with_matrix(mut self, matrix: SupportMatrix) -> Self {
        self.matrix = matrix;
        self
    }

    /// Override the template rendering retry window
    pub fn with_render_retry(mut self, retry: PollConfig) -> Self {
        self.renderer = self.renderer.with_retry(retry);
        self
    }

    pub fn with_aws_region(mut self, region: Option<String>) -> Self {
        self.aws_region = region;
        self
    }

    /// Copy whose namespaced fixtures default to `namespace`
    pub fn for_namespace(&self, namespace: impl Into<String>) -> Self {
        let mut ctx = self.clone();
        ctx.cli = self.cli.with_namespace(namespace);
        ctx
    }

    /// Build the context for a run: CLI from config, provider from config
    /// or detected from the cluster, support matrix if present.
    pub async fn detect(config: &SuiteConfig) -> Result<Self> {
        let runner = Arc::new(ProcessRunner::new(config.cli_timeout));
        let mut cli = Cli::new(runner, config.cli_binary.clone())
            .with_kubeconfig(config.kubeconfig.clone())
            .with_admin_kubeconfig(config.admin_kubeconfig.clone());
        if let Some(ns) = &config.namespace {
            cli = cli.with_namespace(ns.clone());
        }

        let provider = match &config.cloud_provider {
            Some(p) => {
                info!(provider = %p, "Using configured cloud provider");
                p.clone()
            }
            None => detect_cloud_provider(&cli).await?,
        };

        let matrix = match SupportMatrix::load(&config.support_matrix) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "No support matrix loaded; provisioner queries will be empty");
                SupportMatrix::default()
            }
        };

        Ok(Self::new(cli, provider, config.fixtures_dir.clone())
            .with_matrix(matrix)
            .with_aws_region(config.aws_region.clone()))
    }

    pub fn cli(&self) -> &Cli {
        &self.cli
    }

    /// Cluster-admin CLI
    pub fn admin(&self) -> Cli {
        self.cli.as_admin()
    }

    pub fn cloud_provider(&self) -> &CloudProvider {
        &self.cloud_provider
    }

    pub fn fixtures_dir(&self) -> &Path {
        &self.fixtures_dir
    }

    pub fn matrix(&self) -> &SupportMatrix {
        &self.matrix
    }

    pub fn renderer(&self) -> &TemplateRenderer {
        &self.renderer
    }

    /// `<fixtures_dir>/<file>`
    pub fn template(&self, file: &str) -> PathBuf {
        self.fixtures_dir.join(file)
    }

    /// Namespace namespaced fixtures land in when none is set
    pub fn namespace(&self) -> String {
        self.cli.current_namespace()
    }

    /// Random provider-valid capacity such as `7Gi`
    pub fn default_capacity(&self) -> String {
        valid_volume_size(&self.cloud_provider)
    }

    /// Block CSI driver of the provider; empty when it has none
    pub fn default_provisioner(&self) -> String {
        self.cloud_provider
            .default_block_provisioner()
            .unwrap_or_default()
            .to_string()
    }

    /// Provisioners a scenario can test on this cluster
    pub fn supported_provisioners(&self, scenario: &[&str]) -> Vec<String> {
        self.matrix.supported_among(&self.cloud_provider, scenario)
    }

    /// `aws ec2` volume API sharing the CLI's runner
    pub fn aws_volumes(&self) -> AwsCliVolumes {
        AwsCliVolumes::new(self.cli.runner(), self.aws_region.clone())
    }
}
