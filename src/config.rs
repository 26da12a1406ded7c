//! Suite configuration from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::cli::DEFAULT_COMMAND_TIMEOUT;
use crate::cloud::CloudProvider;
use crate::error::{Error, Result};

pub const CLI_ENV: &str = "STORAGE_CLI";
pub const KUBECONFIG_ENV: &str = "KUBECONFIG";
pub const ADMIN_KUBECONFIG_ENV: &str = "STORAGE_ADMIN_KUBECONFIG";
pub const NAMESPACE_ENV: &str = "STORAGE_NAMESPACE";
pub const CLOUD_PROVIDER_ENV: &str = "STORAGE_CLOUD_PROVIDER";
pub const CLI_TIMEOUT_ENV: &str = "STORAGE_CLI_TIMEOUT_SECS";
pub const FIXTURES_DIR_ENV: &str = "STORAGE_FIXTURES_DIR";
pub const SUPPORT_MATRIX_ENV: &str = "STORAGE_SUPPORT_MATRIX";
pub const AWS_REGION_ENV: &str = "AWS_REGION";

/// File name of the CSI support matrix inside the fixtures directory
pub const SUPPORT_MATRIX_FILE: &str = "general-csi-support-provisioners.json";

/// Fixtures shipped with the crate
pub fn default_fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("testdata")
        .join("storage")
}

/// Settings shared by every scenario in a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteConfig {
    /// `oc` or `kubectl`
    pub cli_binary: String,
    pub kubeconfig: Option<PathBuf>,
    pub admin_kubeconfig: Option<PathBuf>,
    /// Namespace for namespaced fixtures; the kubeconfig context otherwise
    pub namespace: Option<String>,
    /// Skip detection and use this provider
    pub cloud_provider: Option<CloudProvider>,
    pub cli_timeout: Duration,
    pub fixtures_dir: PathBuf,
    pub support_matrix: PathBuf,
    pub aws_region: Option<String>,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        let fixtures_dir = default_fixtures_dir();
        Self {
            cli_binary: "oc".to_string(),
            kubeconfig: None,
            admin_kubeconfig: None,
            namespace: None,
            cloud_provider: None,
            cli_timeout: DEFAULT_COMMAND_TIMEOUT,
            support_matrix: fixtures_dir.join(SUPPORT_MATRIX_FILE),
            fixtures_dir,
            aws_region: None,
        }
    }
}

impl SuiteConfig {
    /// Read the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let cli_timeout = match get(CLI_TIMEOUT_ENV) {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| {
                    Error::Config(format!("{CLI_TIMEOUT_ENV} must be a number of seconds, got {raw:?}"))
                })?;
                if secs == 0 {
                    return Err(Error::Config(format!("{CLI_TIMEOUT_ENV} must be positive")));
                }
                Duration::from_secs(secs)
            }
            None => defaults.cli_timeout,
        };

        let fixtures_dir = get(FIXTURES_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or(defaults.fixtures_dir);
        let support_matrix = get(SUPPORT_MATRIX_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| fixtures_dir.join(SUPPORT_MATRIX_FILE));

        Ok(Self {
            cli_binary: get(CLI_ENV).unwrap_or(defaults.cli_binary),
            kubeconfig: get(KUBECONFIG_ENV).map(PathBuf::from),
            admin_kubeconfig: get(ADMIN_KUBECONFIG_ENV).map(PathBuf::from),
            namespace: get(NAMESPACE_ENV),
            cloud_provider: get(CLOUD_PROVIDER_ENV)
                .map(|p| CloudProvider::from_platform_type(&p)),
            cli_timeout,
            fixtures_dir,
            support_matrix,
            aws_region: get(AWS_REGION_ENV),
        })
    }
}
