//! storage-e2e preflight.
//!
//! Checks that the cluster the suite is pointed at can run storage
//! scenarios:
//! - Initializes structured logging
//! - Loads suite configuration from the environment
//! - Detects the cloud provider and loads the CSI support matrix
//! - Reports supported provisioners and which preset StorageClasses exist
//!
//! Exits non-zero when nothing on this platform can be tested.

use std::process::ExitCode;

use tracing::{error, info, warn};

use storage_e2e::resources::storage_class::{default_storage_class, storage_class_exists};
use storage_e2e::telemetry::init_tracing;
use storage_e2e::{StorageContext, SuiteConfig};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = init_tracing(true) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    match preflight().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = %e, "Preflight failed");
            ExitCode::FAILURE
        }
    }
}

async fn preflight() -> storage_e2e::Result<bool> {
    let config = SuiteConfig::from_env()?;
    info!(
        cli = %config.cli_binary,
        fixtures = %config.fixtures_dir.display(),
        "Starting storage-e2e preflight"
    );

    let ctx = StorageContext::detect(&config).await?;
    let provider = ctx.cloud_provider();

    let provisioners = ctx.matrix().provisioners(provider);
    if provisioners.is_empty() {
        error!(provider = %provider, "No supported provisioner for this platform");
        return Ok(false);
    }
    info!(provider = %provider, provisioners = ?provisioners, "Supported provisioners");

    let mut present = 0usize;
    for name in ctx.matrix().preset_storage_classes(provider) {
        if storage_class_exists(&ctx, &name).await? {
            info!(storage_class = %name, "Preset StorageClass present");
            present += 1;
        } else {
            warn!(storage_class = %name, "Preset StorageClass missing");
        }
    }

    match default_storage_class(&ctx).await? {
        Some(name) => info!(storage_class = %name, "Default StorageClass"),
        None => warn!("No default StorageClass set"),
    }

    if present == 0 {
        error!(provider = %provider, "No preset StorageClass exists");
        return Ok(false);
    }
    Ok(true)
}
