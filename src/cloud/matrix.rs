//! CSI support matrix.
//!
//! Static JSON describing, per platform, which provisioners the suite
//! exercises, which volume types they accept and which preset
//! StorageClass/VolumeSnapshotClass the platform installs.
//!
//! ```json
//! {"supportMatrix": {"platforms": [
//!   {"name": "aws", "provisioners": [
//!     {"name": "ebs.csi.aws.com", "volumeTypes": ["gp3", "io1"],
//!      "presetStorageClass": "gp3-csi", "presetSnapshotClass": "csi-aws-vsc"}
//!   ]}
//! ]}}
//! ```

use std::path::Path;

use serde::Deserialize;

use super::CloudProvider;
use crate::error::{Error, Result};
use crate::util::slices;

/// Root of the support matrix document
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportMatrix {
    pub support_matrix: MatrixBody,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatrixBody {
    #[serde(default)]
    pub platforms: Vec<PlatformSupport>,
}

/// Provisioners supported on one platform
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSupport {
    pub name: String,
    #[serde(default)]
    pub provisioners: Vec<ProvisionerSupport>,
}

/// One provisioner's capabilities on a platform
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionerSupport {
    pub name: String,
    #[serde(default)]
    pub volume_types: Vec<String>,
    #[serde(default)]
    pub preset_storage_class: Option<String>,
    #[serde(default)]
    pub preset_snapshot_class: Option<String>,
}

impl SupportMatrix {
    /// Load a matrix from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "failed to read support matrix {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Entry for a platform
    pub fn platform(&self, provider: &CloudProvider) -> Option<&PlatformSupport> {
        self.support_matrix
            .platforms
            .iter()
            .find(|p| p.name == provider.as_str())
    }

    /// Provisioner names supported on `provider`
    pub fn provisioners(&self, provider: &CloudProvider) -> Vec<String> {
        self.platform(provider)
            .map(|p| p.provisioners.iter().map(|s| s.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Supported provisioners restricted to the ones a scenario can test
    pub fn supported_among(&self, provider: &CloudProvider, scenario: &[&str]) -> Vec<String> {
        let scenario: Vec<String> = scenario.iter().map(|s| (*s).to_string()).collect();
        slices::intersect(&scenario, &self.provisioners(provider))
    }

    fn provisioner(&self, provider: &CloudProvider, provisioner: &str) -> Option<&ProvisionerSupport> {
        self.platform(provider)?
            .provisioners
            .iter()
            .find(|p| p.name == provisioner)
    }

    /// Volume types accepted by a provisioner on `provider`
    pub fn volume_types(&self, provider: &CloudProvider, provisioner: &str) -> Vec<String> {
        self.provisioner(provider, provisioner)
            .map(|p| p.volume_types.clone())
            .unwrap_or_default()
    }

    /// StorageClass the platform installs for a provisioner
    pub fn preset_storage_class(&self, provider: &CloudProvider, provisioner: &str) -> Option<&str> {
        self.provisioner(provider, provisioner)?
            .preset_storage_class
            .as_deref()
    }

    /// VolumeSnapshotClass the platform installs for a provisioner
    pub fn preset_snapshot_class(&self, provider: &CloudProvider, provisioner: &str) -> Option<&str> {
        self.provisioner(provider, provisioner)?
            .preset_snapshot_class
            .as_deref()
    }

    /// All preset StorageClass names for `provider`
    pub fn preset_storage_classes(&self, provider: &CloudProvider) -> Vec<String> {
        self.platform(provider)
            .map(|p| {
                p.provisioners
                    .iter()
                    .filter_map(|s| s.preset_storage_class.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}
