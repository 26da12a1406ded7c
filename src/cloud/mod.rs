//! Cloud provider context.
//!
//! The provider is resolved once per run and drives provider-sensitive
//! defaults: capacity floors, the default block CSI driver and the IBM
//! profile shim.

pub mod matrix;
pub mod volume;

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use k8s_openapi::api::core::v1::Node;
use tracing::{debug, info};

use crate::cli::Cli;
use crate::error::{Error, Result};

pub use matrix::{PlatformSupport, ProvisionerSupport, SupportMatrix};
pub use volume::{AwsCliVolumes, BlockVolumeApi, CloudVolume, CloudVolumeBuilder, VolumeRequest};

/// IOPS tier injected into IBM VPC block StorageClasses that lack one
pub const IBM_DEFAULT_PROFILE: &str = "10iops-tier";

/// Platform the cluster runs on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CloudProvider {
    Aws,
    Azure,
    Gcp,
    AlibabaCloud,
    IbmCloud,
    Vsphere,
    OpenStack,
    BareMetal,
    /// Platform type `None` (user-provisioned infrastructure)
    None,
    Other(String),
}

impl CloudProvider {
    /// Parse an infrastructure platform type, case-insensitively
    pub fn from_platform_type(platform: &str) -> Self {
        match platform.trim().to_ascii_lowercase().as_str() {
            "aws" => Self::Aws,
            "azure" | "azurestackhub" => Self::Azure,
            "gcp" | "gce" => Self::Gcp,
            "alibabacloud" | "alicloud" => Self::AlibabaCloud,
            "ibmcloud" | "ibm" => Self::IbmCloud,
            "vsphere" => Self::Vsphere,
            "openstack" => Self::OpenStack,
            "baremetal" => Self::BareMetal,
            "none" | "" => Self::None,
            other => Self::Other(other.to_string()),
        }
    }

    /// Map a node `spec.providerID` scheme to a provider
    pub fn from_provider_id(provider_id: &str) -> Option<Self> {
        let (scheme, _) = provider_id.split_once("://")?;
        Some(Self::from_platform_type(scheme))
    }

    /// Lowercase name used in support matrices and logs
    pub fn as_str(&self) -> &str {
        match self {
            Self::Aws => "aws",
            Self::Azure => "azure",
            Self::Gcp => "gcp",
            Self::AlibabaCloud => "alibabacloud",
            Self::IbmCloud => "ibmcloud",
            Self::Vsphere => "vsphere",
            Self::OpenStack => "openstack",
            Self::BareMetal => "baremetal",
            Self::None => "none",
            Self::Other(name) => name,
        }
    }

    /// Valid default volume sizes in Gi.
    ///
    /// AlibabaCloud disks start at 20Gi and IBM VPC block at 10Gi; everything
    /// else accepts 1Gi.
    pub fn volume_size_range_gi(&self) -> RangeInclusive<u64> {
        match self {
            Self::AlibabaCloud => 20..=30,
            Self::IbmCloud => 10..=20,
            _ => 1..=10,
        }
    }

    /// Block CSI driver the platform ships with, if any
    pub fn default_block_provisioner(&self) -> Option<&'static str> {
        match self {
            Self::Aws => Some("ebs.csi.aws.com"),
            Self::Azure => Some("disk.csi.azure.com"),
            Self::Gcp => Some("pd.csi.storage.gke.io"),
            Self::AlibabaCloud => Some("diskplugin.csi.alibabacloud.com"),
            Self::IbmCloud => Some("vpc.block.csi.ibm.io"),
            Self::Vsphere => Some("csi.vsphere.vmware.com"),
            Self::OpenStack => Some("cinder.csi.openstack.org"),
            Self::BareMetal | Self::None | Self::Other(_) => None,
        }
    }

    /// Whether StorageClasses need an IOPS-tier `profile` parameter
    pub fn requires_iops_profile(&self) -> bool {
        matches!(self, Self::IbmCloud)
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CloudProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(Self::from_platform_type(s))
    }
}

/// Detect the platform the cluster runs on.
///
/// Reads `infrastructure/cluster` (OpenShift) and falls back to the first
/// node's `spec.providerID` scheme on clusters without that resource.
pub async fn detect_cloud_provider(cli: &Cli) -> Result<CloudProvider> {
    let admin = cli.as_admin().without_namespace();
    match admin
        .get_jsonpath("infrastructure", "cluster", "{.status.platformStatus.type}")
        .await
    {
        Ok(platform) => {
            let provider = CloudProvider::from_platform_type(&platform);
            info!(provider = %provider, "Detected cloud provider from infrastructure");
            return Ok(provider);
        }
        Err(e) if e.is_not_found() || e.is_missing_resource_type() => {
            debug!(error = %e, "No infrastructure resource, falling back to node providerID");
        }
        Err(e) => return Err(e),
    }

    let nodes: Vec<Node> = admin.list_json("node", None).await?;
    let provider = nodes
        .iter()
        .filter_map(|n| n.spec.as_ref()?.provider_id.as_deref())
        .find_map(CloudProvider::from_provider_id)
        .unwrap_or(CloudProvider::None);
    info!(provider = %provider, "Detected cloud provider from node providerID");
    Ok(provider)
}
