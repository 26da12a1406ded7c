//! Local Storage Operator custom resources.
//!
//! Only the fields the suite sets or reads are modelled; unknown fields in
//! cluster responses are ignored.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Namespace the Local Storage Operator is installed into
pub const LSO_NAMESPACE: &str = "openshift-local-storage";

/// Disks to format and expose as local PVs.
///
/// Example:
/// ```yaml
/// apiVersion: local.storage.openshift.io/v1
/// kind: LocalVolume
/// metadata:
///   name: lv-abc12345
///   namespace: openshift-local-storage
/// spec:
///   storageClassDevices:
///   - storageClassName: lv-sc-abc12345
///     volumeMode: Filesystem
///     fsType: ext4
///     devicePaths: ["/dev/disk/by-id/nvme-Amazon_EBS_vol0abc"]
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "local.storage.openshift.io",
    version = "v1",
    kind = "LocalVolume",
    root = "LocalVolumeResource",
    plural = "localvolumes",
    status = "LocalVolumeStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct LocalVolumeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<NodeSelector>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,

    pub storage_class_devices: Vec<StorageClassDevice>,
}

/// One StorageClass and the devices that back it
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StorageClassDevice {
    pub storage_class_name: String,

    /// `Filesystem` or `Block`
    pub volume_mode: String,

    /// Ignored for `Block` volumes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs_type: Option<String>,

    pub device_paths: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocalVolumeStatus {
    #[serde(default)]
    pub conditions: Vec<OperatorCondition>,
}

/// Devices matched by filter rather than by path.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "local.storage.openshift.io",
    version = "v1alpha1",
    kind = "LocalVolumeSet",
    root = "LocalVolumeSetResource",
    plural = "localvolumesets",
    status = "LocalVolumeSetStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct LocalVolumeSetSpec {
    pub storage_class_name: String,

    pub volume_mode: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs_type: Option<String>,

    /// Upper bound of devices provisioned per node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_device_count: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<NodeSelector>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_inclusion_spec: Option<DeviceInclusionSpec>,
}

/// Filters a device must pass to be provisioned
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInclusionSpec {
    /// `disk`, `part`, `mpath`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub device_types: Vec<String>,

    /// `Rotational`, `NonRotational`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub device_mechanical_properties: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocalVolumeSetStatus {
    #[serde(default)]
    pub conditions: Vec<OperatorCondition>,

    #[serde(default)]
    pub total_provisioned_device_count: Option<i32>,
}

/// Condition reported by the operator
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OperatorCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeSelector {
    pub node_selector_terms: Vec<NodeSelectorTerm>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeSelectorTerm {
    #[serde(default)]
    pub match_expressions: Vec<NodeSelectorRequirement>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeSelectorRequirement {
    pub key: String,
    pub operator: String,
    #[serde(default)]
    pub values: Vec<String>,
}

impl NodeSelector {
    /// Select nodes whose `key` label is one of `values`
    pub fn label_in(key: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            node_selector_terms: vec![NodeSelectorTerm {
                match_expressions: vec![NodeSelectorRequirement {
                    key: key.into(),
                    operator: "In".to_string(),
                    values,
                }],
            }],
        }
    }

    /// Select nodes by hostname
    pub fn hostnames(hosts: Vec<String>) -> Self {
        Self::label_in("kubernetes.io/hostname", hosts)
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Toleration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
}

/// Whether `conditions` holds `type_` with status `True`
pub fn condition_true(conditions: &[OperatorCondition], type_: &str) -> bool {
    conditions
        .iter()
        .any(|c| c.type_ == type_ && c.status == "True")
}
