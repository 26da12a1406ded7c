//! Externally managed block volumes.
//!
//! Static-provisioning scenarios create a volume in the cloud, wrap it in a
//! PV, and later grow it underneath the cluster. The cloud API sits behind
//! [`BlockVolumeApi`]; [`AwsCliVolumes`] drives it through the `aws` CLI.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::cli::{CommandRunner, command_line};
use crate::error::{Error, Result};
use crate::util::random::unique_name;
use crate::wait::{PollConfig, poll_until};

/// EC2 volume state once a volume can be attached
pub const STATE_AVAILABLE: &str = "available";
/// EC2 volume state while attached to an instance
pub const STATE_IN_USE: &str = "in-use";

/// Parameters for a new block volume
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeRequest {
    pub availability_zone: String,
    pub size_gi: u64,
    pub volume_type: String,
    pub encrypted: bool,
    pub tags: Vec<(String, String)>,
}

/// Block-volume operations of a cloud provider
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlockVolumeApi: Send + Sync {
    /// Create a volume and return its id
    async fn create_volume(&self, request: &VolumeRequest) -> Result<String>;

    /// Provider state string (`creating`, `available`, `in-use`, ...)
    async fn volume_state(&self, volume_id: &str) -> Result<String>;

    /// Current size in Gi
    async fn volume_size_gi(&self, volume_id: &str) -> Result<u64>;

    async fn attach_volume(&self, volume_id: &str, instance_id: &str, device: &str) -> Result<()>;

    async fn detach_volume(&self, volume_id: &str) -> Result<()>;

    async fn resize_volume(&self, volume_id: &str, size_gi: u64) -> Result<()>;

    async fn delete_volume(&self, volume_id: &str) -> Result<()>;
}

/// [`BlockVolumeApi`] backed by `aws ec2` commands
#[derive(Clone)]
pub struct AwsCliVolumes {
    runner: Arc<dyn CommandRunner>,
    binary: String,
    region: Option<String>,
}

impl std::fmt::Debug for AwsCliVolumes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCliVolumes")
            .field("binary", &self.binary)
            .field("region", &self.region)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreatedVolume {
    volume_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribedVolumes {
    #[serde(default)]
    volumes: Vec<DescribedVolume>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribedVolume {
    state: String,
    size: u64,
}

impl AwsCliVolumes {
    pub fn new(runner: Arc<dyn CommandRunner>, region: Option<String>) -> Self {
        Self {
            runner,
            binary: "aws".to_string(),
            region,
        }
    }

    async fn ec2(&self, args: Vec<String>) -> Result<String> {
        let mut full = vec!["ec2".to_string()];
        full.extend(args);
        if let Some(region) = &self.region {
            full.push(format!("--region={region}"));
        }
        full.push("--output=json".to_string());

        let command = command_line(&self.binary, &full);
        debug!(command = %command, "Running cloud CLI command");
        let output = self.runner.run(&self.binary, &full, None).await?;
        if output.is_success() {
            Ok(output.stdout)
        } else {
            Err(Error::CommandFailed {
                command,
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    async fn describe(&self, volume_id: &str) -> Result<DescribedVolume> {
        let raw = self
            .ec2(vec![
                "describe-volumes".to_string(),
                format!("--volume-ids={volume_id}"),
            ])
            .await?;
        let described: DescribedVolumes = serde_json::from_str(&raw)?;
        described
            .volumes
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("volume {volume_id}")))
    }
}

fn tag_specification(tags: &[(String, String)]) -> String {
    let tags: Vec<String> = tags
        .iter()
        .map(|(k, v)| format!("{{Key={k},Value={v}}}"))
        .collect();
    format!("ResourceType=volume,Tags=[{}]", tags.join(","))
}

#[async_trait]
impl BlockVolumeApi for AwsCliVolumes {
    async fn create_volume(&self, request: &VolumeRequest) -> Result<String> {
        let mut args = vec![
            "create-volume".to_string(),
            format!("--availability-zone={}", request.availability_zone),
            format!("--size={}", request.size_gi),
            format!("--volume-type={}", request.volume_type),
        ];
        if request.encrypted {
            args.push("--encrypted".to_string());
        }
        if !request.tags.is_empty() {
            args.push("--tag-specifications".to_string());
            args.push(tag_specification(&request.tags));
        }
        let raw = self.ec2(args).await?;
        let created: CreatedVolume = serde_json::from_str(&raw)?;
        Ok(created.volume_id)
    }

    async fn volume_state(&self, volume_id: &str) -> Result<String> {
        Ok(self.describe(volume_id).await?.state)
    }

    async fn volume_size_gi(&self, volume_id: &str) -> Result<u64> {
        Ok(self.describe(volume_id).await?.size)
    }

    async fn attach_volume(&self, volume_id: &str, instance_id: &str, device: &str) -> Result<()> {
        self.ec2(vec![
            "attach-volume".to_string(),
            format!("--volume-id={volume_id}"),
            format!("--instance-id={instance_id}"),
            format!("--device={device}"),
        ])
        .await
        .map(|_| ())
    }

    async fn detach_volume(&self, volume_id: &str) -> Result<()> {
        self.ec2(vec![
            "detach-volume".to_string(),
            format!("--volume-id={volume_id}"),
        ])
        .await
        .map(|_| ())
    }

    async fn resize_volume(&self, volume_id: &str, size_gi: u64) -> Result<()> {
        self.ec2(vec![
            "modify-volume".to_string(),
            format!("--volume-id={volume_id}"),
            format!("--size={size_gi}"),
        ])
        .await
        .map(|_| ())
    }

    async fn delete_volume(&self, volume_id: &str) -> Result<()> {
        self.ec2(vec![
            "delete-volume".to_string(),
            format!("--volume-id={volume_id}"),
        ])
        .await
        .map(|_| ())
    }
}

/// An EBS-like volume created outside the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudVolume {
    pub name: String,
    pub availability_zone: String,
    pub size_gi: u64,
    pub volume_type: String,
    pub device_path: String,
    pub cluster_tag_key: Option<String>,
    pub encrypted: bool,
    pub volume_id: Option<String>,
    pub attached_instance: Option<String>,
}

/// Builder for [`CloudVolume`]
#[derive(Debug, Clone)]
pub struct CloudVolumeBuilder {
    volume: CloudVolume,
}

impl CloudVolumeBuilder {
    pub fn new(availability_zone: impl Into<String>) -> Self {
        Self {
            volume: CloudVolume {
                name: unique_name("storage-e2e-vol"),
                availability_zone: availability_zone.into(),
                size_gi: 1,
                volume_type: "gp3".to_string(),
                device_path: "/dev/sdf".to_string(),
                cluster_tag_key: None,
                encrypted: false,
                volume_id: None,
                attached_instance: None,
            },
        }
    }

    pub fn size_gi(mut self, size_gi: u64) -> Self {
        self.volume.size_gi = size_gi;
        self
    }

    pub fn volume_type(mut self, volume_type: impl Into<String>) -> Self {
        self.volume.volume_type = volume_type.into();
        self
    }

    pub fn device_path(mut self, device_path: impl Into<String>) -> Self {
        self.volume.device_path = device_path.into();
        self
    }

    /// Tag the volume as owned by a cluster (`kubernetes.io/cluster/<id>`)
    pub fn cluster_tag_key(mut self, key: impl Into<String>) -> Self {
        self.volume.cluster_tag_key = Some(key.into());
        self
    }

    pub fn encrypted(mut self, encrypted: bool) -> Self {
        self.volume.encrypted = encrypted;
        self
    }

    pub fn build(self) -> CloudVolume {
        self.volume
    }
}

impl CloudVolume {
    pub fn builder(availability_zone: impl Into<String>) -> CloudVolumeBuilder {
        CloudVolumeBuilder::new(availability_zone)
    }

    fn id(&self) -> Result<&str> {
        self.volume_id
            .as_deref()
            .ok_or_else(|| Error::Validation(format!("volume {} was never created", self.name)))
    }

    /// Request sent to the provider for this volume
    pub fn request(&self) -> VolumeRequest {
        let mut tags = vec![("Name".to_string(), self.name.clone())];
        if let Some(key) = &self.cluster_tag_key {
            tags.push((key.clone(), "owned".to_string()));
        }
        VolumeRequest {
            availability_zone: self.availability_zone.clone(),
            size_gi: self.size_gi,
            volume_type: self.volume_type.clone(),
            encrypted: self.encrypted,
            tags,
        }
    }

    pub async fn create(&mut self, api: &dyn BlockVolumeApi) -> Result<()> {
        let id = api.create_volume(&self.request()).await?;
        info!(volume = %self.name, volume_id = %id, size_gi = self.size_gi, "Created cloud volume");
        self.volume_id = Some(id);
        Ok(())
    }

    pub async fn create_and_wait_available(
        &mut self,
        api: &dyn BlockVolumeApi,
        config: PollConfig,
    ) -> Result<()> {
        self.create(api).await?;
        self.wait_state(api, STATE_AVAILABLE, config).await
    }

    pub async fn wait_state(
        &self,
        api: &dyn BlockVolumeApi,
        state: &str,
        config: PollConfig,
    ) -> Result<()> {
        let id = self.id()?;
        let description = format!("volume {id} to be {state}");
        poll_until(&description, config, || async move {
            Ok(api.volume_state(id).await? == state)
        })
        .await
    }

    pub async fn attach(
        &mut self,
        api: &dyn BlockVolumeApi,
        instance_id: &str,
        config: PollConfig,
    ) -> Result<()> {
        let id = self.id()?.to_string();
        api.attach_volume(&id, instance_id, &self.device_path).await?;
        self.attached_instance = Some(instance_id.to_string());
        self.wait_state(api, STATE_IN_USE, config).await
    }

    pub async fn detach(&mut self, api: &dyn BlockVolumeApi, config: PollConfig) -> Result<()> {
        let id = self.id()?.to_string();
        api.detach_volume(&id).await?;
        self.attached_instance = None;
        self.wait_state(api, STATE_AVAILABLE, config).await
    }

    /// Grow the backing volume and wait until the provider reports the size
    pub async fn expand(
        &mut self,
        api: &dyn BlockVolumeApi,
        size_gi: u64,
        config: PollConfig,
    ) -> Result<()> {
        let id = self.id()?.to_string();
        api.resize_volume(&id, size_gi).await?;
        self.size_gi = size_gi;
        self.wait_size(api, size_gi, config).await
    }

    pub async fn wait_size(
        &self,
        api: &dyn BlockVolumeApi,
        size_gi: u64,
        config: PollConfig,
    ) -> Result<()> {
        let id = self.id()?;
        let description = format!("volume {id} to reach {size_gi}Gi");
        poll_until(&description, config, || async move {
            Ok(api.volume_size_gi(id).await? >= size_gi)
        })
        .await
    }

    /// Detach if needed and delete; failures are logged and dropped
    pub async fn delete(&mut self, api: &dyn BlockVolumeApi) {
        let Some(id) = self.volume_id.clone() else {
            return;
        };
        if self.attached_instance.is_some()
            && let Err(e) = self.detach(api, PollConfig::DEFAULT).await
        {
            warn!(volume_id = %id, error = %e, "Failed to detach cloud volume before delete");
        }
        match api.delete_volume(&id).await {
            Ok(()) => {
                info!(volume_id = %id, "Deleted cloud volume");
                self.volume_id = None;
            }
            Err(e) if e.is_not_found() => {
                self.volume_id = None;
            }
            Err(e) => warn!(volume_id = %id, error = %e, "Failed to delete cloud volume"),
        }
    }
}
