//! Pod fixture and in-pod volume checks.

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod as PodObject;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{
    DEFAULT_DEVICE_PATH, DEFAULT_MAX_WAIT, DEFAULT_MOUNT_PATH, DEFAULT_POD_IMAGE, Fixture,
    VolumeType, delete_best_effort, effective_namespace, node_affinity, submit_template,
};
use crate::cli::Cli;
use crate::context::StorageContext;
use crate::error::{Error, Result};
use crate::template::{ExtraParameters, TemplateParams};
use crate::util::random::unique_name;
use crate::wait::{ExpectedState, NotFoundPolicy, PollConfig, wait_for_state};

pub const TEMPLATE: &str = "pod-template.yaml";

/// Readiness as printed by `get pod -o jsonpath`
pub const READY_JSONPATH: &str = r#"{.status.conditions[?(@.type=="Ready")].status}"#;

/// Content written by the read/write checks
pub const TEST_CONTENT: &str = "storage test";
/// Output of the `hello` binary shipped in the default image
pub const HELLO_OUTPUT: &str = "Hello OpenShift Storage";
/// Content written by the raw block checks
pub const BLOCK_TEST_CONTENT: &str = "test data";

/// A pod consuming one PVC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pod {
    pub name: String,
    /// Empty means the context's current namespace
    pub namespace: String,
    pub pvc_name: String,
    pub template: String,
    pub image: String,
    pub volume_type: VolumeType,
    /// Mount path, or device path for raw block volumes
    pub mount_path: String,
    pub max_wait: Duration,
    /// Creation is expected to be rejected
    pub invalid: bool,
}

/// Builder for [`Pod`]
#[derive(Debug, Clone)]
pub struct PodBuilder {
    pod: Pod,
}

impl PodBuilder {
    pub fn new(_ctx: &StorageContext) -> Self {
        Self {
            pod: Pod {
                name: unique_name("mypod"),
                namespace: String::new(),
                pvc_name: String::new(),
                template: TEMPLATE.to_string(),
                image: DEFAULT_POD_IMAGE.to_string(),
                volume_type: VolumeType::Mount,
                mount_path: DEFAULT_MOUNT_PATH.to_string(),
                max_wait: DEFAULT_MAX_WAIT,
                invalid: false,
            },
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.pod.name = name.into();
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.pod.namespace = namespace.into();
        self
    }

    pub fn pvc_name(mut self, pvc_name: impl Into<String>) -> Self {
        self.pod.pvc_name = pvc_name.into();
        self
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.pod.template = template.into();
        self
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.pod.image = image.into();
        self
    }

    pub fn mount_path(mut self, path: impl Into<String>) -> Self {
        self.pod.mount_path = path.into();
        self
    }

    /// Consume the claim as a raw block device at the default device path
    pub fn raw_block(mut self) -> Self {
        self.pod.volume_type = VolumeType::RawDevice;
        self.pod.mount_path = DEFAULT_DEVICE_PATH.to_string();
        self
    }

    pub fn volume_type(mut self, volume_type: VolumeType) -> Self {
        self.pod.volume_type = volume_type;
        self
    }

    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.pod.max_wait = max_wait;
        self
    }

    /// Expect the API to reject the pod
    pub fn invalid(mut self) -> Self {
        self.pod.invalid = true;
        self
    }

    pub fn build(self) -> Pod {
        self.pod
    }
}

impl Pod {
    pub fn builder(ctx: &StorageContext) -> PodBuilder {
        PodBuilder::new(ctx)
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
            .param("PODNAME", &self.name)
            .param("PODNAMESPACE", self.namespace(ctx))
            .param("PVCNAME", &self.pvc_name)
            .param("PODIMAGE", &self.image)
            .param("PODMOUNTPATH", &self.mount_path)
            .param("VOLUMETYPE", self.volume_type.container_field())
            .param("PATHTYPE", self.volume_type.path_field())
    }

    fn resource(&self, ctx: &StorageContext) -> String {
        format!("Pod {}/{}", self.namespace(ctx), self.name)
    }

    pub async fn create(&self, ctx: &StorageContext) -> Result<()> {
        self.create_with_extra_parameters(ctx, &ExtraParameters::new())
            .await
    }

    pub async fn create_with_extra_parameters(
        &self,
        ctx: &StorageContext,
        extra: &ExtraParameters,
    ) -> Result<()> {
        submit_template(
            ctx,
            &self.user_cli(ctx),
            &self.template,
            &self.params(ctx),
            extra,
            self.resource(ctx),
            self.invalid,
        )
        .await
    }

    /// Schedule onto nodes labelled `key=value`
    pub async fn create_with_node_selector(
        &self,
        ctx: &StorageContext,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let extra = ExtraParameters::new().spec(json!({"nodeSelector": {key: value}}));
        self.create_with_extra_parameters(ctx, &extra).await
    }

    /// Require node affinity `key <operator> values`
    pub async fn create_with_node_affinity(
        &self,
        ctx: &StorageContext,
        key: &str,
        operator: &str,
        values: &[&str],
    ) -> Result<()> {
        let extra = ExtraParameters::new().spec(json!({"affinity": node_affinity(key, operator, values)}));
        self.create_with_extra_parameters(ctx, &extra).await
    }

    /// Mount the claim read-only
    pub async fn create_with_read_only_volume(&self, ctx: &StorageContext) -> Result<()> {
        let extra = ExtraParameters::new()
            .at("items.0.spec.volumes.0.persistentVolumeClaim", json!({"readOnly": true}));
        self.create_with_extra_parameters(ctx, &extra).await
    }

    /// Set the pod-level `securityContext`
    pub async fn create_with_security_context(
        &self,
        ctx: &StorageContext,
        security_context: Value,
    ) -> Result<()> {
        let extra = ExtraParameters::new().spec(json!({"securityContext": security_context}));
        self.create_with_extra_parameters(ctx, &extra).await
    }

    /// Delete as the test user; errors propagate
    pub async fn delete(&self, ctx: &StorageContext) -> Result<()> {
        self.user_cli(ctx).delete("pod", &self.name, &[]).await
    }

    /// Delete immediately without waiting for graceful termination
    pub async fn force_delete(&self, ctx: &StorageContext) {
        delete_best_effort(
            &self.admin_cli(ctx),
            "pod",
            &self.name,
            &["--grace-period=0", "--force"],
        )
        .await;
    }

    pub async fn get(&self, ctx: &StorageContext) -> Result<PodObject> {
        self.admin_cli(ctx).get_json("pod", &self.name).await
    }

    /// `status.phase`
    pub async fn status(&self, ctx: &StorageContext) -> Result<String> {
        self.admin_cli(ctx)
            .get_jsonpath("pod", &self.name, "{.status.phase}")
            .await
    }

    /// `Ready` condition status (`True`/`False`, empty before scheduling)
    pub async fn ready_status(&self, ctx: &StorageContext) -> Result<String> {
        self.admin_cli(ctx)
            .get_jsonpath("pod", &self.name, READY_JSONPATH)
            .await
    }

    pub async fn wait_ready(&self, ctx: &StorageContext) -> Result<()> {
        wait_for_state(
            &format!("{} ready", self.resource(ctx)),
            &ExpectedState::value("True"),
            NotFoundPolicy::SatisfiesDeleted,
            PollConfig::RESOURCE.with_timeout(self.max_wait),
            || self.ready_status(ctx),
        )
        .await
    }

    pub async fn wait_status(&self, ctx: &StorageContext, phase: &str) -> Result<()> {
        wait_for_state(
            &self.resource(ctx),
            &ExpectedState::value(phase),
            NotFoundPolicy::SatisfiesDeleted,
            PollConfig::RESOURCE.with_timeout(self.max_wait),
            || self.status(ctx),
        )
        .await
    }

    pub async fn wait_deleted(&self, ctx: &StorageContext) -> Result<()> {
        wait_for_state(
            &self.resource(ctx),
            &ExpectedState::Deleted,
            NotFoundPolicy::SatisfiesDeleted,
            PollConfig::RESOURCE.with_timeout(self.max_wait),
            || self.status(ctx),
        )
        .await
    }

    /// Node the pod was scheduled on
    pub async fn node_name(&self, ctx: &StorageContext) -> Result<String> {
        let node = self
            .admin_cli(ctx)
            .get_jsonpath("pod", &self.name, "{.spec.nodeName}")
            .await?;
        if node.is_empty() {
            return Err(Error::Validation(format!("{} is not scheduled", self.resource(ctx))));
        }
        Ok(node)
    }

    /// Run a shell command in the pod as the test user
    pub async fn exec(&self, ctx: &StorageContext, command: &str) -> Result<String> {
        debug!(pod = %self.name, command, "Exec in pod");
        self.user_cli(ctx).exec(&self.name, command).await
    }

    /// Write a file under the mount path and read it back
    pub async fn check_mounted_volume_can_read_write(&self, ctx: &StorageContext) -> Result<()> {
        check_read_write(&self.user_cli(ctx), &self.name, &self.mount_path).await
    }

    /// Copy the `hello` binary onto the volume and run it from there
    pub async fn check_mounted_volume_have_exec_right(&self, ctx: &StorageContext) -> Result<()> {
        check_exec_right(&self.user_cli(ctx), &self.name, &self.mount_path).await
    }

    /// Whether data written by an earlier read/write check is (still) there
    pub async fn check_mounted_volume_data_exist(&self, ctx: &StorageContext, expect_exist: bool) -> Result<()> {
        check_data_exist(&self.user_cli(ctx), &self.name, &self.mount_path, expect_exist).await
    }

    /// Writes to a read-only mount must fail
    pub async fn check_mounted_volume_read_only(&self, ctx: &StorageContext) -> Result<()> {
        let command = format!("touch {}/readonly-probe", self.mount_path);
        match self.exec(ctx, &command).await {
            Ok(_) => Err(Error::Validation(format!(
                "write to {} in pod {} succeeded on a read-only volume",
                self.mount_path, self.name
            ))),
            Err(Error::CommandFailed { stderr, .. }) if stderr.contains("Read-only file system") => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Filesystem type the volume is mounted with
    pub async fn mounted_fs_type(&self, ctx: &StorageContext) -> Result<String> {
        let output = self
            .exec(ctx, &format!("mount | grep ' {} '", self.mount_path))
            .await?;
        mount_fs_type(&output).ok_or_else(|| {
            Error::Validation(format!("no mount entry for {} in pod {}", self.mount_path, self.name))
        })
    }

    /// Write test data to the raw block device
    pub async fn write_data_into_raw_block_volume(&self, ctx: &StorageContext) -> Result<()> {
        write_raw_block(&self.user_cli(ctx), &self.name, &self.mount_path).await
    }

    /// Read the raw block device and expect the test data
    pub async fn check_data_in_raw_block_volume(&self, ctx: &StorageContext) -> Result<()> {
        check_raw_block(&self.user_cli(ctx), &self.name, &self.mount_path).await
    }

    pub async fn describe(&self, ctx: &StorageContext) -> Result<String> {
        self.admin_cli(ctx).describe("pod", &self.name).await
    }
}

#[async_trait]
impl Fixture for Pod {
    fn kind(&self) -> &'static str {
        "pod"
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn delete_as_admin(&self, ctx: &StorageContext) {
        delete_best_effort(&self.admin_cli(ctx), "pod", &self.name, &[]).await;
    }
}

/// Filesystem column of a `mount` output line (`/dev/x on /mnt type ext4 (rw)`)
pub fn mount_fs_type(mount_output: &str) -> Option<String> {
    let mut words = mount_output.split_whitespace();
    words.by_ref().find(|w| *w == "type")?;
    words.next().map(str::to_string)
}

pub(crate) async fn check_read_write(cli: &Cli, pod: &str, mount_path: &str) -> Result<()> {
    let command = format!("echo '{TEST_CONTENT}' > {mount_path}/testfile && cat {mount_path}/testfile");
    let output = cli.exec(pod, &command).await?;
    if !output.contains(TEST_CONTENT) {
        return Err(Error::Validation(format!(
            "pod {pod} read back {output:?} from {mount_path}/testfile"
        )));
    }
    info!(pod, mount_path, "Mounted volume can be read and written");
    Ok(())
}

pub(crate) async fn check_exec_right(cli: &Cli, pod: &str, mount_path: &str) -> Result<()> {
    let command = format!("cp /hello {mount_path} && {mount_path}/hello");
    let output = cli.exec(pod, &command).await?;
    if !output.contains(HELLO_OUTPUT) {
        return Err(Error::Validation(format!(
            "pod {pod} could not execute from {mount_path}: {output:?}"
        )));
    }
    Ok(())
}

pub(crate) async fn check_data_exist(
    cli: &Cli,
    pod: &str,
    mount_path: &str,
    expect_exist: bool,
) -> Result<()> {
    let result = cli.exec(pod, &format!("cat {mount_path}/testfile")).await;
    match (expect_exist, result) {
        (true, Ok(output)) if output.contains(TEST_CONTENT) => Ok(()),
        (true, Ok(output)) => Err(Error::Validation(format!(
            "pod {pod} read {output:?} instead of the test data"
        ))),
        (true, Err(e)) => Err(e),
        (false, Err(Error::CommandFailed { stderr, .. }))
            if stderr.contains("No such file or directory") =>
        {
            Ok(())
        }
        (false, Ok(output)) => Err(Error::Validation(format!(
            "pod {pod} still has test data in {mount_path}: {output:?}"
        ))),
        (false, Err(e)) => Err(e),
    }
}

pub(crate) async fn write_raw_block(cli: &Cli, pod: &str, device_path: &str) -> Result<()> {
    let command = format!(
        "/bin/dd if=/dev/null of={device_path} bs=512 count=1 && echo '{BLOCK_TEST_CONTENT}' > {device_path}"
    );
    cli.exec(pod, &command).await.map(|_| ())
}

pub(crate) async fn check_raw_block(cli: &Cli, pod: &str, device_path: &str) -> Result<()> {
    let command = format!("/bin/dd if={device_path} of=/tmp/testfile bs=512 count=1 && cat /tmp/testfile");
    let output = cli.exec(pod, &command).await?;
    if !output.contains(BLOCK_TEST_CONTENT) {
        return Err(Error::Validation(format!(
            "pod {pod} read {output:?} from raw block device {device_path}"
        )));
    }
    Ok(())
}
