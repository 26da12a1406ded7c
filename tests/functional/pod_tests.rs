//! Pod fixture against a scripted CLI.

use serde_json::json;

use storage_e2e::assertions::{admission, expect_rejection};
use storage_e2e::cli::CommandOutput;
use storage_e2e::cloud::CloudProvider;
use storage_e2e::resources::pod::{HELLO_OUTPUT, READY_JSONPATH, TEST_CONTENT};
use storage_e2e::{Error, Pod};

use crate::common::{ScriptedRunner, scripted_context};

#[tokio::test]
async fn test_create_mounts_claim() {
    let runner = ScriptedRunner::new();
    runner.ok(&["apply"], "pod/pod-a created");
    let ctx = scripted_context(runner.clone(), CloudProvider::Aws);

    let pod = Pod::builder(&ctx).name("pod-a").pvc_name("pvc-a").build();
    pod.create(&ctx).await.unwrap();

    let item = &runner.last_applied()["items"][0];
    let container = &item["spec"]["containers"][0];
    assert_eq!(container["image"], "quay.io/openshifttest/hello-openshift:1.2.0");
    assert_eq!(container["volumeMounts"][0]["mountPath"], "/mnt/storage");
    assert_eq!(
        item["spec"]["volumes"][0]["persistentVolumeClaim"]["claimName"],
        "pvc-a"
    );
}

#[tokio::test]
async fn test_raw_block_pod_uses_volume_devices() {
    let runner = ScriptedRunner::new();
    runner.ok(&["apply"], "created");
    let ctx = scripted_context(runner.clone(), CloudProvider::Aws);

    let pod = Pod::builder(&ctx).pvc_name("pvc-block").raw_block().build();
    pod.create(&ctx).await.unwrap();

    let container = &runner.last_applied()["items"][0]["spec"]["containers"][0];
    assert!(container.get("volumeMounts").is_none());
    assert_eq!(container["volumeDevices"][0]["devicePath"], "/dev/dblock");
}

#[tokio::test]
async fn test_structured_overrides() {
    let runner = ScriptedRunner::new();
    runner.ok(&["apply"], "created");
    let ctx = scripted_context(runner.clone(), CloudProvider::Aws);
    let pod = Pod::builder(&ctx).pvc_name("pvc-a").build();

    pod.create_with_read_only_volume(&ctx).await.unwrap();
    let spec = runner.last_applied()["items"][0]["spec"].clone();
    assert_eq!(spec["volumes"][0]["persistentVolumeClaim"]["readOnly"], true);
    assert_eq!(spec["volumes"][0]["persistentVolumeClaim"]["claimName"], "pvc-a");

    pod.create_with_node_affinity(&ctx, "topology.kubernetes.io/zone", "In", &["us-east-2a"])
        .await
        .unwrap();
    let terms = &runner.last_applied()["items"][0]["spec"]["affinity"]["nodeAffinity"]
        ["requiredDuringSchedulingIgnoredDuringExecution"]["nodeSelectorTerms"];
    assert_eq!(terms[0]["matchExpressions"][0]["values"], json!(["us-east-2a"]));

    pod.create_with_security_context(&ctx, json!({"fsGroup": 10000, "runAsUser": 1000}))
        .await
        .unwrap();
    assert_eq!(
        runner.last_applied()["items"][0]["spec"]["securityContext"]["fsGroup"],
        10000
    );

    pod.create_with_node_selector(&ctx, "kubernetes.io/hostname", "worker-0")
        .await
        .unwrap();
    assert_eq!(
        runner.last_applied()["items"][0]["spec"]["nodeSelector"]["kubernetes.io/hostname"],
        "worker-0"
    );
}

#[tokio::test]
async fn test_invalid_pod_is_rejected() {
    let runner = ScriptedRunner::new();
    runner.fail(
        &["apply"],
        r#"The Pod "pod-bad" is invalid: spec.containers[0].volumeDevices[0].devicePath: Invalid value: "dev/x""#,
    );
    let ctx = scripted_context(runner, CloudProvider::Aws);

    let pod = Pod::builder(&ctx)
        .name("pod-bad")
        .raw_block()
        .mount_path("dev/x")
        .invalid()
        .build();
    expect_rejection(pod.create(&ctx).await, admission::INVALID_VALUE).unwrap();
}

#[tokio::test]
async fn test_wait_ready_and_volume_checks() {
    let runner = ScriptedRunner::new();
    runner.ok(&["get", "pod", "pod-rw", &format!("jsonpath={READY_JSONPATH}")], "True");
    runner.ok(&["exec", "pod-rw", "~testfile"], TEST_CONTENT);
    runner.ok(&["exec", "pod-rw", "~/hello"], HELLO_OUTPUT);
    let ctx = scripted_context(runner.clone(), CloudProvider::Aws);

    let pod = Pod::builder(&ctx).name("pod-rw").build();
    pod.wait_ready(&ctx).await.unwrap();
    pod.check_mounted_volume_can_read_write(&ctx).await.unwrap();
    pod.check_mounted_volume_have_exec_right(&ctx).await.unwrap();
    pod.check_mounted_volume_data_exist(&ctx, true).await.unwrap();
}

#[tokio::test]
async fn test_data_absent_after_reprovisioning() {
    let runner = ScriptedRunner::new();
    runner.fail(
        &["exec", "pod-new"],
        "cat: can't open '/mnt/storage/testfile': No such file or directory",
    );
    let ctx = scripted_context(runner, CloudProvider::Aws);

    let pod = Pod::builder(&ctx).name("pod-new").build();
    pod.check_mounted_volume_data_exist(&ctx, false).await.unwrap();
    assert!(pod.check_mounted_volume_data_exist(&ctx, true).await.is_err());
}

#[tokio::test]
async fn test_read_write_mismatch_is_validation_error() {
    let runner = ScriptedRunner::new();
    runner.on(&["exec", "pod-ro"], vec![CommandOutput::success("")]);
    let ctx = scripted_context(runner, CloudProvider::Aws);

    let pod = Pod::builder(&ctx).name("pod-ro").build();
    assert!(matches!(
        pod.check_mounted_volume_can_read_write(&ctx).await,
        Err(Error::Validation(_))
    ));
}

#[tokio::test]
async fn test_force_delete_never_fails() {
    let runner = ScriptedRunner::new();
    runner.fail(&["delete", "pod"], "error: connection refused");
    let ctx = scripted_context(runner.clone(), CloudProvider::Aws);

    let pod = Pod::builder(&ctx).name("pod-x").build();
    pod.force_delete(&ctx).await;
    let call = runner.calls_with("delete").pop().unwrap();
    assert!(call.has("--force"));
    assert!(call.has("--grace-period=0"));
}
