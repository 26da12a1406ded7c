//! PersistentVolume fixture and free functions against a scripted CLI.

use storage_e2e::cli::CommandOutput;
use storage_e2e::cloud::CloudProvider;
use storage_e2e::resources::local_volume::wait_local_pv_recreated;
use storage_e2e::resources::pv::{expand_pv_capacity, pv_name_by_pvc, wait_pv_deleted};
use storage_e2e::wait::PollConfig;
use storage_e2e::{Error, PersistentVolume, PvKind};

use crate::common::{ScriptedRunner, scripted_context};

const PHASE: &str = "jsonpath={.status.phase}";

#[tokio::test]
async fn test_csi_pv_renders_driver_and_handle() {
    let runner = ScriptedRunner::new();
    runner.ok(&["apply"], "persistentvolume/pv-csi created");
    let ctx = scripted_context(runner.clone(), CloudProvider::Aws);

    let pv = PersistentVolume::builder(&ctx)
        .name("pv-csi")
        .volume_handle("vol-0abc")
        .reclaim_policy("Retain")
        .storage_class("manual-sc")
        .capacity("15Gi")
        .build();
    pv.create(&ctx).await.unwrap();

    let item = &runner.last_applied()["items"][0];
    assert_eq!(item["kind"], "PersistentVolume");
    assert_eq!(item["spec"]["csi"]["driver"], "ebs.csi.aws.com");
    assert_eq!(item["spec"]["csi"]["volumeHandle"], "vol-0abc");
    assert_eq!(item["spec"]["persistentVolumeReclaimPolicy"], "Retain");
    assert_eq!(item["spec"]["capacity"]["storage"], "15Gi");
}

#[tokio::test]
async fn test_nfs_pv_points_at_server() {
    let runner = ScriptedRunner::new();
    runner.ok(&["apply"], "created");
    let ctx = scripted_context(runner.clone(), CloudProvider::None);

    let pv = PersistentVolume::builder(&ctx)
        .kind(PvKind::Nfs)
        .nfs_server_ip("172.30.12.7")
        .build();
    pv.create(&ctx).await.unwrap();

    let spec = &runner.last_applied()["items"][0]["spec"];
    assert_eq!(spec["nfs"]["server"], "172.30.12.7");
    assert_eq!(spec["nfs"]["path"], "/");
    assert!(spec.get("csi").is_none());
}

#[tokio::test]
async fn test_csi_pv_without_handle_is_rejected_before_submission() {
    let runner = ScriptedRunner::new();
    let ctx = scripted_context(runner.clone(), CloudProvider::Aws);

    let pv = PersistentVolume::builder(&ctx).build();
    assert!(matches!(pv.create(&ctx).await, Err(Error::Validation(_))));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_pv_name_by_pvc_and_expand() {
    let runner = ScriptedRunner::new();
    runner.ok(&["get", "pvc", "pvc-a", "jsonpath={.spec.volumeName}"], "pvc-9f8e");
    runner.ok(&["patch", "pv", "pvc-9f8e"], "persistentvolume/pvc-9f8e patched");
    let ctx = scripted_context(runner.clone(), CloudProvider::Aws);

    let name = pv_name_by_pvc(&ctx, "e2e-storage", "pvc-a").await.unwrap();
    assert_eq!(name, "pvc-9f8e");
    expand_pv_capacity(&ctx, &name, "15Gi").await.unwrap();
    assert!(runner.calls_with("patch")[0].has("15Gi"));
}

#[tokio::test]
async fn test_wait_pv_deleted() {
    let runner = ScriptedRunner::new();
    runner.on(
        &["get", "pv", "pv-old", PHASE],
        vec![
            CommandOutput::success("Released"),
            CommandOutput::failure(1, r#"Error from server (NotFound): persistentvolumes "pv-old" not found"#),
        ],
    );
    let ctx = scripted_context(runner, CloudProvider::Aws);

    let config = PollConfig::new(std::time::Duration::from_millis(5), std::time::Duration::from_secs(5));
    wait_pv_deleted(&ctx, "pv-old", config).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_local_pv_recreation_survives_not_found_window() {
    let not_found = CommandOutput::failure(
        1,
        r#"Error from server (NotFound): persistentvolumes "local-pv-1a2b" not found"#,
    );
    let runner = ScriptedRunner::new();
    runner.on(
        &["get", "pv", "local-pv-1a2b", PHASE],
        vec![
            CommandOutput::success("Released"),
            not_found.clone(),
            not_found,
            CommandOutput::success("Available"),
        ],
    );
    let ctx = scripted_context(runner.clone(), CloudProvider::Aws);

    wait_local_pv_recreated(&ctx, "local-pv-1a2b", PollConfig::LONG)
        .await
        .unwrap();
    assert_eq!(runner.calls_with("local-pv-1a2b").len(), 4);
}
