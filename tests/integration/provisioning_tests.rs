//! Dynamic provisioning scenarios on a live cluster.

use serde_json::json;

use storage_e2e::assertions::{admission, assert_attributes_contain, expect_rejection};
use storage_e2e::resources::storage_class::storage_class_extra;
use storage_e2e::{CleanupStack, CloudProvider, Fixture, PersistentVolumeClaim, Pod, StorageClass};

use crate::cluster::{block_provisioner, shared_context};
use crate::namespace::TestNamespace;

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a cluster"]
async fn test_storage_class_round_trip() {
    let base = shared_context().await;
    let Some(provisioner) = block_provisioner(&base) else {
        return;
    };
    let mut cleanup = CleanupStack::new();

    let sc = StorageClass::builder(&base)
        .provisioner(provisioner)
        .volume_binding_mode("WaitForFirstConsumer")
        .build();
    sc.create(&base).await.unwrap();
    cleanup.defer_delete(&base, &sc);
    assert!(sc.exists(&base).await.unwrap());

    sc.delete(&base).await.unwrap();
    assert!(!sc.exists(&base).await.unwrap());
    cleanup.run().await;
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a cluster"]
async fn test_negative_storage_class_rejected() {
    let base = shared_context().await;
    let sc = StorageClass::builder(&base)
        .provisioner("kubernetes.io/no-provisioner")
        .reclaim_policy("Keep")
        .negative()
        .build();
    let message = expect_rejection(sc.create(&base).await, admission::UNSUPPORTED_VALUE).unwrap();
    assert!(message.contains("reclaimPolicy"), "{message}");
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a cluster"]
async fn test_dynamic_volume_read_write_exec() {
    let base = shared_context().await;
    let Some(provisioner) = block_provisioner(&base) else {
        return;
    };
    let ns = TestNamespace::create(&base, "storage-rw").await;
    let ctx = ns.ctx();
    let mut cleanup = CleanupStack::new();

    let sc = StorageClass::builder(ctx)
        .provisioner(provisioner)
        .volume_binding_mode("WaitForFirstConsumer")
        .build();
    sc.create(ctx).await.unwrap();
    cleanup.defer_delete(ctx, &sc);

    let pvc = PersistentVolumeClaim::builder(ctx)
        .storage_class(&sc.name)
        .capacity(ctx.default_capacity())
        .build();
    pvc.create(ctx).await.unwrap();
    cleanup.defer_delete(ctx, &pvc);

    let pod = Pod::builder(ctx).pvc_name(&pvc.name).build();
    pod.create(ctx).await.unwrap();
    cleanup.defer_delete(ctx, &pod);

    pod.wait_ready(ctx).await.unwrap();
    pvc.wait_bound(ctx).await.unwrap();
    pod.check_mounted_volume_can_read_write(ctx).await.unwrap();
    pod.check_mounted_volume_have_exec_right(ctx).await.unwrap();

    cleanup.run().await;
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a cluster"]
async fn test_alibaba_disk_tags_reach_volume_attributes() {
    let base = shared_context().await;
    if base.cloud_provider() != &CloudProvider::AlibabaCloud {
        return;
    }
    let ns = TestNamespace::create(&base, "storage-tags").await;
    let ctx = ns.ctx();
    let mut cleanup = CleanupStack::new();

    let sc = StorageClass::builder(ctx)
        .provisioner("diskplugin.csi.alibabacloud.com")
        .volume_binding_mode("WaitForFirstConsumer")
        .build();
    sc.create_with_extra_parameters(
        ctx,
        &storage_class_extra(json!({"diskTags": "team:storage,user:Alitest"}), None),
    )
    .await
    .unwrap();
    cleanup.defer_delete(ctx, &sc);

    let pvc = PersistentVolumeClaim::builder(ctx)
        .storage_class(&sc.name)
        .capacity(ctx.default_capacity())
        .build();
    pvc.create(ctx).await.unwrap();
    cleanup.defer_delete(ctx, &pvc);

    let pod = Pod::builder(ctx).pvc_name(&pvc.name).build();
    pod.create(ctx).await.unwrap();
    cleanup.defer_delete(ctx, &pod);
    pod.wait_ready(ctx).await.unwrap();

    let attributes = pvc.volume_attributes(ctx).await.unwrap();
    assert_attributes_contain(&attributes, "team:storage,user:Alitest").unwrap();
    pod.check_mounted_volume_can_read_write(ctx).await.unwrap();

    cleanup.run().await;
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a cluster"]
async fn test_online_expansion_to_15gi() {
    let base = shared_context().await;
    let Some(provisioner) = block_provisioner(&base) else {
        return;
    };
    let ns = TestNamespace::create(&base, "storage-expand").await;
    let ctx = ns.ctx();
    let mut cleanup = CleanupStack::new();

    let sc = StorageClass::builder(ctx)
        .provisioner(provisioner)
        .volume_binding_mode("WaitForFirstConsumer")
        .build();
    sc.create_with_extra_parameters(ctx, &storage_class_extra(json!({}), Some(true)))
        .await
        .unwrap();
    cleanup.defer_delete(ctx, &sc);

    let mut pvc = PersistentVolumeClaim::builder(ctx)
        .storage_class(&sc.name)
        .capacity(ctx.default_capacity())
        .build();
    pvc.create(ctx).await.unwrap();
    cleanup.defer_delete(ctx, &pvc);

    let pod = Pod::builder(ctx).pvc_name(&pvc.name).build();
    pod.create(ctx).await.unwrap();
    cleanup.defer_delete(ctx, &pod);
    pod.wait_ready(ctx).await.unwrap();
    pod.check_mounted_volume_can_read_write(ctx).await.unwrap();

    pvc.expand(ctx, "15Gi").await.unwrap();
    pvc.wait_resize_success(ctx, "15Gi").await.unwrap();
    pod.check_mounted_volume_data_exist(ctx, true).await.unwrap();

    cleanup.run().await;
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a cluster"]
async fn test_admin_delete_is_idempotent() {
    let base = shared_context().await;
    let ns = TestNamespace::create(&base, "storage-idem").await;
    let ctx = ns.ctx();

    let pvc = PersistentVolumeClaim::builder(ctx)
        .storage_class("does-not-exist")
        .build();
    pvc.create(ctx).await.unwrap();

    pvc.delete_as_admin(ctx).await;
    pvc.delete_as_admin(ctx).await;
    pvc.wait_deleted(ctx).await.unwrap();
}
