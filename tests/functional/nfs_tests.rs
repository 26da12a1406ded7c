//! NFS server and Service fixtures against a scripted CLI.

use storage_e2e::cloud::CloudProvider;
use storage_e2e::resources::nfs::{NFS_EXPORT_PATH, NFS_PORT};
use storage_e2e::{Fixture, NfsServer, Service};

use crate::common::{ScriptedRunner, TEST_NAMESPACE, scripted_context};

#[tokio::test]
async fn test_service_ports_render_as_integers() {
    let runner = ScriptedRunner::new();
    runner.ok(&["apply"], "service/svc-a created");
    let ctx = scripted_context(runner.clone(), CloudProvider::Aws);

    let svc = Service::builder(&ctx)
        .name("svc-a")
        .port(8080)
        .target_port(80)
        .selector_label("web")
        .build();
    svc.create(&ctx).await.unwrap();

    let item = &runner.last_applied()["items"][0];
    assert_eq!(item["kind"], "Service");
    assert_eq!(item["metadata"]["namespace"], TEST_NAMESPACE);
    assert_eq!(item["spec"]["ports"][0]["port"], 8080);
    assert_eq!(item["spec"]["ports"][0]["targetPort"], 80);
    assert_eq!(item["spec"]["selector"]["app"], "web");
}

#[tokio::test]
async fn test_install_deploys_waits_and_resolves_ip() {
    let runner = ScriptedRunner::new();
    runner.ok(&["apply"], "created");
    runner.ok(&["~readyReplicas"], "1");
    runner.ok(&["~clusterIP"], "172.30.40.2");
    let ctx = scripted_context(runner.clone(), CloudProvider::Aws);

    let mut server = NfsServer::new(&ctx);
    server.install(&ctx).await.unwrap();
    assert_eq!(server.server_ip(), "172.30.40.2");

    let applies = runner.calls_with("apply");
    assert_eq!(applies.len(), 2);
    let deployment = &applies[0].stdin_json()["items"][0];
    assert_eq!(deployment["kind"], "Deployment");
    let container = &deployment["spec"]["template"]["spec"]["containers"][0];
    assert_eq!(container["securityContext"]["privileged"], true);
    assert_eq!(container["volumeMounts"][0]["mountPath"], NFS_EXPORT_PATH);

    let service = &applies[1].stdin_json()["items"][0];
    assert_eq!(service["kind"], "Service");
    assert_eq!(service["spec"]["ports"][0]["port"], i64::from(NFS_PORT));
}

#[tokio::test]
async fn test_install_without_cluster_ip_fails() {
    let runner = ScriptedRunner::new();
    runner.ok(&["apply"], "created");
    runner.ok(&["~readyReplicas"], "1");
    runner.ok(&["~clusterIP"], "");
    let ctx = scripted_context(runner, CloudProvider::Aws);

    let mut server = NfsServer::new(&ctx);
    let err = server.install(&ctx).await.unwrap_err();
    assert!(err.to_string().contains("no cluster IP"));
    assert!(server.server_ip().is_empty());
}

#[tokio::test]
async fn test_uninstall_deletes_service_then_deployment() {
    let runner = ScriptedRunner::new();
    runner.ok(&["delete"], "deleted");
    let ctx = scripted_context(runner.clone(), CloudProvider::Aws);

    let server = NfsServer::new(&ctx).in_namespace("nfs-ns");
    server.delete_as_admin(&ctx).await;

    let deletes = runner.calls_with("delete");
    assert_eq!(deletes.len(), 2);
    assert!(deletes[0].has("service"));
    assert!(deletes[0].has("--namespace=nfs-ns"));
    assert!(deletes[1].has("deployment"));
}
