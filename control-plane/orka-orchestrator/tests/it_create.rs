use orka_cp_storage::ClusterStore;
use orka_models::{
    ClusterFilter, ClusterStatus, Phase, ResourceKind, ServiceStatus, VmRole,
};
use orka_orchestrator::errors::{OrchestratorError, Stage};
use orka_orchestrator::handoff::RunnerAction;
use orka_test_utils::{SimCloud, SimOp, TestHarness, cluster_request, test_settings};
use tracing_test::traced_test;

#[tokio::test]
async fn create_provisions_every_resource_once() {
    let h = TestHarness::new();

    let outcome = h
        .orchestrator
        .create_cluster(cluster_request("hadoop", 3))
        .await
        .unwrap();

    assert_eq!(h.cloud.count(SimOp::CreateNetwork).await, 1);
    assert_eq!(h.cloud.count(SimOp::CreateFloatingIp).await, 1);
    assert_eq!(h.cloud.count(SimOp::CreateServer).await, 3);
    assert_eq!(h.cloud.count(SimOp::CreateSubnet).await, 1);
    assert_eq!(h.cloud.count(SimOp::CreatePort).await, 3);

    assert_eq!(outcome.cluster_name, "hadoop");
    assert_eq!(outcome.vms.len(), 3);
    assert_eq!(outcome.vms[0].role, VmRole::Master);
    assert_eq!(outcome.vms[0].name, "hadoop-1");
    assert_eq!(outcome.vms[2].name, "hadoop-3");
    assert!(outcome.master_password.is_some());
    let ips = h.cloud.floating_ips().await;
    assert_eq!(outcome.master_ip, ips[0].address);

    let record = h
        .store
        .get_cluster(outcome.cluster_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, ClusterStatus::Active);
    assert_eq!(record.service_status, ServiceStatus::Started);
    assert_eq!(record.master_ip.as_deref(), Some(outcome.master_ip.as_str()));
    assert!(record.error.is_none());

    assert_eq!(h.runner.actions().await, vec![RunnerAction::Install]);
    let targets = h.rerouter.targets().await;
    assert_eq!(targets.len(), 2);
    assert_eq!(targets[0].ssh_port, 10000);
    assert_eq!(targets[1].private_ip, "192.168.0.4");

    let last = h.reporter.last().await.unwrap();
    assert_eq!(last.phase, Phase::Completed);
    assert_eq!(last.status, Some(ClusterStatus::Active));
}

async fn tight_quota_cloud() -> SimCloud {
    let cloud = SimCloud::new();
    for (kind, limit) in [
        (ResourceKind::ClusterSize, 5),
        (ResourceKind::Network, 1),
        (ResourceKind::FloatingIp, 1),
        (ResourceKind::Cpu, 10),
        (ResourceKind::Ram, 8192),
        (ResourceKind::Disk, 60),
    ] {
        cloud.set_limit(kind, limit).await;
    }
    cloud
}

fn uniform_request() -> orka_models::ClusterRequest {
    let mut request = cluster_request("hadoop", 3);
    request.slave = request.master;
    request
}

#[tokio::test]
async fn uniform_cluster_fits_a_tight_quota() {
    let h = TestHarness::with_cloud(tight_quota_cloud().await, test_settings());

    let outcome = h.orchestrator.create_cluster(uniform_request()).await.unwrap();

    assert_eq!(h.cloud.count(SimOp::CreateServer).await, 3);
    assert_eq!(h.cloud.count(SimOp::CreatePort).await, 3);
    let record = h.store.get_cluster(outcome.cluster_id).await.unwrap().unwrap();
    assert_eq!(record.status, ClusterStatus::Active);
    let quota = h.cloud.quota().await;
    assert_eq!(quota.cpu.usage, 6);
    assert_eq!(quota.headroom(ResourceKind::Ram), 8192 - 3 * 2048);
}

#[tokio::test]
async fn uniform_cluster_denied_on_cpu() {
    let cloud = tight_quota_cloud().await;
    cloud.set_limit(ResourceKind::Cpu, 3).await;
    let h = TestHarness::with_cloud(cloud, test_settings());

    let err = h.orchestrator.create_cluster(uniform_request()).await.unwrap_err();

    assert_eq!(err.resource_kind(), Some(ResourceKind::Cpu));
    assert_eq!(h.cloud.mutation_count().await, 0);
}

#[tokio::test]
async fn quota_denial_happens_before_any_mutation() {
    let h = TestHarness::new();
    h.cloud.set_limit(ResourceKind::Cpu, 3).await;

    let err = h
        .orchestrator
        .create_cluster(cluster_request("hadoop", 3))
        .await
        .unwrap_err();

    match err {
        OrchestratorError::QuotaDenied {
            kind,
            requested,
            available,
        } => {
            assert_eq!(kind, ResourceKind::Cpu);
            assert_eq!(requested, 4);
            assert_eq!(available, 3);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.cloud.mutation_count().await, 0);
    let records = h.store.list_clusters(ClusterFilter::default()).await.unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn admission_reports_the_first_failing_kind() {
    let h = TestHarness::new();
    h.cloud.set_limit(ResourceKind::Network, 0).await;
    h.cloud.set_limit(ResourceKind::Cpu, 1).await;

    let err = h
        .orchestrator
        .create_cluster(cluster_request("hadoop", 3))
        .await
        .unwrap_err();

    assert_eq!(err.resource_kind(), Some(ResourceKind::Network));
}

#[tokio::test]
async fn invalid_request_is_rejected() {
    let h = TestHarness::new();
    let mut request = cluster_request("hadoop", 3);
    request.cluster_size = 1;

    let err = h.orchestrator.create_cluster(request).await.unwrap_err();

    assert!(matches!(err, OrchestratorError::InvalidRequest(_)));
    assert!(h.cloud.calls().await.is_empty());
}

#[tokio::test]
async fn unknown_image_fails_before_provisioning() {
    let h = TestHarness::new();
    let mut request = cluster_request("hadoop", 2);
    request.os_image = "Plan 9".to_string();

    let err = h.orchestrator.create_cluster(request).await.unwrap_err();

    assert!(err.is_admission_failure());
    assert_eq!(h.cloud.mutation_count().await, 0);
}

#[tokio::test]
async fn unknown_project_is_not_found() {
    let h = TestHarness::new();
    let mut request = cluster_request("hadoop", 2);
    request.project_name = "nowhere".to_string();

    let err = h.orchestrator.create_cluster(request).await.unwrap_err();

    assert!(matches!(
        err,
        OrchestratorError::ResourceNotFound {
            kind: orka_orchestrator::errors::MissingResource::Project,
            ..
        }
    ));
    assert_eq!(h.cloud.mutation_count().await, 0);
}

#[tokio::test]
async fn failed_slave_rolls_back_created_resources() {
    let h = TestHarness::new();
    h.cloud.fail_nth(SimOp::CreateServer, 3).await;

    let err = h
        .orchestrator
        .create_cluster(cluster_request("hadoop", 3))
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(Stage::ServerCreate));
    assert!(h.cloud.live_servers().await.is_empty());
    assert_eq!(h.cloud.network_count().await, 0);
    assert_eq!(h.cloud.count(SimOp::DeleteServer).await, 2);

    let records = h.store.list_clusters(ClusterFilter::default()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, ClusterStatus::Failed);
    assert!(records[0].error.is_some());

    // The released floating IP is picked up by the next create.
    let ips = h.cloud.floating_ips().await;
    assert_eq!(ips.len(), 1);
    assert!(ips[0].instance_id.is_none());
    let quota = h.cloud.quota().await;
    assert_eq!(quota.vm.usage, 0);
    assert_eq!(quota.cpu.usage, 0);
}

#[tokio::test]
async fn failed_create_releases_its_reservation() {
    let h = TestHarness::new();
    h.cloud.fail_nth(SimOp::CreateServer, 2).await;
    h.orchestrator
        .create_cluster(cluster_request("first", 3))
        .await
        .unwrap_err();

    h.orchestrator
        .create_cluster(cluster_request("second", 3))
        .await
        .unwrap();

    assert_eq!(h.cloud.count(SimOp::CreateFloatingIp).await, 1);
    assert_eq!(h.cloud.live_servers().await.len(), 3);
}

#[tokio::test]
#[traced_test]
async fn cleanup_failures_are_logged_and_original_error_kept() {
    let h = TestHarness::new();
    h.cloud.fail_nth(SimOp::CreateSubnet, 1).await;
    h.cloud.fail_always(SimOp::DeleteNetwork).await;

    let err = h
        .orchestrator
        .create_cluster(cluster_request("hadoop", 2))
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Subnet));
    assert!(logs_contain("cleanup could not delete network"));
    assert!(h.cloud.live_servers().await.is_empty());
    assert_eq!(h.cloud.network_count().await, 1);
}

#[tokio::test]
async fn handoff_failure_destroys_the_cluster() {
    let h = TestHarness::new();
    h.rerouter.fail_all().await;

    let err = h
        .orchestrator
        .create_cluster(cluster_request("hadoop", 3))
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::Handoff(_)));
    assert!(h.cloud.live_servers().await.is_empty());
    assert_eq!(h.cloud.network_count().await, 0);
    assert!(h.cloud.floating_ips().await.is_empty());
    let records = h.store.list_clusters(ClusterFilter::default()).await.unwrap();
    assert_eq!(records[0].status, ClusterStatus::Destroyed);
    assert!(records[0].error.is_some());
}

#[tokio::test]
async fn server_stuck_in_build_times_out() {
    let h = TestHarness::new();
    h.cloud
        .set_wait_outcome("hadoop-2", orka_models::ResourceStatus::Build)
        .await;

    let err = h
        .orchestrator
        .create_cluster(cluster_request("hadoop", 2))
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::TimeoutWaitingForStatus { .. }));
    assert!(h.cloud.live_servers().await.is_empty());
}

#[tokio::test]
async fn timestamped_names_keep_the_requested_prefix() {
    let mut settings = test_settings();
    settings.timestamp_cluster_names = true;
    let h = TestHarness::with_cloud(SimCloud::new(), settings);

    let outcome = h
        .orchestrator
        .create_cluster(cluster_request("hadoop", 2))
        .await
        .unwrap();

    assert!(outcome.cluster_name.ends_with("-hadoop"));
    assert_eq!(outcome.cluster_name.len(), "YYYY-MM-DD HH:MM:SS-hadoop".len());
}

#[tokio::test]
async fn revoked_token_is_unauthorized() {
    let h = TestHarness::new();
    h.cloud.revoke_token("token-1").await;

    let err = h
        .orchestrator
        .create_cluster(cluster_request("hadoop", 2))
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Authenticate));
}

#[tokio::test]
async fn catalogue_lists_creatable_sizes() {
    let h = TestHarness::new();

    let catalogue = h.orchestrator.available_flavors("token-1").await.unwrap();

    assert_eq!(catalogue.cpus, vec![1, 2, 4]);
    assert_eq!(catalogue.disk_templates, vec!["drbd", "ext_vlmc"]);
}
