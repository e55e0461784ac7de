use orka_cp_storage::ClusterStore;
use orka_models::{
    ClusterId, ClusterRecord, ClusterStatus, ResourceKind, ResourceStatus,
};
use orka_orchestrator::errors::{OrchestratorError, Stage};
use orka_orchestrator::handoff::{RunnerAction, cluster_key};
use orka_test_utils::{SimOp, TestHarness, cluster_request};

const TOKEN: &str = "token-1";

async fn active_cluster(h: &TestHarness, size: u32) -> ClusterId {
    let outcome = h
        .orchestrator
        .create_cluster(cluster_request("spark", size))
        .await
        .unwrap();
    h.cloud.reset_calls().await;
    outcome.cluster_id
}

async fn record(h: &TestHarness, id: ClusterId) -> ClusterRecord {
    h.store.get_cluster(id).await.unwrap().unwrap()
}

async fn live_names(h: &TestHarness) -> Vec<String> {
    let mut names: Vec<String> =
        h.cloud.live_servers().await.into_iter().map(|s| s.name).collect();
    names.sort();
    names
}

#[tokio::test]
async fn scale_up_adds_and_configures_a_node() {
    let h = TestHarness::new();
    let id = active_cluster(&h, 3).await;

    let outcome = h.orchestrator.scale_cluster(TOKEN, id, 1).await.unwrap();

    assert_eq!(outcome.previous_size, 3);
    assert_eq!(outcome.new_size, 4);
    assert_eq!(outcome.added, vec!["spark-4".to_string()]);
    assert!(outcome.admission_stopped.is_none());
    assert!(outcome.restart_error.is_none());
    assert_eq!(h.cloud.count(SimOp::CreateServer).await, 1);
    assert_eq!(live_names(&h).await.len(), 4);

    let stored = record(&h, id).await;
    assert_eq!(stored.size, 4);
    assert_eq!(stored.pending_slaves, 0);
    assert_eq!(stored.status, ClusterStatus::Active);
    assert_eq!(
        stored.state,
        format!("Scaled cluster {} and new cluster size is 4", stored.name)
    );

    assert_eq!(
        h.runner.actions().await,
        vec![
            RunnerAction::Install,
            RunnerAction::AddNodes { count: 1 },
            RunnerAction::Stop,
            RunnerAction::Start,
        ]
    );
    let inventory = h
        .runner
        .inventory(&cluster_key(&stored.name, id))
        .await
        .unwrap();
    assert_eq!(inventory.slaves().count(), 3);
    let newest = h.rerouter.targets().await.pop().unwrap();
    assert_eq!(newest.ssh_port, 10002);
    assert_eq!(newest.private_ip, "192.168.0.5");
}

#[tokio::test]
async fn scale_up_failure_removes_every_added_node() {
    let h = TestHarness::new();
    let id = active_cluster(&h, 3).await;
    h.cloud.fail_nth(SimOp::CreateServer, 2).await;

    let err = h.orchestrator.scale_cluster(TOKEN, id, 3).await.unwrap_err();

    assert_eq!(err.stage(), Some(Stage::ServerCreate));
    assert_eq!(
        live_names(&h).await,
        vec!["spark-1", "spark-2", "spark-3"]
    );
    let stored = record(&h, id).await;
    assert_eq!(stored.size, 3);
    assert_eq!(stored.pending_slaves, 0);
    assert_eq!(stored.status, ClusterStatus::Active);
    assert!(stored.error.unwrap().ends_with("Cluster rolled back"));
    assert_eq!(h.cloud.quota().await.vm.usage, 3);
}

#[tokio::test]
async fn node_stuck_in_build_is_removed_after_its_build_ends() {
    let h = TestHarness::new();
    let id = active_cluster(&h, 3).await;
    h.cloud.set_wait_outcome("spark-5", ResourceStatus::Build).await;

    let err = h.orchestrator.scale_cluster(TOKEN, id, 3).await.unwrap_err();

    assert!(matches!(err, OrchestratorError::TimeoutWaitingForStatus { .. }));
    assert_eq!(
        live_names(&h).await,
        vec!["spark-1", "spark-2", "spark-3"]
    );
    let ops: Vec<SimOp> = h
        .cloud
        .calls()
        .await
        .into_iter()
        .filter(|c| c.target == "spark-5")
        .map(|c| c.op)
        .collect();
    assert_eq!(
        ops,
        vec![
            SimOp::CreateServer,
            SimOp::WaitServer,
            SimOp::WaitServer,
            SimOp::DeleteServer,
            SimOp::WaitServer,
        ]
    );
    let stored = record(&h, id).await;
    assert_eq!(stored.size, 3);
    assert_eq!(stored.pending_slaves, 0);
    assert_eq!(stored.status, ClusterStatus::Active);
    assert_eq!(h.cloud.quota().await.vm.usage, 3);
}

#[tokio::test]
async fn node_ending_in_error_rolls_back_the_scale() {
    let h = TestHarness::new();
    let id = active_cluster(&h, 3).await;
    h.cloud.set_wait_outcome("spark-5", ResourceStatus::Error).await;

    let err = h.orchestrator.scale_cluster(TOKEN, id, 2).await.unwrap_err();

    assert_eq!(err.stage(), Some(Stage::ServerWait));
    assert_eq!(
        live_names(&h).await,
        vec!["spark-1", "spark-2", "spark-3"]
    );
    assert_eq!(h.cloud.count(SimOp::DeleteServer).await, 2);
    let stored = record(&h, id).await;
    assert_eq!(stored.size, 3);
    assert!(stored.error.unwrap().ends_with("Cluster rolled back"));
}

#[tokio::test]
async fn failed_configuration_reverts_the_inventory() {
    let h = TestHarness::new();
    let id = active_cluster(&h, 2).await;
    h.runner.fail_action("add_nodes").await;

    let err = h.orchestrator.scale_cluster(TOKEN, id, 2).await.unwrap_err();

    assert!(matches!(err, OrchestratorError::Handoff(_)));
    assert_eq!(live_names(&h).await, vec!["spark-1", "spark-2"]);
    assert!(h.runner.actions().await.contains(&RunnerAction::RollbackScale));
    let stored = record(&h, id).await;
    let inventory = h
        .runner
        .inventory(&cluster_key(&stored.name, id))
        .await
        .unwrap();
    assert_eq!(inventory.hosts.len(), 2);
    assert_eq!(stored.size, 2);
}

#[tokio::test]
async fn admission_denial_after_first_node_keeps_added_nodes() {
    let h = TestHarness::new();
    let id = active_cluster(&h, 3).await;
    h.cloud.set_limit(ResourceKind::ClusterSize, 4).await;

    let outcome = h.orchestrator.scale_cluster(TOKEN, id, 2).await.unwrap();

    assert_eq!(outcome.new_size, 4);
    assert_eq!(outcome.added.len(), 1);
    assert!(
        outcome
            .admission_stopped
            .unwrap()
            .starts_with("Quota exceeded for cluster_size")
    );
    assert_eq!(record(&h, id).await.size, 4);
    assert_eq!(live_names(&h).await.len(), 4);
}

#[tokio::test]
async fn admission_denial_on_first_node_changes_nothing() {
    let h = TestHarness::new();
    let id = active_cluster(&h, 3).await;
    // Master 2 + two slaves at 1 each.
    h.cloud.set_limit(ResourceKind::Cpu, 4).await;

    let err = h.orchestrator.scale_cluster(TOKEN, id, 1).await.unwrap_err();

    assert_eq!(err.resource_kind(), Some(ResourceKind::Cpu));
    assert_eq!(h.cloud.mutation_count().await, 0);
    let stored = record(&h, id).await;
    assert_eq!(stored.size, 3);
    assert_eq!(stored.status, ClusterStatus::Active);
}

#[tokio::test]
async fn scale_down_removes_the_highest_ordinal_slave() {
    let h = TestHarness::new();
    let id = active_cluster(&h, 3).await;

    let outcome = h.orchestrator.scale_cluster(TOKEN, id, -1).await.unwrap();

    assert_eq!(outcome.removed, vec!["spark-3".to_string()]);
    assert_eq!(outcome.new_size, 2);
    assert_eq!(live_names(&h).await, vec!["spark-1", "spark-2"]);
    let stored = record(&h, id).await;
    assert_eq!(stored.size, 2);
    assert_eq!(stored.status, ClusterStatus::Active);
    let actions = h.runner.actions().await;
    assert!(matches!(actions[1], RunnerAction::RemoveNode { .. }));
    let inventory = h
        .runner
        .inventory(&cluster_key(&stored.name, id))
        .await
        .unwrap();
    assert_eq!(inventory.hosts.len(), 2);
}

#[tokio::test]
async fn scale_down_failure_keeps_nodes_already_removed() {
    let h = TestHarness::new();
    let id = active_cluster(&h, 4).await;
    h.cloud.fail_nth(SimOp::DeleteServer, 2).await;

    let err = h.orchestrator.scale_cluster(TOKEN, id, -2).await.unwrap_err();

    assert_eq!(err.stage(), Some(Stage::ServerDelete));
    assert_eq!(
        live_names(&h).await,
        vec!["spark-1", "spark-2", "spark-3"]
    );
    let stored = record(&h, id).await;
    assert_eq!(stored.size, 3);
    assert_eq!(stored.status, ClusterStatus::Active);
    assert!(stored.error.is_some());
}

#[tokio::test]
async fn scale_down_below_two_nodes_is_rejected() {
    let h = TestHarness::new();
    let id = active_cluster(&h, 3).await;

    let err = h.orchestrator.scale_cluster(TOKEN, id, -2).await.unwrap_err();

    assert!(matches!(err, OrchestratorError::InvalidScale(_)));
    assert_eq!(h.cloud.mutation_count().await, 0);
}

#[tokio::test]
async fn zero_delta_is_rejected() {
    let h = TestHarness::new();
    let id = active_cluster(&h, 2).await;

    let err = h.orchestrator.scale_cluster(TOKEN, id, 0).await.unwrap_err();

    assert!(matches!(err, OrchestratorError::InvalidScale(_)));
}

#[tokio::test]
async fn restart_failure_keeps_the_new_size() {
    let h = TestHarness::new();
    let id = active_cluster(&h, 2).await;
    h.runner.fail_action("start").await;

    let outcome = h.orchestrator.scale_cluster(TOKEN, id, 1).await.unwrap();

    let restart_error = outcome.restart_error.unwrap();
    assert!(restart_error.ends_with("Try to restart it manually."));
    let stored = record(&h, id).await;
    assert_eq!(stored.size, 3);
    assert_eq!(stored.error.as_deref(), Some(restart_error.as_str()));
}

#[tokio::test]
async fn busy_cluster_is_refused() {
    let h = TestHarness::new();
    let id = active_cluster(&h, 2).await;
    let _guard = h.orchestrator.locks().try_lock(id).unwrap();

    let err = h.orchestrator.scale_cluster(TOKEN, id, 1).await.unwrap_err();

    assert!(matches!(err, OrchestratorError::ClusterBusy(busy) if busy == id));
    assert_eq!(h.cloud.mutation_count().await, 0);
}

#[tokio::test]
async fn only_active_clusters_scale() {
    let h = TestHarness::new();
    let id = active_cluster(&h, 2).await;
    let mut stored = record(&h, id).await;
    stored.status = ClusterStatus::Failed;
    h.store.update_cluster(&stored).await.unwrap();

    let err = h.orchestrator.scale_cluster(TOKEN, id, 1).await.unwrap_err();

    assert!(matches!(err, OrchestratorError::ClusterNotReady { .. }));
}
