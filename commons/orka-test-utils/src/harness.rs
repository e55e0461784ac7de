//! Orchestrator wired to the simulated cloud and scripted collaborators.

use crate::handoff::{ScriptedRerouter, ScriptedRunner};
use crate::reporter::RecordingReporter;
use crate::sim_cloud::{SIM_IMAGE, SIM_PROJECT, SIM_TOKEN, SimCloud};
use orka_cp_storage::memory::MemoryClusterStore;
use orka_models::{ClusterRequest, DiskTemplate, FlavorSpec};
use orka_orchestrator::config::{OrchestratorSettings, WaitPolicy};
use orka_orchestrator::ClusterOrchestrator;
use std::sync::Arc;
use std::time::Duration;

/// Settings with plain cluster names, no key material and a short wait.
pub fn test_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        wait: WaitPolicy {
            max_wait: Duration::from_secs(1),
        },
        timestamp_cluster_names: false,
        ..Default::default()
    }
}

/// Master 2 vCPU / 2048 MB / 10 GB, slaves 1 vCPU / 1024 MB / 10 GB.
pub fn cluster_request(name: &str, size: u32) -> ClusterRequest {
    ClusterRequest {
        name: name.to_string(),
        cluster_size: size,
        master: FlavorSpec {
            cpus: 2,
            ram_mb: 2048,
            disk_gb: 10,
        },
        slave: FlavorSpec {
            cpus: 1,
            ram_mb: 1024,
            disk_gb: 10,
        },
        disk_template: DiskTemplate::ExtVlmc,
        os_image: SIM_IMAGE.to_string(),
        project_name: SIM_PROJECT.to_string(),
        token: SIM_TOKEN.to_string(),
    }
}

pub struct TestHarness {
    pub cloud: SimCloud,
    pub store: Arc<MemoryClusterStore>,
    pub reporter: Arc<RecordingReporter>,
    pub runner: Arc<ScriptedRunner>,
    pub rerouter: Arc<ScriptedRerouter>,
    pub orchestrator: ClusterOrchestrator,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_cloud(SimCloud::new(), test_settings())
    }

    pub fn with_cloud(cloud: SimCloud, settings: OrchestratorSettings) -> Self {
        let store = Arc::new(MemoryClusterStore::new());
        let reporter = Arc::new(RecordingReporter::new());
        let runner = Arc::new(ScriptedRunner::new());
        let rerouter = Arc::new(ScriptedRerouter::new());
        let orchestrator = ClusterOrchestrator::new(
            Arc::new(cloud.clone()),
            store.clone(),
            reporter.clone(),
            runner.clone(),
            rerouter.clone(),
            settings,
        );
        Self {
            cloud,
            store,
            reporter,
            runner,
            rerouter,
            orchestrator,
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
