use crate::admission::AdmissionController;
use crate::cloud::{CloudProvider, CloudSession};
use crate::config::OrchestratorSettings;
use crate::errors::{MissingResource, OrchestratorError, Stage};
use crate::handoff::{ConfigRunner, SshRerouter, cluster_key};
use crate::locks::ClusterLocks;
use crate::quota::{QuotaLedger, resolve_project};
use crate::reporter::{StateReporter, StatusTracker};
use crate::services::personality::build_personality;
use crate::services::provision::hand_off;
use crate::services::{
    ClusterDestroyer, ClusterProvisioner, ClusterScaler, CreateOutcome,
    DestroyOutcome, FlavorCatalogue, ProvisionPlan, ScaleOutcome,
    resolve_flavor, resolve_image,
};
use chrono::Utc;
use orka_cp_storage::ClusterStore;
use orka_models::{
    ClusterId, ClusterRecord, ClusterRequest, ClusterStatus, NewCluster,
    Phase, ServiceStatus, VmRole, validate_request,
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Entry point for cluster create, scale and destroy.
pub struct ClusterOrchestrator {
    cloud: Arc<dyn CloudProvider>,
    store: Arc<dyn ClusterStore>,
    runner: Arc<dyn ConfigRunner>,
    rerouter: Arc<dyn SshRerouter>,
    tracker: StatusTracker,
    ledger: QuotaLedger,
    admission: AdmissionController,
    locks: ClusterLocks,
    settings: OrchestratorSettings,
}

impl ClusterOrchestrator {
    pub fn new(
        cloud: Arc<dyn CloudProvider>,
        store: Arc<dyn ClusterStore>,
        reporter: Arc<dyn StateReporter>,
        runner: Arc<dyn ConfigRunner>,
        rerouter: Arc<dyn SshRerouter>,
        settings: OrchestratorSettings,
    ) -> Self {
        let tracker = StatusTracker::new(
            store.clone(),
            reporter,
            settings.state_truncate_limit,
        );
        Self {
            ledger: QuotaLedger::new(store.clone()),
            cloud,
            store,
            runner,
            rerouter,
            tracker,
            admission: AdmissionController::new(),
            locks: ClusterLocks::new(),
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn ClusterStore> {
        &self.store
    }

    pub fn locks(&self) -> &ClusterLocks {
        &self.locks
    }

    async fn session(
        &self,
        token: &str,
    ) -> Result<Arc<dyn CloudSession>, OrchestratorError> {
        Ok(self.cloud.authenticate(token).await?)
    }

    async fn load(
        &self,
        session: &dyn CloudSession,
        cluster_id: ClusterId,
    ) -> Result<ClusterRecord, OrchestratorError> {
        match self.store.get_cluster(cluster_id).await? {
            Some(record) if record.owner == session.user_id() => Ok(record),
            _ => Err(OrchestratorError::ClusterNotFound(cluster_id)),
        }
    }

    fn cluster_name(&self, prefix: &str) -> String {
        if self.settings.timestamp_cluster_names {
            format!("{}-{}", Utc::now().format("%Y-%m-%d %H:%M:%S"), prefix)
        } else {
            prefix.to_string()
        }
    }

    /// Admits, provisions and configures a new cluster.
    ///
    /// Nothing is created remotely unless every admission check passes and
    /// the flavors, image and key material resolve. The record is persisted
    /// as `Pending` before the first remote mutation, which reserves its
    /// quota for concurrent admissions.
    pub async fn create_cluster(
        &self,
        request: ClusterRequest,
    ) -> Result<CreateOutcome, OrchestratorError> {
        validate_request(&request)?;
        let session = self.session(&request.token).await?;
        let session = session.as_ref();
        let owner = session.user_id().to_string();
        let project = resolve_project(session, &request.project_name).await?;

        let gate = self
            .locks
            .admission_gate(&owner, &request.project_name)
            .await;
        let availability = self.ledger.availability(session, &project).await?;
        self.admission.check_all(&availability, &request.demand())?;
        info!(owner = %owner, project = %project.name, "cluster admitted");

        let flavors = session
            .list_flavors()
            .await
            .map_err(|e| OrchestratorError::remote(Stage::Lookup, e))?;
        let master_flavor_id =
            resolve_flavor(&flavors, &request.master, &request.disk_template)?;
        let slave_flavor_id =
            resolve_flavor(&flavors, &request.slave, &request.disk_template)?;
        let images = session
            .list_public_images()
            .await
            .map_err(|e| OrchestratorError::remote(Stage::Lookup, e))?;
        let image_id = resolve_image(&images, &request.os_image)?;
        let personality = build_personality(&self.settings.keys).await?;

        let name = self.cluster_name(&request.name);
        let mut record = self
            .store
            .create_cluster(&NewCluster::from_request(&request, name.clone(), &owner))
            .await?;
        drop(gate);
        let _guard = self.locks.try_lock(record.id)?;
        info!(cluster_id = record.id, name = %record.name, "cluster registered as pending");

        let plan = ProvisionPlan {
            cluster_name: name,
            size: request.cluster_size,
            project_id: project.id.clone(),
            master_flavor_id,
            slave_flavor_id,
            image_id,
            personality,
        };
        let provisioner =
            ClusterProvisioner::new(session, &self.tracker, &self.settings);
        let cluster = match provisioner.create(&mut record, &plan).await {
            Ok(cluster) => cluster,
            Err(e) => {
                return Err(self
                    .tracker
                    .fail(&mut record, Phase::Cleanup, ClusterStatus::Failed, e)
                    .await);
            }
        };

        record.master_ip = Some(cluster.master_ip.clone());
        self.tracker
            .progress(&mut record, Phase::Handoff, "Configuring cluster software")
            .await;
        let key = cluster_key(&record.name, record.id);
        if let Err(e) = hand_off(
            self.runner.as_ref(),
            self.rerouter.as_ref(),
            &self.settings.network,
            &key,
            &cluster,
        )
        .await
        {
            error!(cluster_id = record.id, error = %e, "hand-off failed, destroying cluster");
            let destroyer =
                ClusterDestroyer::new(session, &self.tracker, &self.settings);
            if let Err(teardown) =
                destroyer.teardown(&mut record, &cluster.master_ip).await
            {
                error!(
                    cluster_id = record.id,
                    error = %teardown,
                    "cleanup after hand-off failure was incomplete"
                );
            }
            return Err(self
                .tracker
                .fail(&mut record, Phase::Handoff, ClusterStatus::Destroyed, e)
                .await);
        }

        record.service_status = ServiceStatus::Started;
        let msg = format!("Cluster {} is active", record.name);
        self.tracker
            .finish(&mut record, Phase::Completed, ClusterStatus::Active, msg, None)
            .await?;
        let master_password = cluster
            .master()
            .filter(|vm| vm.role == VmRole::Master)
            .and_then(|vm| vm.admin_pass.clone());
        Ok(CreateOutcome {
            cluster_id: record.id,
            cluster_name: record.name.clone(),
            master_ip: cluster.master_ip.clone(),
            master_password,
            vms: cluster.vms,
        })
    }

    /// Grows (`delta > 0`) or shrinks (`delta < 0`) an active cluster.
    pub async fn scale_cluster(
        &self,
        token: &str,
        cluster_id: ClusterId,
        delta: i32,
    ) -> Result<ScaleOutcome, OrchestratorError> {
        if delta == 0 {
            return Err(OrchestratorError::InvalidScale(
                "delta must be non-zero".to_string(),
            ));
        }
        let session = self.session(token).await?;
        let session = session.as_ref();
        let mut record = self.load(session, cluster_id).await?;
        let _guard = self.locks.try_lock(cluster_id)?;
        // Reload under the lock; the first read may predate another call.
        record = self.load(session, record.id).await?;
        if record.status != ClusterStatus::Active {
            return Err(OrchestratorError::ClusterNotReady {
                id: cluster_id,
                status: record.status,
            });
        }

        let scaler = ClusterScaler {
            session,
            tracker: &self.tracker,
            settings: &self.settings,
            store: self.store.as_ref(),
            ledger: &self.ledger,
            admission: &self.admission,
            locks: &self.locks,
            runner: self.runner.as_ref(),
            rerouter: self.rerouter.as_ref(),
        };
        if delta < 0 {
            let count = delta.unsigned_abs();
            if (record.size as i64) - (count as i64) < 2 {
                return Err(OrchestratorError::InvalidScale(format!(
                    "cluster {} has {} nodes and cannot drop below 2",
                    record.name, record.size
                )));
            }
            info!(cluster_id, count, "scaling down");
            scaler.scale_down(&mut record, count).await
        } else {
            let project = resolve_project(session, &record.project_name).await?;
            info!(cluster_id, count = delta, "scaling up");
            scaler.scale_up(&mut record, &project, delta as u32).await
        }
    }

    /// Tears a cluster down, reclaiming as much as possible. A cluster that is
    /// already destroyed is reported as such without touching the cloud.
    pub async fn destroy_cluster(
        &self,
        token: &str,
        cluster_id: ClusterId,
        master_ip: Option<&str>,
    ) -> Result<DestroyOutcome, OrchestratorError> {
        let session = self.session(token).await?;
        let session = session.as_ref();
        let _guard = self.locks.try_lock(cluster_id)?;
        let mut record = self.load(session, cluster_id).await?;
        if record.is_destroyed() {
            info!(cluster_id, "cluster already destroyed");
            return Ok(DestroyOutcome::AlreadyDestroyed {
                cluster_name: record.name,
            });
        }
        let previous_status = record.status;
        let Some(ip) = master_ip
            .map(str::to_string)
            .or_else(|| record.master_ip.clone())
        else {
            let err =
                OrchestratorError::not_found(MissingResource::FloatingIp, &record.name);
            return Err(self
                .tracker
                .fail(&mut record, Phase::Teardown, previous_status, err)
                .await);
        };

        let destroyer = ClusterDestroyer::new(session, &self.tracker, &self.settings);
        match destroyer.teardown(&mut record, &ip).await {
            Ok(()) => {
                record.service_status = ServiceStatus::Stopped;
                let msg = format!("Cluster {} destroyed", record.name);
                self.tracker
                    .finish(
                        &mut record,
                        Phase::Completed,
                        ClusterStatus::Destroyed,
                        msg,
                        None,
                    )
                    .await?;
                Ok(DestroyOutcome::Destroyed {
                    cluster_name: record.name,
                })
            }
            Err(
                e @ (OrchestratorError::ClusterCorrupt(_)
                | OrchestratorError::TeardownIncomplete { .. }),
            ) => {
                warn!(cluster_id, error = %e, "cluster destroyed with errors");
                record.service_status = ServiceStatus::Stopped;
                Err(self
                    .tracker
                    .fail(&mut record, Phase::Teardown, ClusterStatus::Destroyed, e)
                    .await)
            }
            Err(e) => Err(self
                .tracker
                .fail(&mut record, Phase::Teardown, previous_status, e)
                .await),
        }
    }

    /// Sizing values the user can request.
    pub async fn available_flavors(
        &self,
        token: &str,
    ) -> Result<FlavorCatalogue, OrchestratorError> {
        let session = self.session(token).await?;
        let flavors = session
            .list_flavors()
            .await
            .map_err(|e| OrchestratorError::remote(Stage::Lookup, e))?;
        Ok(FlavorCatalogue::from_flavors(&flavors))
    }
}
