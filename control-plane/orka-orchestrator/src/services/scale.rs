use super::personality::build_personality;
use super::{
    ScaleOutcome, delete_server_and_wait, locate_master, resolve_flavor,
    resolve_image, vm_name,
};
use crate::admission::AdmissionController;
use crate::cloud::{CloudSession, await_server};
use crate::config::OrchestratorSettings;
use crate::errors::{MissingResource, OrchestratorError, Stage};
use crate::handoff::{
    ConfigRunner, InventoryChange, InventoryHost, RerouteTarget, RunnerAction,
    SshRerouter, cluster_key,
};
use crate::locks::ClusterLocks;
use crate::quota::QuotaLedger;
use crate::reporter::StatusTracker;
use orka_cp_storage::ClusterStore;
use orka_models::{
    ClusterRecord, ClusterStatus, NetworkSelection, PersonalityFile, Phase,
    Project, ResourceDemand, ResourceStatus, ServerDetails, ServerSpec,
    ServiceStatus, VmRole, name_ordinal,
};
use tracing::{error, info, warn};

/// How far a failed scale-up got into the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum InventoryRollback {
    None,
    Entries,
    Joined,
}

/// Read-only lookups shared by every node added in one call.
struct NodeTemplate {
    flavor_id: String,
    image_id: String,
    project_id: String,
    network_id: String,
    master_ip: String,
    personality: Vec<PersonalityFile>,
}

/// Cluster state captured before a scale-up, restored on rollback.
struct ScaleStart {
    key: String,
    size: u32,
    status: ClusterStatus,
}

#[derive(Debug, Clone)]
struct AddedNode {
    remote_id: String,
    name: String,
    hostname: String,
    private_ip: String,
    ssh_port: u32,
    admin_pass: Option<String>,
}

pub struct ClusterScaler<'a> {
    pub(crate) session: &'a dyn CloudSession,
    pub(crate) tracker: &'a StatusTracker,
    pub(crate) settings: &'a OrchestratorSettings,
    pub(crate) store: &'a dyn ClusterStore,
    pub(crate) ledger: &'a QuotaLedger,
    pub(crate) admission: &'a AdmissionController,
    pub(crate) locks: &'a ClusterLocks,
    pub(crate) runner: &'a dyn ConfigRunner,
    pub(crate) rerouter: &'a dyn SshRerouter,
}

impl<'a> ClusterScaler<'a> {
    /// Removes the `count` highest-ordinal slaves one by one. Nodes already
    /// removed stay removed when a later one fails.
    pub async fn scale_down(
        &self,
        record: &mut ClusterRecord,
        count: u32,
    ) -> Result<ScaleOutcome, OrchestratorError> {
        let previous_status = record.status;
        let previous_size = record.size;
        let key = cluster_key(&record.name, record.id);
        let mut removed = Vec::new();

        for _ in 0..count {
            self.tracker
                .progress(
                    record,
                    Phase::ScaleDown,
                    format!("Starting node decommission for {}", record.name),
                )
                .await;
            match self.remove_one(record, &key).await {
                Ok(name) => removed.push(name),
                Err(e) => {
                    return Err(self
                        .tracker
                        .fail(record, Phase::ScaleDown, previous_status, e)
                        .await);
                }
            }
        }

        let restart_error = self.restart_if_started(record, &key).await;
        self.complete(record, previous_status, &restart_error).await?;
        Ok(ScaleOutcome {
            cluster_id: record.id,
            cluster_name: record.name.clone(),
            previous_size,
            new_size: record.size,
            removed,
            restart_error,
            ..Default::default()
        })
    }

    async fn remove_one(
        &self,
        record: &mut ClusterRecord,
        key: &str,
    ) -> Result<String, OrchestratorError> {
        let target = self.find_node_to_remove(record).await?;
        let hostname = target.fqdn.clone().unwrap_or_else(|| target.name.clone());
        self.tracker
            .progress(
                record,
                Phase::ScaleDown,
                format!("Decommissioning node {hostname} from {}", record.name),
            )
            .await;
        let inventory = self
            .runner
            .modify_inventory(
                key,
                InventoryChange::RemoveSlave {
                    hostname: hostname.clone(),
                },
            )
            .await
            .map_err(|e| OrchestratorError::remote(Stage::Decommission, e))?;
        let short = hostname.split('.').next().unwrap_or(&hostname).to_string();
        self.runner
            .run(&inventory, RunnerAction::RemoveNode { hostname: short })
            .await
            .map_err(|e| OrchestratorError::remote(Stage::Decommission, e))?;

        self.tracker
            .progress(
                record,
                Phase::ScaleDown,
                format!("Deleting node {hostname} from cluster {}", record.name),
            )
            .await;
        delete_server_and_wait(
            self.session,
            &target.id,
            &target.name,
            self.settings.wait.max_wait,
        )
        .await?;
        record.size -= 1;
        self.store.update_cluster(record).await?;
        self.tracker
            .progress(
                record,
                Phase::ScaleDown,
                format!("Deleted node {hostname} from cluster {}", record.name),
            )
            .await;
        info!(cluster_id = record.id, node = %target.name, size = record.size, "node removed");
        Ok(target.name)
    }

    /// The slave with the highest name ordinal on the master's network.
    async fn find_node_to_remove(
        &self,
        record: &ClusterRecord,
    ) -> Result<ServerDetails, OrchestratorError> {
        let (master, network_id) = self.master_network(record).await?;
        let servers = self
            .session
            .list_servers()
            .await
            .map_err(|e| OrchestratorError::remote(Stage::Lookup, e))?;
        servers
            .into_iter()
            .filter(|s| s.id != master.id && s.is_attached_to(&network_id))
            .filter_map(|s| name_ordinal(&s.name).map(|n| (n, s)))
            .max_by_key(|(n, _)| *n)
            .map(|(_, s)| s)
            .ok_or_else(|| {
                OrchestratorError::ClusterCorrupt(format!(
                    "no removable node on the network of {}",
                    record.name
                ))
            })
    }

    async fn master_network(
        &self,
        record: &ClusterRecord,
    ) -> Result<(ServerDetails, String), OrchestratorError> {
        let master_ip = record.master_ip.as_deref().ok_or_else(|| {
            OrchestratorError::not_found(MissingResource::FloatingIp, &record.name)
        })?;
        let (_, master) = locate_master(self.session, master_ip).await?;
        let network_id = master
            .private_network()
            .map(str::to_string)
            .ok_or_else(|| {
                OrchestratorError::not_found(MissingResource::Network, &master.name)
            })?;
        Ok((master, network_id))
    }

    /// Adds up to `count` slaves. Each node is admitted on its own; a denial
    /// after the first node stops the loop and configures what was added.
    /// Any other failure removes every node added by this call and restores
    /// the original size.
    pub async fn scale_up(
        &self,
        record: &mut ClusterRecord,
        project: &Project,
        count: u32,
    ) -> Result<ScaleOutcome, OrchestratorError> {
        let start = ScaleStart {
            key: cluster_key(&record.name, record.id),
            size: record.size,
            status: record.status,
        };

        let template = match self.node_template(record, project).await {
            Ok(t) => t,
            Err(e) => {
                return Err(self
                    .tracker
                    .fail(record, Phase::ScaleUp, start.status, e)
                    .await);
            }
        };

        let mut added: Vec<AddedNode> = Vec::new();
        let mut admission_stopped = None;
        for iteration in 1..=count {
            let gate = self
                .locks
                .admission_gate(&record.owner, &record.project_name)
                .await;
            let verdict = match self.ledger.availability(self.session, project).await {
                Ok(availability) => self.admission.check_scale_up(
                    &availability,
                    &ResourceDemand::for_slaves(1, &record.slave),
                ),
                Err(e) => Err(e),
            };
            if let Err(denied) = verdict {
                drop(gate);
                if iteration == 1 {
                    return Err(self
                        .tracker
                        .fail(record, Phase::Admission, start.status, denied)
                        .await);
                }
                if matches!(denied, OrchestratorError::QuotaDenied { .. }) {
                    info!(
                        cluster_id = record.id,
                        added = added.len(),
                        reason = %denied,
                        "admission stopped scale-up early"
                    );
                    admission_stopped = Some(denied.to_string());
                    break;
                }
                return Err(self
                    .roll_back(record, &start, &added, InventoryRollback::None, denied)
                    .await);
            }

            record.pending_slaves += 1;
            let reserved = self.store.update_cluster(record).await;
            drop(gate);
            if let Err(e) = reserved {
                return Err(self
                    .roll_back(record, &start, &added, InventoryRollback::None, e.into())
                    .await);
            }

            match self.add_node(record, &template).await {
                Ok(node) => {
                    record.pending_slaves -= 1;
                    record.size += 1;
                    self.tracker
                        .progress(
                            record,
                            Phase::ScaleUp,
                            format!("New node {} was added to cluster network", node.name),
                        )
                        .await;
                    added.push(node);
                }
                Err(e) => {
                    return Err(self
                        .roll_back(record, &start, &added, InventoryRollback::None, e)
                        .await);
                }
            }
        }

        self.tracker
            .progress(
                record,
                Phase::Handoff,
                format!("Configuring communication for new nodes of {}", record.name),
            )
            .await;
        for node in &added {
            let target = RerouteTarget {
                hostname: node.hostname.clone(),
                private_ip: node.private_ip.clone(),
                ssh_port: node.ssh_port,
                admin_pass: node.admin_pass.clone(),
            };
            if let Err(e) = self.rerouter.reroute(&target, &template.master_ip).await {
                return Err(self
                    .roll_back(record, &start, &added, InventoryRollback::None, e.into())
                    .await);
            }
        }

        let hosts: Vec<InventoryHost> = added
            .iter()
            .map(|n| InventoryHost {
                hostname: n.hostname.clone(),
                private_ip: n.private_ip.clone(),
                ssh_port: n.ssh_port,
                role: VmRole::Slave,
            })
            .collect();
        let inventory = match self
            .runner
            .modify_inventory(&start.key, InventoryChange::AddSlaves(hosts))
            .await
        {
            Ok(inventory) => inventory,
            Err(e) => {
                return Err(self
                    .roll_back(record, &start, &added, InventoryRollback::Entries, e.into())
                    .await);
            }
        };

        self.tracker
            .progress(
                record,
                Phase::Handoff,
                format!("Configuring cluster software for new nodes of {}", record.name),
            )
            .await;
        let converged = match self
            .runner
            .run(&inventory, RunnerAction::AddNodes { count: added.len() })
            .await
        {
            Ok(()) => self
                .runner
                .modify_inventory(&start.key, InventoryChange::JoinSlaves)
                .await
                .map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = converged {
            return Err(self
                .roll_back(record, &start, &added, InventoryRollback::Joined, e.into())
                .await);
        }

        let restart_error = self.restart_if_started(record, &start.key).await;
        self.complete(record, start.status, &restart_error).await?;
        Ok(ScaleOutcome {
            cluster_id: record.id,
            cluster_name: record.name.clone(),
            previous_size: start.size,
            new_size: record.size,
            added: added.into_iter().map(|n| n.name).collect(),
            removed: Vec::new(),
            admission_stopped,
            restart_error,
        })
    }

    async fn node_template(
        &self,
        record: &ClusterRecord,
        project: &Project,
    ) -> Result<NodeTemplate, OrchestratorError> {
        let flavors = self
            .session
            .list_flavors()
            .await
            .map_err(|e| OrchestratorError::remote(Stage::Lookup, e))?;
        let flavor_id = resolve_flavor(&flavors, &record.slave, &record.disk_template)?;
        let images = self
            .session
            .list_public_images()
            .await
            .map_err(|e| OrchestratorError::remote(Stage::Lookup, e))?;
        let image_id = resolve_image(&images, &record.os_image)?;
        let personality = build_personality(&self.settings.keys).await?;
        let (_, network_id) = self.master_network(record).await?;
        let master_ip = record.master_ip.clone().unwrap_or_default();
        Ok(NodeTemplate {
            flavor_id,
            image_id,
            project_id: project.id.clone(),
            network_id,
            master_ip,
            personality,
        })
    }

    async fn add_node(
        &self,
        record: &mut ClusterRecord,
        template: &NodeTemplate,
    ) -> Result<AddedNode, OrchestratorError> {
        let ordinal = record.size + 1;
        let name = vm_name(&record.name, ordinal);
        self.tracker
            .progress(record, Phase::ScaleUp, format!("Adding new node {name}"))
            .await;
        let spec = ServerSpec {
            name: name.clone(),
            flavor_id: template.flavor_id.clone(),
            image_id: template.image_id.clone(),
            project_id: template.project_id.clone(),
            personality: template.personality.clone(),
            networks: NetworkSelection::Attach(vec![template.network_id.clone()]),
        };
        let server = self.session.create_server(&spec).await.map_err(|e| {
            OrchestratorError::remote(Stage::ServerCreate, format!("{name}: {e}"))
        })?;
        let max_wait = self.settings.wait.max_wait;
        if let Err(e) = await_server(
            self.session,
            &server.id,
            &server.name,
            ResourceStatus::Build,
            ResourceStatus::Active,
            max_wait,
        )
        .await
        {
            // Not yet in `added`, so the caller's rollback cannot see it.
            if let Err(cleanup) =
                delete_server_and_wait(self.session, &server.id, &name, max_wait)
                    .await
            {
                error!(
                    cluster_id = record.id,
                    server = %name,
                    error = %cleanup,
                    "rollback could not delete server"
                );
            }
            return Err(e);
        }
        let policy = &self.settings.network;
        Ok(AddedNode {
            remote_id: server.id.clone(),
            hostname: server.fqdn.clone().unwrap_or_else(|| name.clone()),
            name,
            private_ip: policy.private_ip(ordinal),
            ssh_port: policy.forwarded_port(ordinal),
            admin_pass: server.admin_pass.clone(),
        })
    }

    /// Deletes the nodes added by this call, undoes their inventory changes
    /// and restores the size. Rollback failures are logged; the triggering
    /// error is what the caller gets back.
    async fn roll_back(
        &self,
        record: &mut ClusterRecord,
        start: &ScaleStart,
        added: &[AddedNode],
        level: InventoryRollback,
        cause: OrchestratorError,
    ) -> OrchestratorError {
        let key = start.key.as_str();
        warn!(cluster_id = record.id, error = %cause, nodes = added.len(), "rolling back scale-up");
        self.tracker
            .progress(record, Phase::Rollback, format!("{cause}. Rolling back"))
            .await;
        for node in added {
            if let Err(e) = delete_server_and_wait(
                self.session,
                &node.remote_id,
                &node.name,
                self.settings.wait.max_wait,
            )
            .await
            {
                error!(
                    cluster_id = record.id,
                    server = %node.name,
                    error = %e,
                    "rollback could not delete server"
                );
            }
        }
        if level >= InventoryRollback::Entries {
            for node in added {
                let change = InventoryChange::RemoveSlave {
                    hostname: node.hostname.clone(),
                };
                if let Err(e) = self.runner.modify_inventory(key, change).await {
                    error!(
                        cluster_id = record.id,
                        host = %node.hostname,
                        error = %e,
                        "rollback could not remove inventory entry"
                    );
                }
            }
        }
        if level >= InventoryRollback::Joined {
            let reverted = match self
                .runner
                .modify_inventory(key, InventoryChange::JoinSlaves)
                .await
            {
                Ok(inventory) => self.runner.run(&inventory, RunnerAction::RollbackScale).await,
                Err(e) => Err(e),
            };
            if let Err(e) = reverted {
                error!(
                    cluster_id = record.id,
                    error = %e,
                    "rollback could not revert cluster configuration"
                );
            }
        }
        record.size = start.size;
        record.pending_slaves = 0;
        let msg = format!("{cause}. Scale action failed. Cluster rolled back");
        if let Err(e) = self
            .tracker
            .finish(
                record,
                Phase::Rollback,
                start.status,
                msg.clone(),
                Some(msg),
            )
            .await
        {
            error!(cluster_id = record.id, error = %e, "could not persist rolled back cluster");
        }
        cause
    }

    /// Restarts a running service so membership changes take effect.
    /// Returns the failure message; the scale itself is kept.
    async fn restart_if_started(
        &self,
        record: &mut ClusterRecord,
        key: &str,
    ) -> Option<String> {
        if record.service_status != ServiceStatus::Started {
            return None;
        }
        self.tracker
            .progress(
                record,
                Phase::Restart,
                format!("Restarting {} for the changes to take effect", record.name),
            )
            .await;
        let restarted = async {
            let inventory = self.runner.load_inventory(key).await?;
            self.runner.run(&inventory, RunnerAction::Stop).await?;
            self.runner.run(&inventory, RunnerAction::Start).await
        }
        .await;
        restarted.err().map(|e| {
            warn!(cluster_id = record.id, error = %e, "restart after scale failed");
            format!(
                "Restarting {} failed with {e}. Try to restart it manually.",
                record.name
            )
        })
    }

    async fn complete(
        &self,
        record: &mut ClusterRecord,
        status: ClusterStatus,
        restart_error: &Option<String>,
    ) -> Result<(), OrchestratorError> {
        let (msg, error) = match restart_error {
            Some(e) => (e.clone(), Some(e.clone())),
            None => (
                format!(
                    "Scaled cluster {} and new cluster size is {}",
                    record.name, record.size
                ),
                None,
            ),
        };
        self.tracker
            .finish(record, Phase::Completed, status, msg, error)
            .await
    }
}
