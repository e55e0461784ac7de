use super::{delete_server_and_wait, vm_name};
use crate::cloud::{CloudSession, await_port, await_server};
use crate::config::{CLUSTER_SUBNET_CIDR, NetworkPolicy, OrchestratorSettings};
use crate::errors::{OrchestratorError, Stage};
use crate::handoff::{
    ConfigRunner, InventoryChange, InventoryHost, RerouteTarget, RunnerAction,
    SshRerouter,
};
use crate::reporter::StatusTracker;
use orka_models::{
    AttachmentKind, ClusterRecord, FloatingIp, NetworkResource,
    NetworkSelection, PersonalityFile, Phase, Port, ResourceStatus,
    ServerDetails, ServerSpec, VmHandle, VmRole,
};
use tracing::{error, info, warn};

const MASTER_SSH_PORT: u32 = 22;

/// Everything resolved before the first remote mutation.
#[derive(Debug, Clone)]
pub struct ProvisionPlan {
    pub cluster_name: String,
    pub size: u32,
    pub project_id: String,
    pub master_flavor_id: String,
    pub slave_flavor_id: String,
    pub image_id: String,
    pub personality: Vec<PersonalityFile>,
}

#[derive(Debug, Clone)]
pub struct ProvisionedCluster {
    pub master_ip: String,
    pub network: NetworkResource,
    pub floating_ip: FloatingIp,
    pub vms: Vec<VmHandle>,
    pub ports: Vec<Port>,
}

impl ProvisionedCluster {
    pub fn master(&self) -> Option<&VmHandle> {
        self.vms.iter().find(|vm| vm.role == VmRole::Master)
    }
}

/// Remote resources created so far by one call, in creation order.
#[derive(Debug, Default)]
struct Created {
    network: Option<String>,
    servers: Vec<(String, String)>,
}

pub struct ClusterProvisioner<'a> {
    session: &'a dyn CloudSession,
    tracker: &'a StatusTracker,
    settings: &'a OrchestratorSettings,
}

impl<'a> ClusterProvisioner<'a> {
    pub fn new(
        session: &'a dyn CloudSession,
        tracker: &'a StatusTracker,
        settings: &'a OrchestratorSettings,
    ) -> Self {
        Self {
            session,
            tracker,
            settings,
        }
    }

    /// Runs the create protocol. On any failure every server created by this
    /// call and the network are removed before the error is returned.
    pub async fn create(
        &self,
        record: &mut ClusterRecord,
        plan: &ProvisionPlan,
    ) -> Result<ProvisionedCluster, OrchestratorError> {
        let mut created = Created::default();
        match self.run(record, plan, &mut created).await {
            Ok(cluster) => Ok(cluster),
            Err(e) => {
                error!(cluster_id = record.id, error = %e, "provisioning failed");
                self.tracker
                    .progress(
                        record,
                        Phase::Cleanup,
                        format!("{e}. Removing created resources"),
                    )
                    .await;
                self.clean_up(record.id, &created).await;
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        record: &mut ClusterRecord,
        plan: &ProvisionPlan,
        created: &mut Created,
    ) -> Result<ProvisionedCluster, OrchestratorError> {
        let max_wait = self.settings.wait.max_wait;

        self.tracker
            .progress(record, Phase::Network, "Creating private network")
            .await;
        let network = self
            .session
            .create_network(&plan.cluster_name, &plan.project_id)
            .await
            .map_err(|e| OrchestratorError::remote(Stage::Network, e))?;
        created.network = Some(network.id.clone());
        info!(cluster_id = record.id, network = %network.id, "network created");

        self.tracker
            .progress(record, Phase::FloatingIp, "Reserving floating IP")
            .await;
        let floating_ip = self.ensure_floating_ip(&plan.project_id).await?;

        self.tracker
            .progress(
                record,
                Phase::Servers,
                format!("Creating {} virtual machines", plan.size),
            )
            .await;
        let master_spec = ServerSpec {
            name: vm_name(&plan.cluster_name, 1),
            flavor_id: plan.master_flavor_id.clone(),
            image_id: plan.image_id.clone(),
            project_id: plan.project_id.clone(),
            personality: plan.personality.clone(),
            networks: NetworkSelection::Default,
        };
        let master = self.create_server(&master_spec, created).await?;
        let mut slaves: Vec<(u32, ServerDetails)> = Vec::new();
        for ordinal in 2..=plan.size {
            let spec = ServerSpec {
                name: vm_name(&plan.cluster_name, ordinal),
                flavor_id: plan.slave_flavor_id.clone(),
                image_id: plan.image_id.clone(),
                project_id: plan.project_id.clone(),
                personality: plan.personality.clone(),
                networks: NetworkSelection::Isolated,
            };
            let slave = self.create_server(&spec, created).await?;
            slaves.push((ordinal, slave));
        }

        await_server(
            self.session,
            &master.id,
            &master.name,
            ResourceStatus::Build,
            ResourceStatus::Active,
            max_wait,
        )
        .await?;
        let master_now = self
            .session
            .get_server_details(&master.id)
            .await
            .map_err(|e| OrchestratorError::remote(Stage::ServerWait, e))?;
        let master_ip = master_now
            .attachments
            .iter()
            .find(|a| a.kind == AttachmentKind::Floating)
            .and_then(|a| a.ipv4.clone())
            .unwrap_or_else(|| floating_ip.address.clone());

        self.tracker
            .progress(record, Phase::Subnet, "Creating cluster subnet")
            .await;
        self.session
            .create_subnet(&network.id, CLUSTER_SUBNET_CIDR, true)
            .await
            .map_err(|e| OrchestratorError::remote(Stage::Subnet, e))?;

        self.tracker
            .progress(record, Phase::Ports, "Attaching servers to cluster network")
            .await;
        let master_port = self
            .session
            .create_port(&network.id, &master.id)
            .await
            .map_err(|e| OrchestratorError::remote(Stage::Port, e))?;
        await_port(self.session, &master_port.id, max_wait).await?;
        let mut ports = vec![master_port];

        for (_, slave) in &slaves {
            await_server(
                self.session,
                &slave.id,
                &slave.name,
                ResourceStatus::Build,
                ResourceStatus::Active,
                max_wait,
            )
            .await?;
            let port = self
                .session
                .create_port(&network.id, &slave.id)
                .await
                .map_err(|e| OrchestratorError::remote(Stage::Port, e))?;
            ports.push(port);
        }
        for port in ports.iter().skip(1) {
            await_port(self.session, &port.id, max_wait).await?;
        }

        let mut vms = Vec::with_capacity(plan.size as usize);
        let mut master_handle = VmHandle::from_details(&master, VmRole::Master, 1);
        master_handle.fqdn = master_now.fqdn.clone().or(master_handle.fqdn);
        vms.push(master_handle);
        for (ordinal, slave) in &slaves {
            vms.push(VmHandle::from_details(slave, VmRole::Slave, *ordinal));
        }
        for vm in vms.iter_mut() {
            vm.network_id = Some(network.id.clone());
            vm.build_status = ResourceStatus::Active;
        }

        info!(
            cluster_id = record.id,
            master_ip = %master_ip,
            servers = vms.len(),
            "cluster provisioned"
        );
        Ok(ProvisionedCluster {
            master_ip,
            network,
            floating_ip,
            vms,
            ports,
        })
    }

    async fn create_server(
        &self,
        spec: &ServerSpec,
        created: &mut Created,
    ) -> Result<ServerDetails, OrchestratorError> {
        let details = self.session.create_server(spec).await.map_err(|e| {
            OrchestratorError::remote(
                Stage::ServerCreate,
                format!("{}: {e}", spec.name),
            )
        })?;
        created.servers.push((details.id.clone(), details.name.clone()));
        Ok(details)
    }

    /// Reuses an unattached floating IP, otherwise allocates one. Allocation
    /// is tried on the network of the last listed IP first, then on every
    /// active public network carrying the configured name.
    async fn ensure_floating_ip(
        &self,
        project_id: &str,
    ) -> Result<FloatingIp, OrchestratorError> {
        let ips = self
            .session
            .list_floating_ips()
            .await
            .map_err(|e| OrchestratorError::remote(Stage::FloatingIp, e))?;
        if let Some(ip) = ips.iter().find(|ip| ip.is_unattached()) {
            info!(address = %ip.address, "reusing unattached floating IP");
            return Ok(ip.clone());
        }
        if let Some(last) = ips.last() {
            match self
                .session
                .create_floating_ip(&last.floating_network_id, project_id)
                .await
            {
                Ok(ip) => return Ok(ip),
                Err(e) => warn!(
                    network = %last.floating_network_id,
                    error = %e,
                    "floating IP allocation failed, trying public networks"
                ),
            }
        }
        let networks = self
            .session
            .list_public_networks()
            .await
            .map_err(|e| OrchestratorError::remote(Stage::FloatingIp, e))?;
        let wanted = &self.settings.network.floating_network_name;
        for network in networks
            .iter()
            .filter(|n| n.is_active() && &n.name == wanted)
        {
            match self.session.create_floating_ip(&network.id, project_id).await {
                Ok(ip) => return Ok(ip),
                Err(e) => warn!(
                    network = %network.id,
                    error = %e,
                    "floating IP allocation failed"
                ),
            }
        }
        Err(OrchestratorError::remote(
            Stage::FloatingIp,
            "no floating IP could be allocated",
        ))
    }

    /// Best effort. Failures are logged and never replace the error that
    /// triggered the cleanup.
    async fn clean_up(&self, cluster_id: u64, created: &Created) {
        let max_wait = self.settings.wait.max_wait;
        for (id, name) in &created.servers {
            if let Err(e) =
                delete_server_and_wait(self.session, id, name, max_wait).await
            {
                error!(
                    cluster_id,
                    server = %name,
                    error = %e,
                    "cleanup could not delete server"
                );
            }
        }
        if let Some(network) = &created.network {
            if let Err(e) = self.session.delete_network(network).await {
                error!(
                    cluster_id,
                    network = %network,
                    error = %e,
                    "cleanup could not delete network"
                );
            }
        }
    }
}

/// Makes every slave reachable through the master and installs the cluster
/// software on the full inventory.
pub async fn hand_off(
    runner: &dyn ConfigRunner,
    rerouter: &dyn SshRerouter,
    policy: &NetworkPolicy,
    cluster_key: &str,
    cluster: &ProvisionedCluster,
) -> Result<(), OrchestratorError> {
    let hosts: Vec<InventoryHost> = cluster
        .vms
        .iter()
        .map(|vm| InventoryHost {
            hostname: vm.fqdn.clone().unwrap_or_else(|| vm.name.clone()),
            private_ip: policy.private_ip(vm.ordinal),
            ssh_port: match vm.role {
                VmRole::Master => MASTER_SSH_PORT,
                VmRole::Slave => policy.forwarded_port(vm.ordinal),
            },
            role: vm.role,
        })
        .collect();
    for (vm, host) in cluster.vms.iter().zip(&hosts) {
        if vm.role != VmRole::Slave {
            continue;
        }
        let target = RerouteTarget {
            hostname: host.hostname.clone(),
            private_ip: host.private_ip.clone(),
            ssh_port: host.ssh_port,
            admin_pass: vm.admin_pass.clone(),
        };
        rerouter.reroute(&target, &cluster.master_ip).await?;
    }
    let inventory = runner
        .modify_inventory(
            cluster_key,
            InventoryChange::Create {
                master_ip: cluster.master_ip.clone(),
                hosts,
            },
        )
        .await?;
    runner.run(&inventory, RunnerAction::Install).await?;
    Ok(())
}
