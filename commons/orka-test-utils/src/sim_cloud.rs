//! In-memory cloud control plane with quota accounting, a call log and
//! fault injection.

use async_trait::async_trait;
use orka_models::{
    AttachmentKind, BYTES_PER_GB, BYTES_PER_MB, Flavor, FloatingIp, Image,
    NetworkResource, NetworkSelection, Port, Project, PublicNetwork,
    QuotaEntry, QuotaSnapshot, ResourceKind, ResourceStatus, ServerAttachment,
    ServerDetails, ServerSpec, Subnet,
};
use orka_orchestrator::cloud::{CloudProvider, CloudResult, CloudSession};
use orka_orchestrator::errors::CloudError;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

pub const SIM_USER: &str = "user-1";
pub const SIM_TOKEN: &str = "token-1";
pub const SIM_PROJECT: &str = "escience";
pub const SIM_PROJECT_ID: &str = "project-1";
pub const SIM_IMAGE: &str = "Debian Base";
pub const SIM_PUBLIC_NETWORK: &str = "Public IPv4 Network";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimOp {
    CreateServer,
    DeleteServer,
    WaitServer,
    CreateNetwork,
    DeleteNetwork,
    CreateSubnet,
    CreatePort,
    WaitPort,
    CreateFloatingIp,
    DeleteFloatingIp,
    ListServers,
    ListFloatingIps,
    GetQuotas,
}

impl SimOp {
    /// Whether the call changes remote state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            SimOp::CreateServer
                | SimOp::DeleteServer
                | SimOp::CreateNetwork
                | SimOp::DeleteNetwork
                | SimOp::CreateSubnet
                | SimOp::CreatePort
                | SimOp::CreateFloatingIp
                | SimOp::DeleteFloatingIp
        )
    }
}

impl fmt::Display for SimOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimCall {
    pub op: SimOp,
    pub target: String,
}

#[derive(Debug, Clone)]
struct SimServer {
    details: ServerDetails,
    project_id: String,
    flavor: Flavor,
}

#[derive(Debug, Clone)]
struct SimNetwork {
    resource: NetworkResource,
    project_id: String,
    next_host: u32,
}

#[derive(Debug, Default)]
struct SimState {
    seq: u64,
    projects: Vec<Project>,
    quotas: HashMap<String, QuotaSnapshot>,
    flavors: Vec<Flavor>,
    images: Vec<Image>,
    public_networks: Vec<PublicNetwork>,
    servers: BTreeMap<String, SimServer>,
    networks: BTreeMap<String, SimNetwork>,
    subnets: Vec<Subnet>,
    ports: BTreeMap<String, Port>,
    floating_ips: BTreeMap<String, (FloatingIp, String)>,
    calls: Vec<SimCall>,
    op_counts: HashMap<SimOp, usize>,
    faults: HashMap<SimOp, HashSet<usize>>,
    always_fail: HashSet<SimOp>,
    wait_outcomes: HashMap<String, ResourceStatus>,
    revoked_tokens: HashSet<String>,
}

impl SimState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.seq += 1;
        format!("{prefix}-{}", self.seq)
    }

    /// Logs the call and applies injected faults.
    fn record(&mut self, op: SimOp, target: impl Into<String>) -> CloudResult<()> {
        let target = target.into();
        debug!(op = %op, target = %target, "sim cloud call");
        self.calls.push(SimCall {
            op,
            target: target.clone(),
        });
        let n = self.op_counts.entry(op).or_default();
        *n += 1;
        let nth = *n;
        let injected = self.always_fail.contains(&op)
            || self.faults.get(&op).is_some_and(|f| f.contains(&nth));
        if injected {
            return Err(CloudError::Rejected(format!(
                "injected failure on {op} #{nth} ({target})"
            )));
        }
        Ok(())
    }

    fn quota_mut(&mut self, project_id: &str) -> CloudResult<&mut QuotaSnapshot> {
        self.quotas.get_mut(project_id).ok_or_else(|| CloudError::NotFound {
            resource: "project",
            id: project_id.to_string(),
        })
    }

    fn server_mut(&mut self, id: &str) -> CloudResult<&mut SimServer> {
        self.servers.get_mut(id).ok_or_else(|| CloudError::NotFound {
            resource: "server",
            id: id.to_string(),
        })
    }
}

fn charge(entry: &mut QuotaEntry, amount: i64) -> CloudResult<()> {
    if amount > 0 && entry.usage + amount > entry.limit {
        return Err(CloudError::Rejected("quota exceeded".to_string()));
    }
    entry.usage += amount;
    entry.project_usage += amount;
    Ok(())
}

fn charge_server(quota: &mut QuotaSnapshot, flavor: &Flavor, sign: i64) -> CloudResult<()> {
    let mut staged = quota.clone();
    charge(&mut staged.vm, sign)?;
    charge(&mut staged.cpu, sign * flavor.vcpus as i64)?;
    charge(&mut staged.ram, sign * flavor.ram_mb as i64 * BYTES_PER_MB)?;
    charge(&mut staged.disk, sign * flavor.disk_gb as i64 * BYTES_PER_GB)?;
    *quota = staged;
    Ok(())
}

/// Simulated cloud. Clones share state, so a test keeps a handle to inspect
/// what the orchestrator did.
#[derive(Clone)]
pub struct SimCloud {
    user_id: String,
    state: Arc<Mutex<SimState>>,
}

impl Default for SimCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl SimCloud {
    /// One project with generous quota, the usual flavor grid, one image and
    /// one active public network. No floating IP is allocated up front.
    pub fn new() -> Self {
        let mut state = SimState::default();
        state.projects.push(Project {
            id: SIM_PROJECT_ID.to_string(),
            name: SIM_PROJECT.to_string(),
        });
        state.quotas.insert(
            SIM_PROJECT_ID.to_string(),
            QuotaSnapshot {
                vm: QuotaEntry::new(20, 0),
                cpu: QuotaEntry::new(40, 0),
                ram: QuotaEntry::new(64 * 1024 * BYTES_PER_MB, 0),
                disk: QuotaEntry::new(500 * BYTES_PER_GB, 0),
                network: QuotaEntry::new(5, 0),
                floating_ip: QuotaEntry::new(5, 0),
            },
        );
        for template in ["drbd", "ext_vlmc"] {
            for vcpus in [1, 2, 4] {
                for ram_mb in [1024, 2048, 4096] {
                    for disk_gb in [10, 20, 40] {
                        let id = format!("C{vcpus}R{ram_mb}D{disk_gb}{template}");
                        state.flavors.push(Flavor {
                            id: id.clone(),
                            name: id,
                            vcpus,
                            ram_mb,
                            disk_gb,
                            disk_template: template.to_string(),
                            allow_create: true,
                        });
                    }
                }
            }
        }
        state.images.push(Image {
            id: "image-debian".to_string(),
            name: SIM_IMAGE.to_string(),
            owner: "system".to_string(),
        });
        state.public_networks.push(PublicNetwork {
            id: "public-1".to_string(),
            name: SIM_PUBLIC_NETWORK.to_string(),
            status: "ACTIVE".to_string(),
        });
        Self {
            user_id: SIM_USER.to_string(),
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Sets the limit of `kind` in request units (RAM in MB, disk in GB).
    pub async fn set_limit(&self, kind: ResourceKind, limit: i64) {
        let mut state = self.state.lock().await;
        let Some(quota) = state.quotas.get_mut(SIM_PROJECT_ID) else {
            return;
        };
        let (entry, scale) = match kind {
            ResourceKind::ClusterSize => (&mut quota.vm, 1),
            ResourceKind::Network => (&mut quota.network, 1),
            ResourceKind::FloatingIp => (&mut quota.floating_ip, 1),
            ResourceKind::Cpu => (&mut quota.cpu, 1),
            ResourceKind::Ram => (&mut quota.ram, BYTES_PER_MB),
            ResourceKind::Disk => (&mut quota.disk, BYTES_PER_GB),
        };
        entry.limit = limit * scale;
        entry.project_limit = limit * scale;
    }

    pub async fn quota(&self) -> QuotaSnapshot {
        let state = self.state.lock().await;
        state.quotas.get(SIM_PROJECT_ID).cloned().unwrap_or_default()
    }

    /// Makes the `nth` call (1-based) of `op` fail.
    pub async fn fail_nth(&self, op: SimOp, nth: usize) {
        let mut state = self.state.lock().await;
        state.faults.entry(op).or_default().insert(nth);
    }

    pub async fn fail_always(&self, op: SimOp) {
        self.state.lock().await.always_fail.insert(op);
    }

    pub async fn clear_faults(&self) {
        let mut state = self.state.lock().await;
        state.faults.clear();
        state.always_fail.clear();
    }

    /// Status the next wait on the building server `name` reports instead of
    /// ACTIVE. Later waits see the build finish normally.
    pub async fn set_wait_outcome(&self, name: &str, status: ResourceStatus) {
        self.state
            .lock()
            .await
            .wait_outcomes
            .insert(name.to_string(), status);
    }

    /// Drops the private network attachments and ports of server `name`,
    /// leaving only its floating IP.
    pub async fn detach_private_network(&self, name: &str) {
        let mut state = self.state.lock().await;
        let Some(id) = state
            .servers
            .iter()
            .find(|(_, s)| s.details.name == name)
            .map(|(id, _)| id.clone())
        else {
            return;
        };
        if let Some(server) = state.servers.get_mut(&id) {
            server
                .details
                .attachments
                .retain(|a| a.kind != AttachmentKind::Fixed);
        }
        state.ports.retain(|_, p| p.server_id != id);
    }

    pub async fn revoke_token(&self, token: &str) {
        self.state.lock().await.revoked_tokens.insert(token.to_string());
    }

    pub async fn allocate_floating_ip(&self) -> FloatingIp {
        let mut state = self.state.lock().await;
        allocate_ip(&mut state, "public-1", SIM_PROJECT_ID)
    }

    pub async fn calls(&self) -> Vec<SimCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn count(&self, op: SimOp) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.op == op)
            .count()
    }

    pub async fn mutation_count(&self) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.op.is_mutation())
            .count()
    }

    pub async fn reset_calls(&self) {
        let mut state = self.state.lock().await;
        state.calls.clear();
        state.op_counts.clear();
    }

    /// Servers not yet deleted.
    pub async fn live_servers(&self) -> Vec<ServerDetails> {
        self.state
            .lock()
            .await
            .servers
            .values()
            .filter(|s| s.details.status != ResourceStatus::Deleted)
            .map(|s| s.details.clone())
            .collect()
    }

    pub async fn network_count(&self) -> usize {
        self.state.lock().await.networks.len()
    }

    pub async fn subnet_count(&self) -> usize {
        self.state.lock().await.subnets.len()
    }

    pub async fn floating_ips(&self) -> Vec<FloatingIp> {
        self.state
            .lock()
            .await
            .floating_ips
            .values()
            .map(|(ip, _)| ip.clone())
            .collect()
    }
}

fn allocate_ip(state: &mut SimState, network_id: &str, project_id: &str) -> FloatingIp {
    let id = state.next_id("fip");
    let ip = FloatingIp {
        address: format!("83.212.0.{}", state.seq % 250 + 1),
        id: id.clone(),
        floating_network_id: network_id.to_string(),
        instance_id: None,
        port_id: None,
    };
    state
        .floating_ips
        .insert(id, (ip.clone(), project_id.to_string()));
    ip
}

#[async_trait]
impl CloudProvider for SimCloud {
    async fn authenticate(&self, token: &str) -> CloudResult<Arc<dyn CloudSession>> {
        if self.state.lock().await.revoked_tokens.contains(token) {
            return Err(CloudError::Unauthorized("token revoked".to_string()));
        }
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl CloudSession for SimCloud {
    fn user_id(&self) -> &str {
        &self.user_id
    }

    async fn list_projects(&self) -> CloudResult<Vec<Project>> {
        Ok(self.state.lock().await.projects.clone())
    }

    async fn get_quotas(&self) -> CloudResult<HashMap<String, QuotaSnapshot>> {
        let mut state = self.state.lock().await;
        state.record(SimOp::GetQuotas, "")?;
        Ok(state.quotas.clone())
    }

    async fn list_flavors(&self) -> CloudResult<Vec<Flavor>> {
        Ok(self.state.lock().await.flavors.clone())
    }

    async fn list_public_images(&self) -> CloudResult<Vec<Image>> {
        Ok(self.state.lock().await.images.clone())
    }

    async fn create_server(&self, spec: &ServerSpec) -> CloudResult<ServerDetails> {
        let mut state = self.state.lock().await;
        state.record(SimOp::CreateServer, &spec.name)?;
        let flavor = state
            .flavors
            .iter()
            .find(|f| f.id == spec.flavor_id)
            .cloned()
            .ok_or_else(|| CloudError::NotFound {
                resource: "flavor",
                id: spec.flavor_id.clone(),
            })?;
        charge_server(state.quota_mut(&spec.project_id)?, &flavor, 1)?;

        let id = state.next_id("srv");
        let mut attachments = Vec::new();
        match &spec.networks {
            NetworkSelection::Default => {
                let free = state
                    .floating_ips
                    .iter()
                    .find(|(_, (ip, _))| ip.is_unattached())
                    .map(|(key, _)| key.clone());
                let Some((ip, _)) =
                    free.and_then(|key| state.floating_ips.get_mut(&key))
                else {
                    let quota = state.quota_mut(&spec.project_id)?;
                    charge_server(quota, &flavor, -1)?;
                    return Err(CloudError::Rejected(
                        "no free floating IP for public attachment".to_string(),
                    ));
                };
                ip.instance_id = Some(id.clone());
                ip.port_id = Some(format!("{id}-public"));
                attachments.push(ServerAttachment {
                    network_id: ip.floating_network_id.clone(),
                    kind: AttachmentKind::Floating,
                    ipv4: Some(ip.address.clone()),
                    ipv6: None,
                });
            }
            NetworkSelection::Isolated => {}
            NetworkSelection::Attach(networks) => {
                for network_id in networks {
                    let network = state.networks.get_mut(network_id).ok_or_else(|| {
                        CloudError::NotFound {
                            resource: "network",
                            id: network_id.clone(),
                        }
                    })?;
                    network.next_host += 1;
                    attachments.push(ServerAttachment {
                        network_id: network_id.clone(),
                        kind: AttachmentKind::Fixed,
                        ipv4: Some(format!("192.168.0.{}", network.next_host)),
                        ipv6: None,
                    });
                }
            }
        }

        let details = ServerDetails {
            id: id.clone(),
            name: spec.name.clone(),
            status: ResourceStatus::Build,
            fqdn: Some(format!("{id}.vm.sim.local")),
            user_id: self.user_id.clone(),
            image_id: spec.image_id.clone(),
            attachments,
            admin_pass: Some(format!("pass-{id}")),
        };
        let mut stored = details.clone();
        stored.admin_pass = None;
        state.servers.insert(
            id,
            SimServer {
                details: stored,
                project_id: spec.project_id.clone(),
                flavor,
            },
        );
        Ok(details)
    }

    async fn get_server_details(&self, id: &str) -> CloudResult<ServerDetails> {
        let mut state = self.state.lock().await;
        Ok(state.server_mut(id)?.details.clone())
    }

    async fn list_servers(&self) -> CloudResult<Vec<ServerDetails>> {
        let mut state = self.state.lock().await;
        state.record(SimOp::ListServers, "")?;
        Ok(state
            .servers
            .values()
            .filter(|s| s.details.status != ResourceStatus::Deleted)
            .map(|s| s.details.clone())
            .collect())
    }

    async fn delete_server(&self, id: &str) -> CloudResult<()> {
        let mut state = self.state.lock().await;
        let name = state.server_mut(id)?.details.name.clone();
        state.record(SimOp::DeleteServer, &name)?;
        let server = state.server_mut(id)?;
        match server.details.status {
            ResourceStatus::Deleted => return Ok(()),
            ResourceStatus::Build => {
                return Err(CloudError::Rejected(format!(
                    "server {name} is still building"
                )));
            }
            _ => {}
        }
        server.details.status = ResourceStatus::Deleted;
        server.details.attachments.clear();
        let (project_id, flavor) = (server.project_id.clone(), server.flavor.clone());
        charge_server(state.quota_mut(&project_id)?, &flavor, -1)?;
        for (ip, _) in state.floating_ips.values_mut() {
            if ip.instance_id.as_deref() == Some(id) {
                ip.instance_id = None;
                ip.port_id = None;
            }
        }
        state.ports.retain(|_, p| p.server_id != id);
        Ok(())
    }

    async fn wait_server(
        &self,
        id: &str,
        current: ResourceStatus,
        _max_wait: Duration,
    ) -> CloudResult<ResourceStatus> {
        let mut state = self.state.lock().await;
        let name = state.server_mut(id)?.details.name.clone();
        state.record(SimOp::WaitServer, &name)?;
        let building = state.server_mut(id)?.details.status == ResourceStatus::Build;
        if !building || current != ResourceStatus::Build {
            return Ok(state.server_mut(id)?.details.status);
        }
        let outcome = state.wait_outcomes.remove(&name);
        let server = state.server_mut(id)?;
        server.details.status = outcome.unwrap_or(ResourceStatus::Active);
        Ok(server.details.status)
    }

    async fn create_network(
        &self,
        name: &str,
        project_id: &str,
    ) -> CloudResult<NetworkResource> {
        let mut state = self.state.lock().await;
        state.record(SimOp::CreateNetwork, name)?;
        charge(&mut state.quota_mut(project_id)?.network, 1)?;
        let id = state.next_id("net");
        let resource = NetworkResource {
            id: id.clone(),
            name: name.to_string(),
            subnet_cidr: None,
            ports: Vec::new(),
        };
        state.networks.insert(
            id,
            SimNetwork {
                resource: resource.clone(),
                project_id: project_id.to_string(),
                next_host: 1,
            },
        );
        Ok(resource)
    }

    async fn delete_network(&self, id: &str) -> CloudResult<()> {
        let mut state = self.state.lock().await;
        state.record(SimOp::DeleteNetwork, id)?;
        let network = state.networks.remove(id).ok_or_else(|| CloudError::NotFound {
            resource: "network",
            id: id.to_string(),
        })?;
        state.subnets.retain(|s| s.network_id != id);
        state.ports.retain(|_, p| p.network_id != id);
        charge(&mut state.quota_mut(&network.project_id)?.network, -1)
    }

    async fn list_public_networks(&self) -> CloudResult<Vec<PublicNetwork>> {
        Ok(self.state.lock().await.public_networks.clone())
    }

    async fn create_subnet(
        &self,
        network_id: &str,
        cidr: &str,
        enable_dhcp: bool,
    ) -> CloudResult<Subnet> {
        let mut state = self.state.lock().await;
        state.record(SimOp::CreateSubnet, network_id)?;
        let network = state.networks.get_mut(network_id).ok_or_else(|| {
            CloudError::NotFound {
                resource: "network",
                id: network_id.to_string(),
            }
        })?;
        network.resource.subnet_cidr = Some(cidr.to_string());
        let id = state.next_id("subnet");
        let subnet = Subnet {
            id,
            network_id: network_id.to_string(),
            cidr: cidr.to_string(),
            enable_dhcp,
        };
        state.subnets.push(subnet.clone());
        Ok(subnet)
    }

    async fn create_port(&self, network_id: &str, server_id: &str) -> CloudResult<Port> {
        let mut state = self.state.lock().await;
        state.record(SimOp::CreatePort, server_id)?;
        let network = state.networks.get_mut(network_id).ok_or_else(|| {
            CloudError::NotFound {
                resource: "network",
                id: network_id.to_string(),
            }
        })?;
        network.next_host += 1;
        let address = format!("192.168.0.{}", network.next_host);
        let id = state.next_id("port");
        if let Some(network) = state.networks.get_mut(network_id) {
            network.resource.ports.push(id.clone());
        }
        let server = state.server_mut(server_id)?;
        server.details.attachments.push(ServerAttachment {
            network_id: network_id.to_string(),
            kind: AttachmentKind::Fixed,
            ipv4: Some(address),
            ipv6: None,
        });
        let port = Port {
            id: id.clone(),
            network_id: network_id.to_string(),
            server_id: server_id.to_string(),
            status: ResourceStatus::Build,
        };
        state.ports.insert(id, port.clone());
        Ok(port)
    }

    async fn get_port_details(&self, id: &str) -> CloudResult<Port> {
        self.state
            .lock()
            .await
            .ports
            .get(id)
            .cloned()
            .ok_or_else(|| CloudError::NotFound {
                resource: "port",
                id: id.to_string(),
            })
    }

    async fn wait_port(
        &self,
        id: &str,
        current: ResourceStatus,
        _max_wait: Duration,
    ) -> CloudResult<ResourceStatus> {
        let mut state = self.state.lock().await;
        state.record(SimOp::WaitPort, id)?;
        let port = state.ports.get_mut(id).ok_or_else(|| CloudError::NotFound {
            resource: "port",
            id: id.to_string(),
        })?;
        if port.status == current && current == ResourceStatus::Build {
            port.status = ResourceStatus::Active;
        }
        Ok(port.status)
    }

    async fn list_floating_ips(&self) -> CloudResult<Vec<FloatingIp>> {
        let mut state = self.state.lock().await;
        state.record(SimOp::ListFloatingIps, "")?;
        Ok(state.floating_ips.values().map(|(ip, _)| ip.clone()).collect())
    }

    async fn create_floating_ip(
        &self,
        floating_network_id: &str,
        project_id: &str,
    ) -> CloudResult<FloatingIp> {
        let mut state = self.state.lock().await;
        state.record(SimOp::CreateFloatingIp, floating_network_id)?;
        let known = state
            .public_networks
            .iter()
            .any(|n| n.id == floating_network_id && n.is_active());
        if !known {
            return Err(CloudError::NotFound {
                resource: "public network",
                id: floating_network_id.to_string(),
            });
        }
        charge(&mut state.quota_mut(project_id)?.floating_ip, 1)?;
        Ok(allocate_ip(&mut state, floating_network_id, project_id))
    }

    async fn delete_floating_ip(&self, id: &str) -> CloudResult<()> {
        let mut state = self.state.lock().await;
        state.record(SimOp::DeleteFloatingIp, id)?;
        let (_, project_id) =
            state
                .floating_ips
                .remove(id)
                .ok_or_else(|| CloudError::NotFound {
                    resource: "floating ip",
                    id: id.to_string(),
                })?;
        charge(&mut state.quota_mut(&project_id)?.floating_ip, -1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, networks: NetworkSelection) -> ServerSpec {
        ServerSpec {
            name: name.into(),
            flavor_id: "C2R2048D10drbd".into(),
            image_id: "image-debian".into(),
            project_id: SIM_PROJECT_ID.into(),
            personality: Vec::new(),
            networks,
        }
    }

    #[tokio::test]
    async fn server_lifecycle_updates_quota() {
        let cloud = SimCloud::new();
        let server = cloud
            .create_server(&spec("c-2", NetworkSelection::Isolated))
            .await
            .unwrap();
        assert_eq!(server.status, ResourceStatus::Build);
        assert!(server.admin_pass.is_some());
        assert_eq!(cloud.quota().await.cpu.usage, 2);

        let status = cloud
            .wait_server(&server.id, ResourceStatus::Build, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(status, ResourceStatus::Active);

        cloud.delete_server(&server.id).await.unwrap();
        assert_eq!(cloud.quota().await.cpu.usage, 0);
        assert!(cloud.live_servers().await.is_empty());
        let tombstone = cloud.get_server_details(&server.id).await.unwrap();
        assert_eq!(tombstone.status, ResourceStatus::Deleted);
    }

    #[tokio::test]
    async fn default_selection_consumes_free_floating_ip() {
        let cloud = SimCloud::new();
        let err = cloud
            .create_server(&spec("c-1", NetworkSelection::Default))
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::Rejected(_)));
        assert_eq!(cloud.quota().await.vm.usage, 0);

        let ip = cloud.allocate_floating_ip().await;
        let master = cloud
            .create_server(&spec("c-1", NetworkSelection::Default))
            .await
            .unwrap();
        let ips = cloud.floating_ips().await;
        assert_eq!(ips[0].instance_id.as_deref(), Some(master.id.as_str()));
        assert_eq!(master.attachments[0].ipv4.as_deref(), Some(ip.address.as_str()));
    }

    #[tokio::test]
    async fn injected_fault_hits_only_the_nth_call() {
        let cloud = SimCloud::new();
        cloud.fail_nth(SimOp::CreateServer, 2).await;
        assert!(cloud.create_server(&spec("c-2", NetworkSelection::Isolated)).await.is_ok());
        assert!(cloud.create_server(&spec("c-3", NetworkSelection::Isolated)).await.is_err());
        assert!(cloud.create_server(&spec("c-4", NetworkSelection::Isolated)).await.is_ok());
        assert_eq!(cloud.count(SimOp::CreateServer).await, 3);
        assert_eq!(cloud.live_servers().await.len(), 2);
    }

    #[tokio::test]
    async fn building_server_cannot_be_deleted() {
        let cloud = SimCloud::new();
        cloud.set_wait_outcome("c-2", ResourceStatus::Build).await;
        let server = cloud
            .create_server(&spec("c-2", NetworkSelection::Isolated))
            .await
            .unwrap();

        let err = cloud.delete_server(&server.id).await.unwrap_err();
        assert!(matches!(err, CloudError::Rejected(_)));

        let wait = Duration::from_secs(1);
        let first = cloud
            .wait_server(&server.id, ResourceStatus::Build, wait)
            .await
            .unwrap();
        assert_eq!(first, ResourceStatus::Build);
        let second = cloud
            .wait_server(&server.id, ResourceStatus::Build, wait)
            .await
            .unwrap();
        assert_eq!(second, ResourceStatus::Active);
        cloud.delete_server(&server.id).await.unwrap();
        assert!(cloud.live_servers().await.is_empty());
    }

    #[tokio::test]
    async fn limits_are_set_in_request_units() {
        let cloud = SimCloud::new();
        cloud.set_limit(ResourceKind::Ram, 2048).await;
        let quota = cloud.quota().await;
        assert_eq!(quota.headroom(ResourceKind::Ram), 2048);
    }
}
