use crate::cluster::ClusterRecord;
use crate::enums::{ClusterStatus, ResourceKind};
use crate::request::FlavorSpec;
use serde::{Deserialize, Serialize};

pub const BYTES_PER_MB: i64 = 1024 * 1024;
pub const BYTES_PER_GB: i64 = 1024 * 1024 * 1024;

/// One quota line as reported by the cloud control plane.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuotaEntry {
    pub limit: i64,
    pub usage: i64,
    pub project_limit: i64,
    pub project_usage: i64,
}

impl QuotaEntry {
    pub fn new(limit: i64, usage: i64) -> Self {
        Self {
            limit,
            usage,
            project_limit: limit,
            project_usage: usage,
        }
    }

    /// Headroom left for this user, bounded by the project-wide headroom.
    pub fn headroom(&self) -> i64 {
        (self.limit - self.usage).min(self.project_limit - self.project_usage)
    }
}

/// Committed quota of a project. RAM and disk entries are in bytes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuotaSnapshot {
    pub vm: QuotaEntry,
    pub cpu: QuotaEntry,
    pub ram: QuotaEntry,
    pub disk: QuotaEntry,
    pub network: QuotaEntry,
    pub floating_ip: QuotaEntry,
}

impl QuotaSnapshot {
    pub fn entry(&self, kind: ResourceKind) -> &QuotaEntry {
        match kind {
            ResourceKind::ClusterSize => &self.vm,
            ResourceKind::Network => &self.network,
            ResourceKind::FloatingIp => &self.floating_ip,
            ResourceKind::Cpu => &self.cpu,
            ResourceKind::Ram => &self.ram,
            ResourceKind::Disk => &self.disk,
        }
    }

    /// Headroom in request units: RAM in MB, disk in GB.
    pub fn headroom(&self, kind: ResourceKind) -> i64 {
        let raw = self.entry(kind).headroom();
        match kind {
            ResourceKind::Ram => raw / BYTES_PER_MB,
            ResourceKind::Disk => raw / BYTES_PER_GB,
            _ => raw,
        }
    }
}

/// Amount of each resource kind, in request units.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceDemand {
    pub vms: i64,
    pub cpus: i64,
    pub ram_mb: i64,
    pub disk_gb: i64,
    pub networks: i64,
    pub floating_ips: i64,
}

impl ResourceDemand {
    /// A whole cluster: one master, `size - 1` slaves, one private network
    /// and one floating IP.
    pub fn for_cluster(size: u32, master: &FlavorSpec, slave: &FlavorSpec) -> Self {
        let slaves = size.saturating_sub(1) as i64;
        Self {
            vms: size as i64,
            cpus: master.cpus as i64 + slave.cpus as i64 * slaves,
            ram_mb: master.ram_mb as i64 + slave.ram_mb as i64 * slaves,
            disk_gb: master.disk_gb as i64 + slave.disk_gb as i64 * slaves,
            networks: 1,
            floating_ips: 1,
        }
    }

    /// `count` extra slaves joining an existing network.
    pub fn for_slaves(count: u32, slave: &FlavorSpec) -> Self {
        let n = count as i64;
        Self {
            vms: n,
            cpus: slave.cpus as i64 * n,
            ram_mb: slave.ram_mb as i64 * n,
            disk_gb: slave.disk_gb as i64 * n,
            networks: 0,
            floating_ips: 0,
        }
    }

    pub fn get(&self, kind: ResourceKind) -> i64 {
        match kind {
            ResourceKind::ClusterSize => self.vms,
            ResourceKind::Network => self.networks,
            ResourceKind::FloatingIp => self.floating_ips,
            ResourceKind::Cpu => self.cpus,
            ResourceKind::Ram => self.ram_mb,
            ResourceKind::Disk => self.disk_gb,
        }
    }

    pub fn add(&mut self, other: &ResourceDemand) {
        self.vms += other.vms;
        self.cpus += other.cpus;
        self.ram_mb += other.ram_mb;
        self.disk_gb += other.disk_gb;
        self.networks += other.networks;
        self.floating_ips += other.floating_ips;
    }
}

/// Quota held by orchestrations the cloud has not yet counted as usage.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingReservation {
    pub reserved: ResourceDemand,
    pub clusters: usize,
}

impl PendingReservation {
    /// Sums the reservation held by each record: the whole cluster while it
    /// is `Pending`, plus any slaves a scale-up has registered but not yet
    /// folded into the cluster size.
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a ClusterRecord>,
    {
        let mut out = PendingReservation::default();
        for record in records {
            let mut counted = false;
            if record.status == ClusterStatus::Pending {
                out.reserved.add(&ResourceDemand::for_cluster(
                    record.size,
                    &record.master,
                    &record.slave,
                ));
                counted = true;
            }
            if record.pending_slaves > 0
                && record.status != ClusterStatus::Destroyed
            {
                out.reserved.add(&ResourceDemand::for_slaves(
                    record.pending_slaves,
                    &record.slave,
                ));
                counted = true;
            }
            if counted {
                out.clusters += 1;
            }
        }
        out
    }

    pub fn get(&self, kind: ResourceKind) -> i64 {
        self.reserved.get(kind)
    }
}
