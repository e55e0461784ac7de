use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a cluster record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ClusterStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "DESTROYED")]
    Destroyed,
}

impl Default for ClusterStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl ClusterStatus {
    /// Pending is the only non-terminal status; it holds a quota reservation.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ClusterStatus::Pending)
    }
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClusterStatus::Pending => "Pending",
            ClusterStatus::Active => "Active",
            ClusterStatus::Failed => "Failed",
            ClusterStatus::Destroyed => "Destroyed",
        };
        f.write_str(s)
    }
}

/// Status of the managed service installed on top of the cluster.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ServiceStatus {
    #[serde(rename = "STOPPED")]
    Stopped,
    #[serde(rename = "STARTED")]
    Started,
    #[serde(rename = "PENDING")]
    Pending,
}

impl Default for ServiceStatus {
    fn default() -> Self {
        Self::Pending
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VmRole {
    #[serde(rename = "master")]
    Master,
    #[serde(rename = "slave")]
    Slave,
}

/// Build/run state reported by the cloud control plane for servers and ports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceStatus {
    Build,
    Active,
    Down,
    Stopped,
    Deleted,
    Error,
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceStatus::Build => "BUILD",
            ResourceStatus::Active => "ACTIVE",
            ResourceStatus::Down => "DOWN",
            ResourceStatus::Stopped => "STOPPED",
            ResourceStatus::Deleted => "DELETED",
            ResourceStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DiskTemplate {
    #[serde(rename = "drbd")]
    Drbd,
    #[serde(rename = "ext_vlmc")]
    ExtVlmc,
}

impl DiskTemplate {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiskTemplate::Drbd => "drbd",
            DiskTemplate::ExtVlmc => "ext_vlmc",
        }
    }
}

impl fmt::Display for DiskTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quota-tracked resource kinds, in admission order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    ClusterSize,
    Network,
    FloatingIp,
    Cpu,
    Ram,
    Disk,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::ClusterSize,
        ResourceKind::Network,
        ResourceKind::FloatingIp,
        ResourceKind::Cpu,
        ResourceKind::Ram,
        ResourceKind::Disk,
    ];

    pub fn unit(&self) -> &'static str {
        match self {
            ResourceKind::ClusterSize => "VMs",
            ResourceKind::Network => "private networks",
            ResourceKind::FloatingIp => "floating IPs",
            ResourceKind::Cpu => "vCPUs",
            ResourceKind::Ram => "MB RAM",
            ResourceKind::Disk => "GB disk",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::ClusterSize => "cluster_size",
            ResourceKind::Network => "network",
            ResourceKind::FloatingIp => "floating_ip",
            ResourceKind::Cpu => "cpu",
            ResourceKind::Ram => "ram",
            ResourceKind::Disk => "disk",
        };
        f.write_str(s)
    }
}
