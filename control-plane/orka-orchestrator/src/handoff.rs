//! Seams to the configuration-management runner and SSH rerouting.

use crate::errors::HandoffError;
use async_trait::async_trait;
use orka_models::VmRole;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryHost {
    pub hostname: String,
    pub private_ip: String,
    pub ssh_port: u32,
    pub role: VmRole,
}

/// Hosts the runner addresses for one cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub cluster_key: String,
    pub master_ip: String,
    pub hosts: Vec<InventoryHost>,
}

impl Inventory {
    pub fn slaves(&self) -> impl Iterator<Item = &InventoryHost> {
        self.hosts.iter().filter(|h| h.role == VmRole::Slave)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryChange {
    Create {
        master_ip: String,
        hosts: Vec<InventoryHost>,
    },
    AddSlaves(Vec<InventoryHost>),
    RemoveSlave { hostname: String },
    /// Folds staged slaves into the main host group.
    JoinSlaves,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerAction {
    Install,
    AddNodes { count: usize },
    RemoveNode { hostname: String },
    RollbackScale,
    Start,
    Stop,
}

impl fmt::Display for RunnerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerAction::Install => f.write_str("install"),
            RunnerAction::AddNodes { count } => write!(f, "add_nodes({count})"),
            RunnerAction::RemoveNode { hostname } => {
                write!(f, "remove_node({hostname})")
            }
            RunnerAction::RollbackScale => f.write_str("rollback_scale"),
            RunnerAction::Start => f.write_str("start"),
            RunnerAction::Stop => f.write_str("stop"),
        }
    }
}

/// Opaque configuration-management engine. Actions are idempotent and
/// report pass/fail only.
#[async_trait]
pub trait ConfigRunner: Send + Sync {
    async fn load_inventory(
        &self,
        cluster_key: &str,
    ) -> Result<Inventory, HandoffError>;

    async fn modify_inventory(
        &self,
        cluster_key: &str,
        change: InventoryChange,
    ) -> Result<Inventory, HandoffError>;

    async fn run(
        &self,
        inventory: &Inventory,
        action: RunnerAction,
    ) -> Result<(), HandoffError>;
}

/// Connection parameters of a node reachable only through the master.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RerouteTarget {
    pub hostname: String,
    pub private_ip: String,
    pub ssh_port: u32,
    pub admin_pass: Option<String>,
}

#[async_trait]
pub trait SshRerouter: Send + Sync {
    async fn reroute(
        &self,
        node: &RerouteTarget,
        master_ip: &str,
    ) -> Result<(), HandoffError>;
}

/// Inventory key of a cluster, unique across recreated names.
pub fn cluster_key(name: &str, id: u64) -> String {
    format!("{name}-{id}")
}
