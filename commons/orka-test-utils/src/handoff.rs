//! Scripted stand-ins for the configuration runner and the SSH rerouter.

use async_trait::async_trait;
use orka_orchestrator::errors::HandoffError;
use orka_orchestrator::handoff::{
    ConfigRunner, Inventory, InventoryChange, RerouteTarget, RunnerAction,
    SshRerouter,
};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

/// Short name of an inventory change, used to script failures.
pub fn change_name(change: &InventoryChange) -> &'static str {
    match change {
        InventoryChange::Create { .. } => "create",
        InventoryChange::AddSlaves(_) => "add_slaves",
        InventoryChange::RemoveSlave { .. } => "remove_slave",
        InventoryChange::JoinSlaves => "join_slaves",
    }
}

/// Short name of a runner action, without its arguments.
pub fn action_name(action: &RunnerAction) -> &'static str {
    match action {
        RunnerAction::Install => "install",
        RunnerAction::AddNodes { .. } => "add_nodes",
        RunnerAction::RemoveNode { .. } => "remove_node",
        RunnerAction::RollbackScale => "rollback_scale",
        RunnerAction::Start => "start",
        RunnerAction::Stop => "stop",
    }
}

#[derive(Debug, Default)]
struct RunnerState {
    inventories: HashMap<String, Inventory>,
    staged: HashMap<String, Inventory>,
    changes: Vec<(String, InventoryChange)>,
    actions: Vec<RunnerAction>,
    failing_changes: HashSet<&'static str>,
    failing_actions: HashSet<&'static str>,
}

/// Keeps inventories in memory; newly added slaves stay staged until
/// they are joined.
#[derive(Default)]
pub struct ScriptedRunner {
    state: Mutex<RunnerState>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_change(&self, name: &'static str) {
        self.state.lock().await.failing_changes.insert(name);
    }

    pub async fn fail_action(&self, name: &'static str) {
        self.state.lock().await.failing_actions.insert(name);
    }

    pub async fn actions(&self) -> Vec<RunnerAction> {
        self.state.lock().await.actions.clone()
    }

    pub async fn changes(&self) -> Vec<InventoryChange> {
        self.state
            .lock()
            .await
            .changes
            .iter()
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub async fn inventory(&self, cluster_key: &str) -> Option<Inventory> {
        self.state.lock().await.inventories.get(cluster_key).cloned()
    }
}

fn with_staged(main: &Inventory, staged: Option<&Inventory>) -> Inventory {
    let mut merged = main.clone();
    if let Some(staged) = staged {
        merged.hosts.extend(staged.hosts.iter().cloned());
    }
    merged
}

#[async_trait]
impl ConfigRunner for ScriptedRunner {
    async fn load_inventory(&self, cluster_key: &str) -> Result<Inventory, HandoffError> {
        let state = self.state.lock().await;
        state
            .inventories
            .get(cluster_key)
            .map(|main| with_staged(main, state.staged.get(cluster_key)))
            .ok_or_else(|| HandoffError::Inventory(format!("no inventory for {cluster_key}")))
    }

    async fn modify_inventory(
        &self,
        cluster_key: &str,
        change: InventoryChange,
    ) -> Result<Inventory, HandoffError> {
        let mut state = self.state.lock().await;
        state.changes.push((cluster_key.to_string(), change.clone()));
        let name = change_name(&change);
        if state.failing_changes.contains(name) {
            return Err(HandoffError::Inventory(format!("{name} rejected")));
        }
        let state = &mut *state;
        match change {
            InventoryChange::Create { master_ip, hosts } => {
                state.inventories.insert(
                    cluster_key.to_string(),
                    Inventory {
                        cluster_key: cluster_key.to_string(),
                        master_ip,
                        hosts,
                    },
                );
                state.staged.remove(cluster_key);
            }
            InventoryChange::AddSlaves(hosts) => {
                let staged = state.staged.entry(cluster_key.to_string()).or_default();
                staged.cluster_key = cluster_key.to_string();
                staged.hosts.extend(hosts);
            }
            InventoryChange::RemoveSlave { hostname } => {
                if let Some(main) = state.inventories.get_mut(cluster_key) {
                    main.hosts.retain(|h| h.hostname != hostname);
                }
                if let Some(staged) = state.staged.get_mut(cluster_key) {
                    staged.hosts.retain(|h| h.hostname != hostname);
                }
            }
            InventoryChange::JoinSlaves => {
                if let (Some(staged), Some(main)) = (
                    state.staged.remove(cluster_key),
                    state.inventories.get_mut(cluster_key),
                ) {
                    main.hosts.extend(staged.hosts);
                }
            }
        }
        let main = state
            .inventories
            .get(cluster_key)
            .ok_or_else(|| HandoffError::Inventory(format!("no inventory for {cluster_key}")))?;
        Ok(with_staged(main, state.staged.get(cluster_key)))
    }

    async fn run(
        &self,
        _inventory: &Inventory,
        action: RunnerAction,
    ) -> Result<(), HandoffError> {
        let mut state = self.state.lock().await;
        state.actions.push(action.clone());
        if state.failing_actions.contains(action_name(&action)) {
            return Err(HandoffError::RunFailed {
                action,
                reason: "scripted failure".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct RerouterState {
    targets: Vec<RerouteTarget>,
    fail_all: bool,
}

#[derive(Default)]
pub struct ScriptedRerouter {
    state: Mutex<RerouterState>,
}

impl ScriptedRerouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_all(&self) {
        self.state.lock().await.fail_all = true;
    }

    pub async fn targets(&self) -> Vec<RerouteTarget> {
        self.state.lock().await.targets.clone()
    }
}

#[async_trait]
impl SshRerouter for ScriptedRerouter {
    async fn reroute(
        &self,
        node: &RerouteTarget,
        _master_ip: &str,
    ) -> Result<(), HandoffError> {
        let mut state = self.state.lock().await;
        state.targets.push(node.clone());
        if state.fail_all {
            return Err(HandoffError::Reroute {
                node: node.hostname.clone(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orka_models::VmRole;
    use orka_orchestrator::handoff::InventoryHost;

    fn host(name: &str, role: VmRole) -> InventoryHost {
        InventoryHost {
            hostname: name.into(),
            private_ip: "192.168.0.2".into(),
            ssh_port: 22,
            role,
        }
    }

    #[tokio::test]
    async fn staged_slaves_join_the_main_group() {
        let runner = ScriptedRunner::new();
        runner
            .modify_inventory(
                "c-1",
                InventoryChange::Create {
                    master_ip: "83.212.0.1".into(),
                    hosts: vec![host("m", VmRole::Master)],
                },
            )
            .await
            .unwrap();
        let staged = runner
            .modify_inventory("c-1", InventoryChange::AddSlaves(vec![host("s", VmRole::Slave)]))
            .await
            .unwrap();
        assert_eq!(staged.hosts.len(), 2);
        assert_eq!(runner.inventory("c-1").await.unwrap().hosts.len(), 1);

        runner.modify_inventory("c-1", InventoryChange::JoinSlaves).await.unwrap();
        assert_eq!(runner.inventory("c-1").await.unwrap().slaves().count(), 1);
    }
}
