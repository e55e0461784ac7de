use crate::error::StorageError;
use crate::traits::*;
use async_trait::async_trait;
use chrono::Utc;
use orka_models::{
    ClusterFilter, ClusterId, ClusterRecord, ClusterStatus, NewCluster,
    ServiceStatus,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct MemoryClusterStore {
    store: Arc<RwLock<BTreeMap<ClusterId, ClusterRecord>>>,
    next_id: Arc<AtomicU64>,
}

impl MemoryClusterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dumps every record as pretty JSON, ordered by id.
    pub async fn snapshot_json(&self) -> StorageResult<String> {
        let store = self.store.read().await;
        let records: Vec<&ClusterRecord> = store.values().collect();
        Ok(serde_json::to_string_pretty(&records)?)
    }
}

#[async_trait]
impl ClusterStore for MemoryClusterStore {
    async fn create_cluster(
        &self,
        cluster: &NewCluster,
    ) -> StorageResult<ClusterRecord> {
        let mut store = self.store.write().await;
        if store.values().any(|r| {
            r.name == cluster.name
                && r.owner == cluster.owner
                && !matches!(
                    r.status,
                    ClusterStatus::Destroyed | ClusterStatus::Failed
                )
        }) {
            return Err(StorageError::AlreadyExists(cluster.name.clone()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        let record = ClusterRecord {
            id,
            name: cluster.name.clone(),
            size: cluster.size,
            master: cluster.master,
            slave: cluster.slave,
            disk_template: cluster.disk_template.clone(),
            os_image: cluster.os_image.clone(),
            owner: cluster.owner.clone(),
            project_name: cluster.project_name.clone(),
            master_ip: None,
            status: ClusterStatus::Pending,
            service_status: ServiceStatus::Pending,
            pending_slaves: 0,
            state: cluster.state.clone(),
            error: None,
            created_at: now,
            updated_at: now,
        };
        store.insert(id, record.clone());
        tracing::debug!(cluster_id = id, name = %record.name, "stored new cluster");
        Ok(record)
    }

    async fn get_cluster(
        &self,
        id: ClusterId,
    ) -> StorageResult<Option<ClusterRecord>> {
        let store = self.store.read().await;
        Ok(store.get(&id).cloned())
    }

    async fn update_cluster(&self, record: &ClusterRecord) -> StorageResult<()> {
        let mut store = self.store.write().await;
        match store.get_mut(&record.id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(StorageError::NotFound(record.id)),
        }
    }

    async fn list_clusters(
        &self,
        filter: ClusterFilter,
    ) -> StorageResult<Vec<ClusterRecord>> {
        let store = self.store.read().await;
        Ok(store
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect())
    }

    async fn pending_clusters(
        &self,
        owner: &str,
        project_name: &str,
    ) -> StorageResult<Vec<ClusterRecord>> {
        let store = self.store.read().await;
        Ok(store
            .values()
            .filter(|r| r.owner == owner && r.project_name == project_name)
            .filter(|r| {
                r.status == ClusterStatus::Pending
                    || (r.pending_slaves > 0
                        && r.status != ClusterStatus::Destroyed)
            })
            .cloned()
            .collect())
    }
}
