use crate::error::StorageError;
use async_trait::async_trait;
use orka_models::{ClusterFilter, ClusterId, ClusterRecord, NewCluster};

pub type StorageResult<T> = Result<T, StorageError>;

/// Persistent store of cluster records.
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Inserts a new record with status `Pending` and returns it with its
    /// assigned id.
    async fn create_cluster(
        &self,
        cluster: &NewCluster,
    ) -> StorageResult<ClusterRecord>;

    async fn get_cluster(
        &self,
        id: ClusterId,
    ) -> StorageResult<Option<ClusterRecord>>;

    /// Replaces a stored record. Fails with `NotFound` for unknown ids.
    async fn update_cluster(&self, record: &ClusterRecord) -> StorageResult<()>;

    async fn list_clusters(
        &self,
        filter: ClusterFilter,
    ) -> StorageResult<Vec<ClusterRecord>>;

    /// Records of (owner, project) that still hold a quota reservation:
    /// `Pending` clusters and clusters with slaves reserved by a scale-up.
    async fn pending_clusters(
        &self,
        owner: &str,
        project_name: &str,
    ) -> StorageResult<Vec<ClusterRecord>>;
}
