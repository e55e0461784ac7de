//! In-process advisory locks for orchestrations.

use crate::errors::OrchestratorError;
use orka_models::ClusterId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockTable<K> = Arc<Mutex<HashMap<K, Arc<AsyncMutex<()>>>>>;

/// Per-cluster exclusion plus a per-(owner, project) admission gate.
///
/// A cluster guard is held for the whole orchestration; a second call on
/// the same cluster fails fast with `ClusterBusy`. The admission gate is
/// held only while availability is computed, checked, and the reservation
/// is persisted.
#[derive(Clone, Default)]
pub struct ClusterLocks {
    clusters: LockTable<ClusterId>,
    gates: LockTable<(String, String)>,
}

pub type ClusterGuard = OwnedMutexGuard<()>;
pub type AdmissionGuard = OwnedMutexGuard<()>;

/// Looks up the mutex for `key`. Entries only the table still references
/// are neither held nor awaited, so they are dropped on the way.
fn entry<K: std::hash::Hash + Eq>(
    table: &LockTable<K>,
    key: K,
) -> Arc<AsyncMutex<()>> {
    let mut map: MutexGuard<'_, _> =
        table.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    map.retain(|_, lock| Arc::strong_count(lock) > 1);
    map.entry(key).or_default().clone()
}

impl ClusterLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_lock(
        &self,
        id: ClusterId,
    ) -> Result<ClusterGuard, OrchestratorError> {
        entry(&self.clusters, id)
            .try_lock_owned()
            .map_err(|_| OrchestratorError::ClusterBusy(id))
    }

    pub async fn admission_gate(
        &self,
        owner: &str,
        project: &str,
    ) -> AdmissionGuard {
        entry(&self.gates, (owner.to_string(), project.to_string()))
            .lock_owned()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn second_lock_on_same_cluster_is_busy() {
        let locks = ClusterLocks::new();
        let guard = locks.try_lock(1).unwrap();
        assert!(matches!(
            locks.try_lock(1),
            Err(OrchestratorError::ClusterBusy(1))
        ));
        assert!(locks.try_lock(2).is_ok());
        drop(guard);
        assert!(locks.try_lock(1).is_ok());
    }

    fn tracked<K>(table: &LockTable<K>) -> usize {
        table.lock().unwrap().len()
    }

    #[tokio::test]
    async fn released_entries_are_pruned() {
        let locks = ClusterLocks::new();
        for id in 1..=50 {
            drop(locks.try_lock(id).unwrap());
        }
        let held = locks.try_lock(100).unwrap();
        assert_eq!(tracked(&locks.clusters), 1);

        drop(locks.admission_gate("u", "p").await);
        let _gate = locks.admission_gate("u", "q").await;
        assert_eq!(tracked(&locks.gates), 1);

        assert!(locks.try_lock(101).is_ok());
        assert_eq!(tracked(&locks.clusters), 2);
        assert!(matches!(
            locks.try_lock(100),
            Err(OrchestratorError::ClusterBusy(100))
        ));
        drop(held);
    }

    #[tokio::test]
    async fn admission_gate_serializes_same_project() {
        let locks = ClusterLocks::new();
        let held = locks.admission_gate("u", "p").await;
        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = other.admission_gate("u", "p").await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        let _different = locks.admission_gate("u", "q").await;
        drop(held);
        waiter.await.unwrap();
    }
}
