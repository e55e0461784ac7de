use crate::cloud::CloudSession;
use crate::errors::{MissingResource, OrchestratorError, Stage};
use orka_cp_storage::ClusterStore;
use orka_models::{PendingReservation, Project, QuotaSnapshot, ResourceKind};
use std::sync::Arc;
use tracing::debug;

/// Committed quota combined with the local pending reservation.
#[derive(Debug, Clone, Default)]
pub struct Availability {
    pub snapshot: QuotaSnapshot,
    pub pending: PendingReservation,
    /// Floating IPs already allocated but not attached to any server.
    pub unattached_ips: i64,
}

impl Availability {
    /// Amount of `kind` still admissible, in request units.
    pub fn available(&self, kind: ResourceKind) -> i64 {
        let base = self.snapshot.headroom(kind) - self.pending.get(kind);
        match kind {
            ResourceKind::FloatingIp => base + self.unattached_ips,
            _ => base,
        }
    }
}

/// Reads committed usage from the cloud and pending reservations from the
/// cluster store.
#[derive(Clone)]
pub struct QuotaLedger {
    store: Arc<dyn ClusterStore>,
}

impl QuotaLedger {
    pub fn new(store: Arc<dyn ClusterStore>) -> Self {
        Self { store }
    }

    pub async fn availability(
        &self,
        session: &dyn CloudSession,
        project: &Project,
    ) -> Result<Availability, OrchestratorError> {
        let quotas = session
            .get_quotas()
            .await
            .map_err(|e| OrchestratorError::remote(Stage::Quota, e))?;
        let snapshot = quotas
            .get(&project.id)
            .cloned()
            .ok_or_else(|| OrchestratorError::ProjectQuotaMissing(project.name.clone()))?;
        let records = self
            .store
            .pending_clusters(session.user_id(), &project.name)
            .await?;
        let pending = PendingReservation::from_records(&records);
        let unattached_ips = session
            .list_floating_ips()
            .await
            .map_err(|e| OrchestratorError::remote(Stage::FloatingIp, e))?
            .iter()
            .filter(|ip| ip.is_unattached())
            .count() as i64;
        debug!(
            project = %project.name,
            pending_clusters = pending.clusters,
            unattached_ips,
            "computed quota availability"
        );
        Ok(Availability {
            snapshot,
            pending,
            unattached_ips,
        })
    }
}

/// Finds the project the session's owner may use by name.
pub async fn resolve_project(
    session: &dyn CloudSession,
    name: &str,
) -> Result<Project, OrchestratorError> {
    let projects = session
        .list_projects()
        .await
        .map_err(|e| OrchestratorError::remote(Stage::Quota, e))?;
    projects
        .into_iter()
        .find(|p| p.name == name)
        .ok_or_else(|| OrchestratorError::not_found(MissingResource::Project, name))
}
