use crate::handoff::RunnerAction;
use orka_models::{ClusterId, ClusterStatus, ResourceKind, ResourceStatus};
use std::fmt;
use thiserror::Error;

/// Protocol step at which a remote operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Authenticate,
    Quota,
    Lookup,
    Network,
    FloatingIp,
    ServerCreate,
    ServerWait,
    Subnet,
    Port,
    PortWait,
    Handoff,
    Decommission,
    ServerDelete,
    NetworkDelete,
    FloatingIpDelete,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Authenticate => "authenticate",
            Stage::Quota => "quota",
            Stage::Lookup => "lookup",
            Stage::Network => "network",
            Stage::FloatingIp => "floating_ip",
            Stage::ServerCreate => "server_create",
            Stage::ServerWait => "server_wait",
            Stage::Subnet => "subnet",
            Stage::Port => "port",
            Stage::PortWait => "port_wait",
            Stage::Handoff => "handoff",
            Stage::Decommission => "decommission",
            Stage::ServerDelete => "server_delete",
            Stage::NetworkDelete => "network_delete",
            Stage::FloatingIpDelete => "floating_ip_delete",
        };
        f.write_str(s)
    }
}

/// Lookup targets that can be missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingResource {
    Project,
    Flavor,
    Image,
    Network,
    FloatingIp,
    Server,
    KeyMaterial,
}

impl fmt::Display for MissingResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MissingResource::Project => "project",
            MissingResource::Flavor => "flavor",
            MissingResource::Image => "image",
            MissingResource::Network => "network",
            MissingResource::FloatingIp => "floating_ip",
            MissingResource::Server => "server",
            MissingResource::KeyMaterial => "key_material",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] orka_models::ValidationError),

    #[error("Invalid scale request: {0}")]
    InvalidScale(String),

    #[error(
        "Quota exceeded for {kind}: requested {requested}, available {available}"
    )]
    QuotaDenied {
        kind: ResourceKind,
        requested: i64,
        available: i64,
    },

    #[error("No {kind} found for '{name}'")]
    ResourceNotFound { kind: MissingResource, name: String },

    #[error("Project {0} has no quota entry")]
    ProjectQuotaMissing(String),

    #[error("Remote operation failed at {stage}: {reason}")]
    RemoteOperationFailed { stage: Stage, reason: String },

    #[error("Timed out waiting for {resource} to become {expected}")]
    TimeoutWaitingForStatus {
        resource: String,
        expected: ResourceStatus,
    },

    #[error("Cluster corrupt: {0}")]
    ClusterCorrupt(String),

    #[error("Cluster not found: {0}")]
    ClusterNotFound(ClusterId),

    #[error("Cluster {0} is busy with another operation")]
    ClusterBusy(ClusterId),

    #[error("Cluster {id} is {status}, expected Active")]
    ClusterNotReady { id: ClusterId, status: ClusterStatus },

    #[error("Configuration hand-off failed: {0}")]
    Handoff(#[from] HandoffError),

    #[error("Cluster destroyed with {} error(s), first: {first}", .all.len())]
    TeardownIncomplete {
        first: Box<OrchestratorError>,
        all: Vec<String>,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] orka_cp_storage::StorageError),

    #[error("Cloud error: {0}")]
    Cloud(#[from] CloudError),
}

impl OrchestratorError {
    pub fn remote(stage: Stage, reason: impl fmt::Display) -> Self {
        OrchestratorError::RemoteOperationFailed {
            stage,
            reason: reason.to_string(),
        }
    }

    pub fn not_found(kind: MissingResource, name: impl Into<String>) -> Self {
        OrchestratorError::ResourceNotFound {
            kind,
            name: name.into(),
        }
    }

    /// Resource kind for quota denials.
    pub fn resource_kind(&self) -> Option<ResourceKind> {
        match self {
            OrchestratorError::QuotaDenied { kind, .. } => Some(*kind),
            OrchestratorError::TeardownIncomplete { first, .. } => {
                first.resource_kind()
            }
            _ => None,
        }
    }

    /// Protocol stage for remote and hand-off failures.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            OrchestratorError::RemoteOperationFailed { stage, .. } => {
                Some(*stage)
            }
            OrchestratorError::Handoff(_) => Some(Stage::Handoff),
            OrchestratorError::Cloud(CloudError::Unauthorized(_)) => {
                Some(Stage::Authenticate)
            }
            OrchestratorError::TeardownIncomplete { first, .. } => first.stage(),
            _ => None,
        }
    }

    /// Whether the failure happened before any remote mutation.
    pub fn is_admission_failure(&self) -> bool {
        matches!(
            self,
            OrchestratorError::InvalidRequest(_)
                | OrchestratorError::QuotaDenied { .. }
                | OrchestratorError::ProjectQuotaMissing(_)
                | OrchestratorError::ResourceNotFound {
                    kind: MissingResource::Project
                        | MissingResource::Flavor
                        | MissingResource::Image
                        | MissingResource::KeyMaterial,
                    ..
                }
        )
    }
}

/// Failures reported by a cloud control-plane session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CloudError {
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Control plane unavailable: {0}")]
    Unavailable(String),
}

/// Failures of the configuration runner or the SSH rerouter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandoffError {
    #[error("Inventory update failed: {0}")]
    Inventory(String),

    #[error("Runner action {action} failed: {reason}")]
    RunFailed { action: RunnerAction, reason: String },

    #[error("SSH reroute for {node} failed: {reason}")]
    Reroute { node: String, reason: String },
}

#[derive(Error, Debug)]
#[error("State sink unavailable: {0}")]
pub struct ReporterError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_denial_exposes_kind() {
        let err = OrchestratorError::QuotaDenied {
            kind: ResourceKind::Cpu,
            requested: 6,
            available: 3,
        };
        assert_eq!(err.resource_kind(), Some(ResourceKind::Cpu));
        assert!(err.is_admission_failure());
        assert_eq!(
            err.to_string(),
            "Quota exceeded for cpu: requested 6, available 3"
        );
    }

    #[test]
    fn teardown_reports_first_stage() {
        let err = OrchestratorError::TeardownIncomplete {
            first: Box::new(OrchestratorError::remote(
                Stage::NetworkDelete,
                "in use",
            )),
            all: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.stage(), Some(Stage::NetworkDelete));
        assert!(err.to_string().starts_with("Cluster destroyed with 2 error(s)"));
    }

    #[test]
    fn handoff_maps_to_handoff_stage() {
        let err: OrchestratorError =
            HandoffError::Inventory("locked".into()).into();
        assert_eq!(err.stage(), Some(Stage::Handoff));
        assert!(!err.is_admission_failure());
    }
}
