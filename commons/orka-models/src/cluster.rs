use crate::enums::{ClusterStatus, DiskTemplate, ServiceStatus};
use crate::request::{ClusterRequest, FlavorSpec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ClusterId = u64;

/// Persistent cluster entity. Owned by the orchestrator; other layers only
/// read it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterRecord {
    pub id: ClusterId,
    pub name: String,
    pub size: u32,
    pub master: FlavorSpec,
    pub slave: FlavorSpec,
    pub disk_template: DiskTemplate,
    pub os_image: String,
    pub owner: String,
    pub project_name: String,
    pub master_ip: Option<String>,
    #[serde(default)]
    pub status: ClusterStatus,
    #[serde(default)]
    pub service_status: ServiceStatus,
    /// Slaves reserved by an in-flight scale-up but not yet counted in `size`.
    #[serde(default)]
    pub pending_slaves: u32,
    #[serde(default)]
    pub state: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ClusterRecord {
    pub fn is_destroyed(&self) -> bool {
        self.status == ClusterStatus::Destroyed
    }

    pub fn set_status(&mut self, status: ClusterStatus, state: impl Into<String>) {
        self.status = status;
        self.state = state.into();
        self.updated_at = Utc::now();
    }

    pub fn fail(&mut self, status: ClusterStatus, error: impl Into<String>) {
        let error = error.into();
        self.status = status;
        self.state = error.clone();
        self.error = Some(error);
        self.updated_at = Utc::now();
    }
}

/// Insert payload for a new record. Status starts at `Pending`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewCluster {
    pub name: String,
    pub size: u32,
    pub master: FlavorSpec,
    pub slave: FlavorSpec,
    pub disk_template: DiskTemplate,
    pub os_image: String,
    pub owner: String,
    pub project_name: String,
    pub state: String,
}

impl NewCluster {
    pub fn from_request(
        request: &ClusterRequest,
        name: String,
        owner: &str,
    ) -> Self {
        Self {
            name,
            size: request.cluster_size,
            master: request.master,
            slave: request.slave,
            disk_template: request.disk_template.clone(),
            os_image: request.os_image.clone(),
            owner: owner.to_string(),
            project_name: request.project_name.clone(),
            state: "Authenticated".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterFilter {
    pub owner: Option<String>,
    pub project_name: Option<String>,
    pub status: Option<ClusterStatus>,
}

impl ClusterFilter {
    pub fn matches(&self, record: &ClusterRecord) -> bool {
        if let Some(owner) = &self.owner {
            if &record.owner != owner {
                return false;
            }
        }
        if let Some(project) = &self.project_name {
            if &record.project_name != project {
                return false;
            }
        }
        if let Some(status) = &self.status {
            if &record.status != status {
                return false;
            }
        }
        true
    }
}
