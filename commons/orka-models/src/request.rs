use crate::enums::DiskTemplate;
use crate::quota::ResourceDemand;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Sizing of one VM role. RAM is in MB, disk in GB.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct FlavorSpec {
    #[validate(range(min = 1, message = "CPU count must be at least 1"))]
    pub cpus: u32,
    #[validate(range(min = 1, message = "RAM must be at least 1 MB"))]
    pub ram_mb: u64,
    #[validate(range(min = 5, message = "Disk must be at least 5 GB"))]
    pub disk_gb: u64,
}

/// Immutable input of a create-cluster orchestration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct ClusterRequest {
    /// Name prefix. The persisted name may be timestamped.
    #[validate(length(min = 1, message = "Cluster name cannot be empty"))]
    pub name: String,
    #[validate(range(min = 2, message = "Cluster size must be at least 2"))]
    pub cluster_size: u32,
    #[validate(nested)]
    pub master: FlavorSpec,
    #[validate(nested)]
    pub slave: FlavorSpec,
    pub disk_template: DiskTemplate,
    #[validate(length(min = 1, message = "OS image cannot be empty"))]
    pub os_image: String,
    #[validate(length(min = 1, message = "Project name cannot be empty"))]
    pub project_name: String,
    /// Owner credential used to authenticate against the cloud.
    #[serde(skip_serializing, default)]
    pub token: String,
}

impl ClusterRequest {
    pub fn slave_count(&self) -> u32 {
        self.cluster_size.saturating_sub(1)
    }

    /// Total quota the cluster consumes once fully provisioned.
    pub fn demand(&self) -> ResourceDemand {
        ResourceDemand::for_cluster(
            self.cluster_size,
            &self.master,
            &self.slave,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    fn request() -> ClusterRequest {
        ClusterRequest {
            name: "analytics".into(),
            cluster_size: 3,
            master: FlavorSpec {
                cpus: 4,
                ram_mb: 4096,
                disk_gb: 20,
            },
            slave: FlavorSpec {
                cpus: 2,
                ram_mb: 2048,
                disk_gb: 10,
            },
            disk_template: DiskTemplate::ExtVlmc,
            os_image: "Debian Base".into(),
            project_name: "escience".into(),
            token: "secret".into(),
        }
    }

    #[test]
    fn demand_sums_master_and_slaves() {
        let d = request().demand();
        assert_eq!(d.vms, 3);
        assert_eq!(d.cpus, 4 + 2 * 2);
        assert_eq!(d.ram_mb, 4096 + 2048 * 2);
        assert_eq!(d.disk_gb, 20 + 10 * 2);
        assert_eq!(d.networks, 1);
        assert_eq!(d.floating_ips, 1);
    }

    #[test]
    fn single_node_cluster_is_rejected() {
        let mut req = request();
        req.cluster_size = 1;
        let errs = req.validate().unwrap_err();
        assert!(errs.field_errors().contains_key("cluster_size"));
    }

    #[test]
    fn small_disk_is_rejected_through_nested_flavor() {
        let mut req = request();
        req.slave.disk_gb = 4;
        assert!(req.validate().is_err());
    }

    #[test]
    fn token_is_not_serialized() {
        let json = serde_json::to_value(request()).unwrap();
        assert!(json.get("token").is_none());
        assert_eq!(json["disk_template"], "ext_vlmc");
    }
}
