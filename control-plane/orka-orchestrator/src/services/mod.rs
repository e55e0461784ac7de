pub mod destroy;
pub mod personality;
pub mod provision;
pub mod scale;

pub use destroy::ClusterDestroyer;
pub use provision::{ClusterProvisioner, ProvisionPlan, ProvisionedCluster};
pub use scale::ClusterScaler;

use crate::cloud::{CloudSession, await_server_deleted};
use crate::errors::{MissingResource, OrchestratorError, Stage};
use orka_models::{
    ClusterId, DiskTemplate, Flavor, FlavorSpec, FloatingIp, Image,
    ResourceStatus, ServerDetails, VmHandle,
};
use serde::Serialize;
use std::time::Duration;

/// Result of a successful create.
#[derive(Debug, Clone, Serialize)]
pub struct CreateOutcome {
    pub cluster_id: ClusterId,
    pub cluster_name: String,
    pub master_ip: String,
    /// Root password of the master. Never logged.
    #[serde(skip_serializing)]
    pub master_password: Option<String>,
    pub vms: Vec<VmHandle>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScaleOutcome {
    pub cluster_id: ClusterId,
    pub cluster_name: String,
    pub previous_size: u32,
    pub new_size: u32,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Denial that stopped a scale-up early; nodes added before it stay.
    pub admission_stopped: Option<String>,
    /// The scale stands even when the restart failed.
    pub restart_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DestroyOutcome {
    Destroyed { cluster_name: String },
    AlreadyDestroyed { cluster_name: String },
}

impl DestroyOutcome {
    pub fn cluster_name(&self) -> &str {
        match self {
            DestroyOutcome::Destroyed { cluster_name }
            | DestroyOutcome::AlreadyDestroyed { cluster_name } => cluster_name,
        }
    }
}

/// Distinct sizing values of the flavors a user may instantiate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlavorCatalogue {
    pub cpus: Vec<u32>,
    pub ram_mb: Vec<u64>,
    pub disk_gb: Vec<u64>,
    pub disk_templates: Vec<String>,
}

impl FlavorCatalogue {
    pub fn from_flavors(flavors: &[Flavor]) -> Self {
        let creatable = flavors.iter().filter(|f| f.allow_create);
        let mut catalogue = FlavorCatalogue::default();
        for flavor in creatable {
            catalogue.cpus.push(flavor.vcpus);
            catalogue.ram_mb.push(flavor.ram_mb);
            catalogue.disk_gb.push(flavor.disk_gb);
            catalogue.disk_templates.push(flavor.disk_template.clone());
        }
        catalogue.cpus.sort_unstable();
        catalogue.cpus.dedup();
        catalogue.ram_mb.sort_unstable();
        catalogue.ram_mb.dedup();
        catalogue.disk_gb.sort_unstable();
        catalogue.disk_gb.dedup();
        catalogue.disk_templates.sort();
        catalogue.disk_templates.dedup();
        catalogue
    }
}

/// Deletes a server and waits for it to disappear. A server still building
/// is waited on first since the control plane refuses to delete it.
pub(crate) async fn delete_server_and_wait(
    session: &dyn CloudSession,
    id: &str,
    name: &str,
    max_wait: Duration,
) -> Result<(), OrchestratorError> {
    let details = session
        .get_server_details(id)
        .await
        .map_err(|e| OrchestratorError::remote(Stage::ServerDelete, e))?;
    let mut status = details.status;
    if status == ResourceStatus::Deleted {
        return Ok(());
    }
    if status == ResourceStatus::Build {
        status = session
            .wait_server(id, ResourceStatus::Build, max_wait)
            .await
            .map_err(|e| OrchestratorError::remote(Stage::ServerWait, e))?;
    }
    session
        .delete_server(id)
        .await
        .map_err(|e| OrchestratorError::remote(Stage::ServerDelete, format!("{name}: {e}")))?;
    await_server_deleted(session, id, name, status, max_wait).await
}

/// Finds the master server through the floating IP bound to it.
pub(crate) async fn locate_master(
    session: &dyn CloudSession,
    master_ip: &str,
) -> Result<(FloatingIp, ServerDetails), OrchestratorError> {
    let ip = session
        .list_floating_ips()
        .await
        .map_err(|e| OrchestratorError::remote(Stage::Lookup, e))?
        .into_iter()
        .find(|ip| ip.address == master_ip)
        .ok_or_else(|| {
            OrchestratorError::not_found(MissingResource::FloatingIp, master_ip)
        })?;
    let master_id = ip.instance_id.clone().ok_or_else(|| {
        OrchestratorError::not_found(MissingResource::Server, master_ip)
    })?;
    let master = session
        .get_server_details(&master_id)
        .await
        .map_err(|e| OrchestratorError::remote(Stage::Lookup, e))?;
    Ok((ip, master))
}

/// `<cluster>-<ordinal>`; the master is ordinal 1.
pub(crate) fn vm_name(cluster_name: &str, ordinal: u32) -> String {
    format!("{cluster_name}-{ordinal}")
}

pub(crate) fn resolve_flavor(
    flavors: &[Flavor],
    spec: &FlavorSpec,
    template: &DiskTemplate,
) -> Result<String, OrchestratorError> {
    flavors
        .iter()
        .find(|f| f.matches(spec, template))
        .map(|f| f.id.clone())
        .ok_or_else(|| {
            OrchestratorError::not_found(
                MissingResource::Flavor,
                format!(
                    "{} vCPU / {} MB / {} GB / {}",
                    spec.cpus, spec.ram_mb, spec.disk_gb, template
                ),
            )
        })
}

pub(crate) fn resolve_image(
    images: &[Image],
    name: &str,
) -> Result<String, OrchestratorError> {
    images
        .iter()
        .find(|i| i.name == name)
        .map(|i| i.id.clone())
        .ok_or_else(|| OrchestratorError::not_found(MissingResource::Image, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flavor(id: &str, vcpus: u32, ram: u64, disk: u64, tpl: &str) -> Flavor {
        Flavor {
            id: id.into(),
            name: id.into(),
            vcpus,
            ram_mb: ram,
            disk_gb: disk,
            disk_template: tpl.into(),
            allow_create: true,
        }
    }

    #[test]
    fn catalogue_is_sorted_and_distinct() {
        let mut hidden = flavor("x", 16, 65536, 500, "drbd");
        hidden.allow_create = false;
        let flavors = vec![
            flavor("a", 4, 4096, 20, "ext_vlmc"),
            flavor("b", 2, 2048, 10, "drbd"),
            flavor("c", 2, 4096, 10, "drbd"),
            hidden,
        ];
        let catalogue = FlavorCatalogue::from_flavors(&flavors);
        assert_eq!(catalogue.cpus, vec![2, 4]);
        assert_eq!(catalogue.ram_mb, vec![2048, 4096]);
        assert_eq!(catalogue.disk_gb, vec![10, 20]);
        assert_eq!(catalogue.disk_templates, vec!["drbd", "ext_vlmc"]);
    }

    #[test]
    fn missing_flavor_is_resource_not_found() {
        let spec = FlavorSpec {
            cpus: 8,
            ram_mb: 2048,
            disk_gb: 10,
        };
        let err = resolve_flavor(
            &[flavor("b", 2, 2048, 10, "drbd")],
            &spec,
            &DiskTemplate::Drbd,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::ResourceNotFound {
                kind: MissingResource::Flavor,
                ..
            }
        ));
    }

    #[test]
    fn image_is_resolved_by_name() {
        let images = vec![Image {
            id: "img-1".into(),
            name: "Debian Base".into(),
            owner: "system".into(),
        }];
        assert_eq!(resolve_image(&images, "Debian Base").unwrap(), "img-1");
        assert!(resolve_image(&images, "Ubuntu").is_err());
    }
}
