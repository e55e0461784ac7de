//! Resource descriptions exchanged with the cloud control plane.

use crate::enums::{DiskTemplate, ResourceStatus, VmRole};
use crate::request::FlavorSpec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Flavor {
    pub id: String,
    pub name: String,
    pub vcpus: u32,
    pub ram_mb: u64,
    pub disk_gb: u64,
    pub disk_template: String,
    /// Flavors the control plane lists but refuses to instantiate are
    /// flagged `false`.
    #[serde(default = "default_allow_create")]
    pub allow_create: bool,
}

fn default_allow_create() -> bool {
    true
}

impl Flavor {
    pub fn matches(&self, spec: &FlavorSpec, template: &DiskTemplate) -> bool {
        self.vcpus == spec.cpus
            && self.ram_mb == spec.ram_mb
            && self.disk_gb == spec.disk_gb
            && self.disk_template == template.as_str()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Image {
    pub id: String,
    pub name: String,
    pub owner: String,
}

/// File injected into a server at boot. `contents` is base64 encoded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersonalityFile {
    pub path: String,
    pub contents: String,
    pub owner: String,
    pub group: String,
    pub mode: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum NetworkSelection {
    /// Control-plane default: a public attachment.
    #[default]
    Default,
    /// No network at all; ports are wired later.
    Isolated,
    Attach(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerSpec {
    pub name: String,
    pub flavor_id: String,
    pub image_id: String,
    pub project_id: String,
    pub personality: Vec<PersonalityFile>,
    pub networks: NetworkSelection,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Fixed,
    Floating,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerAttachment {
    pub network_id: String,
    pub kind: AttachmentKind,
    pub ipv4: Option<String>,
    pub ipv6: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerDetails {
    pub id: String,
    pub name: String,
    pub status: ResourceStatus,
    pub fqdn: Option<String>,
    pub user_id: String,
    pub image_id: String,
    pub attachments: Vec<ServerAttachment>,
    /// Only present in the create response.
    pub admin_pass: Option<String>,
}

impl ServerDetails {
    pub fn is_attached_to(&self, network_id: &str) -> bool {
        self.attachments.iter().any(|a| a.network_id == network_id)
    }

    /// First attachment that is not the public floating one.
    pub fn private_network(&self) -> Option<&str> {
        self.attachments
            .iter()
            .find(|a| a.kind == AttachmentKind::Fixed)
            .map(|a| a.network_id.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkResource {
    pub id: String,
    pub name: String,
    pub subnet_cidr: Option<String>,
    pub ports: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicNetwork {
    pub id: String,
    pub name: String,
    pub status: String,
}

impl PublicNetwork {
    pub fn is_active(&self) -> bool {
        self.status == "ACTIVE"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subnet {
    pub id: String,
    pub network_id: String,
    pub cidr: String,
    pub enable_dhcp: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Port {
    pub id: String,
    pub network_id: String,
    pub server_id: String,
    pub status: ResourceStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FloatingIp {
    pub id: String,
    pub address: String,
    pub floating_network_id: String,
    pub instance_id: Option<String>,
    pub port_id: Option<String>,
}

impl FloatingIp {
    pub fn is_unattached(&self) -> bool {
        self.instance_id.is_none() && self.port_id.is_none()
    }
}

/// A server created during one orchestration call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VmHandle {
    pub remote_id: String,
    pub name: String,
    pub role: VmRole,
    pub ordinal: u32,
    pub network_id: Option<String>,
    #[serde(skip_serializing)]
    pub admin_pass: Option<String>,
    pub fqdn: Option<String>,
    pub build_status: ResourceStatus,
}

impl VmHandle {
    pub fn from_details(details: &ServerDetails, role: VmRole, ordinal: u32) -> Self {
        Self {
            remote_id: details.id.clone(),
            name: details.name.clone(),
            role,
            ordinal,
            network_id: details.private_network().map(str::to_string),
            admin_pass: details.admin_pass.clone(),
            fqdn: details.fqdn.clone(),
            build_status: details.status,
        }
    }
}

/// Parses the ordinal suffix of `<cluster>-<n>` server names.
pub fn name_ordinal(name: &str) -> Option<u32> {
    name.rsplit_once('-').and_then(|(_, n)| n.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flavor_match_requires_template() {
        let flavor = Flavor {
            id: "f1".into(),
            name: "C2R2048D10ext_vlmc".into(),
            vcpus: 2,
            ram_mb: 2048,
            disk_gb: 10,
            disk_template: "ext_vlmc".into(),
            allow_create: true,
        };
        let spec = FlavorSpec {
            cpus: 2,
            ram_mb: 2048,
            disk_gb: 10,
        };
        assert!(flavor.matches(&spec, &DiskTemplate::ExtVlmc));
        assert!(!flavor.matches(&spec, &DiskTemplate::Drbd));
    }

    #[test]
    fn ordinal_is_parsed_from_last_dash() {
        assert_eq!(name_ordinal("2024-01-01 10:00:00-hadoop-12"), Some(12));
        assert_eq!(name_ordinal("hadoop-master"), None);
        assert_eq!(name_ordinal("nodash"), None);
    }

    #[test]
    fn floating_ip_attachment() {
        let mut ip = FloatingIp {
            id: "1".into(),
            address: "83.212.0.1".into(),
            floating_network_id: "pub".into(),
            instance_id: None,
            port_id: None,
        };
        assert!(ip.is_unattached());
        ip.instance_id = Some("vm".into());
        assert!(!ip.is_unattached());
    }
}
