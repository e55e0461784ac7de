//! Capability interface of the cloud control plane.

mod wait;

pub use wait::{await_port, await_server, await_server_deleted};

use crate::errors::CloudError;
use async_trait::async_trait;
use orka_models::{
    Flavor, FloatingIp, Image, NetworkResource, Port, Project, PublicNetwork,
    QuotaSnapshot, ResourceStatus, ServerDetails, ServerSpec, Subnet,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub type CloudResult<T> = Result<T, CloudError>;

#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Opens a session for the owner of `token`.
    async fn authenticate(
        &self,
        token: &str,
    ) -> CloudResult<Arc<dyn CloudSession>>;
}

/// Authenticated view of the control plane for one user.
#[async_trait]
pub trait CloudSession: Send + Sync {
    fn user_id(&self) -> &str;

    async fn list_projects(&self) -> CloudResult<Vec<Project>>;
    /// Quota per project id.
    async fn get_quotas(&self) -> CloudResult<HashMap<String, QuotaSnapshot>>;
    async fn list_flavors(&self) -> CloudResult<Vec<Flavor>>;
    async fn list_public_images(&self) -> CloudResult<Vec<Image>>;

    async fn create_server(&self, spec: &ServerSpec) -> CloudResult<ServerDetails>;
    async fn get_server_details(&self, id: &str) -> CloudResult<ServerDetails>;
    async fn list_servers(&self) -> CloudResult<Vec<ServerDetails>>;
    async fn delete_server(&self, id: &str) -> CloudResult<()>;
    /// Polls until the server leaves `current` or `max_wait` elapses, and
    /// returns the last observed status.
    async fn wait_server(
        &self,
        id: &str,
        current: ResourceStatus,
        max_wait: Duration,
    ) -> CloudResult<ResourceStatus>;

    async fn create_network(
        &self,
        name: &str,
        project_id: &str,
    ) -> CloudResult<NetworkResource>;
    async fn delete_network(&self, id: &str) -> CloudResult<()>;
    async fn list_public_networks(&self) -> CloudResult<Vec<PublicNetwork>>;
    async fn create_subnet(
        &self,
        network_id: &str,
        cidr: &str,
        enable_dhcp: bool,
    ) -> CloudResult<Subnet>;

    async fn create_port(
        &self,
        network_id: &str,
        server_id: &str,
    ) -> CloudResult<Port>;
    async fn get_port_details(&self, id: &str) -> CloudResult<Port>;
    async fn wait_port(
        &self,
        id: &str,
        current: ResourceStatus,
        max_wait: Duration,
    ) -> CloudResult<ResourceStatus>;

    async fn list_floating_ips(&self) -> CloudResult<Vec<FloatingIp>>;
    async fn create_floating_ip(
        &self,
        floating_network_id: &str,
        project_id: &str,
    ) -> CloudResult<FloatingIp>;
    async fn delete_floating_ip(&self, id: &str) -> CloudResult<()>;
}
