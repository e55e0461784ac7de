//! Pre-flight quota checks run before any remote mutation.

use crate::errors::OrchestratorError;
use crate::quota::Availability;
use orka_models::{ResourceDemand, ResourceKind};
use tracing::debug;

pub trait AdmissionCheck: Send + Sync {
    fn kind(&self) -> ResourceKind;

    fn check(
        &self,
        availability: &Availability,
        demand: &ResourceDemand,
    ) -> Result<(), OrchestratorError>;
}

/// Accepts when the demand fits in what is still available.
#[derive(Debug, Clone, Copy)]
pub struct ResourceCheck {
    kind: ResourceKind,
}

impl ResourceCheck {
    pub fn new(kind: ResourceKind) -> Self {
        Self { kind }
    }
}

impl AdmissionCheck for ResourceCheck {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn check(
        &self,
        availability: &Availability,
        demand: &ResourceDemand,
    ) -> Result<(), OrchestratorError> {
        let available = availability.available(self.kind);
        let requested = demand.get(self.kind);
        if available - requested < 0 {
            return Err(OrchestratorError::QuotaDenied {
                kind: self.kind,
                requested,
                available,
            });
        }
        Ok(())
    }
}

/// A cluster always takes exactly one private network.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkCheck;

impl AdmissionCheck for NetworkCheck {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Network
    }

    fn check(
        &self,
        availability: &Availability,
        _demand: &ResourceDemand,
    ) -> Result<(), OrchestratorError> {
        let available = availability.available(ResourceKind::Network);
        if available < 1 {
            return Err(OrchestratorError::QuotaDenied {
                kind: ResourceKind::Network,
                requested: 1,
                available,
            });
        }
        Ok(())
    }
}

/// Ordered check chains for cluster creation and single-slave scale-up.
pub struct AdmissionController {
    create: Vec<Box<dyn AdmissionCheck>>,
    scale: Vec<Box<dyn AdmissionCheck>>,
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new()
    }
}

impl AdmissionController {
    pub fn new() -> Self {
        Self {
            create: vec![
                Box::new(ResourceCheck::new(ResourceKind::ClusterSize)),
                Box::new(NetworkCheck),
                Box::new(ResourceCheck::new(ResourceKind::FloatingIp)),
                Box::new(ResourceCheck::new(ResourceKind::Cpu)),
                Box::new(ResourceCheck::new(ResourceKind::Ram)),
                Box::new(ResourceCheck::new(ResourceKind::Disk)),
            ],
            scale: vec![
                Box::new(ResourceCheck::new(ResourceKind::ClusterSize)),
                Box::new(ResourceCheck::new(ResourceKind::Cpu)),
                Box::new(ResourceCheck::new(ResourceKind::Ram)),
                Box::new(ResourceCheck::new(ResourceKind::Disk)),
            ],
        }
    }

    /// Runs the creation chain; the first failing check is reported.
    pub fn check_all(
        &self,
        availability: &Availability,
        demand: &ResourceDemand,
    ) -> Result<(), OrchestratorError> {
        run_chain(&self.create, availability, demand)
    }

    pub fn check_scale_up(
        &self,
        availability: &Availability,
        demand: &ResourceDemand,
    ) -> Result<(), OrchestratorError> {
        run_chain(&self.scale, availability, demand)
    }

    pub fn create_order(&self) -> Vec<ResourceKind> {
        self.create.iter().map(|c| c.kind()).collect()
    }
}

fn run_chain(
    checks: &[Box<dyn AdmissionCheck>],
    availability: &Availability,
    demand: &ResourceDemand,
) -> Result<(), OrchestratorError> {
    for check in checks {
        check.check(availability, demand)?;
        debug!(kind = %check.kind(), "admission check passed");
    }
    Ok(())
}
