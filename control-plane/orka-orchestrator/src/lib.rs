pub mod admission;
pub mod cloud;
pub mod config;
pub mod errors;
pub mod handoff;
pub mod locks;
pub mod observability;
pub mod orchestrator;
pub mod quota;
pub mod reporter;
pub mod services;

pub use admission::{AdmissionCheck, AdmissionController};
pub use cloud::{CloudProvider, CloudSession};
pub use config::*;
pub use errors::*;
pub use handoff::{ConfigRunner, SshRerouter};
pub use locks::ClusterLocks;
pub use orchestrator::ClusterOrchestrator;
pub use quota::{Availability, QuotaLedger};
pub use reporter::{LogReporter, StateReporter, StatusTracker};
pub use services::{CreateOutcome, DestroyOutcome, FlavorCatalogue, ScaleOutcome};
