pub mod env;
pub mod handoff;
pub mod harness;
pub mod reporter;
pub mod sim_cloud;

pub use env::ScopedEnv;
pub use handoff::{ScriptedRerouter, ScriptedRunner};
pub use harness::{TestHarness, cluster_request, test_settings};
pub use reporter::RecordingReporter;
pub use sim_cloud::{SimCall, SimCloud, SimOp};
