//! Clusternet Apply
//!
//! Lifecycle orchestration of networks across cluster members: per-record
//! serialisation, cluster fan-out of validated requests and propagation of
//! uplink changes to dependent networks.

pub mod dependency;
pub mod fanout;
pub mod lifecycle;
pub mod locks;


pub use dependency::{DependentNetworkListener, EventBusNotifier};
pub use fanout::ClusterFanout;
pub use lifecycle::{BatchReport, LifecycleOrchestrator, OrchestratorBuilder};
pub use locks::{RecordGuard, RecordLocks};
