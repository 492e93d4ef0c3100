//! Clusternet Drivers
//!
//! Network driver contract and its physical, bridge, macvlan and overlay
//! implementations.

pub mod bridge;
pub mod common;
pub mod driver;
pub mod macvlan;
pub mod notify;
pub mod overlay;
pub mod physical;
pub mod registry;

pub use bridge::BridgeNetwork;
pub use common::{CommonNetwork, ConfigWriter, DriverContext, WriteGuard};
pub use driver::{update_and_restart, NetworkDriver, NetworkType};
pub use macvlan::MacvlanNetwork;
pub use notify::{DependencyNotifier, MemberNotifier, MemberRequest, NoDependents, StandaloneMember};
pub use overlay::{OverlayNetwork, VOLATILE_UPLINK_ADDRESS};
pub use physical::PhysicalNetwork;
pub use registry::{DriverFactory, DriverRegistry};
