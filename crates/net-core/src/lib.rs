//! Clusternet Core
//!
//! Error taxonomy, host interface control and the revert scope shared by every
//! network driver.

pub mod claim;
pub mod error;
pub mod interface;
pub mod iproute;
pub mod memory;
pub mod revert;

pub use claim::ParentClaim;
pub use error::{
    ConflictError, HostOperationError, HostResult, NetworkError, PersistenceError,
    ValidationError,
};
pub use interface::{host_device_name, InterfaceController};
pub use iproute::IpRouteController;
pub use memory::{HostOp, InMemoryInterfaces};
pub use revert::RevertScope;

/// Result type for network operations
pub type Result<T> = std::result::Result<T, NetworkError>;
