pub mod error;
pub mod events;
pub mod network;
pub mod warning;

pub use error::SharedTypeError;
pub use events::SystemEvent;
pub use network::{
    is_node_local_key, is_true, is_volatile_key, ClientType, ConfigMap, NetworkNode,
    NetworkPut, NetworkRecord, NetworkStatus, NetworksPost, DEFAULT_PROJECT,
    NODE_LOCAL_PREFIX, VOLATILE_LAST_STATE_CREATED, VOLATILE_PREFIX,
};
pub use warning::{EntityRef, EntityType, Warning, WarningStatus, WarningType};
