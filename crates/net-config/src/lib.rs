//! Clusternet Config
//!
//! The cluster store holding the authoritative network records, the warning
//! sink built on top of it and the settings of the daemon and CLI.

pub mod file;
pub mod memory;
pub mod settings;
pub mod store;
pub mod warnings;

pub use file::FileClusterStore;
pub use memory::MemoryClusterStore;
pub use settings::Settings;
pub use store::{
    ClusterState, ClusterStore, ClusterTx, NicDevice, StoreError, StoreResult, TxFn,
};
pub use warnings::{ClusterWarnings, WarningSink};

#[cfg(test)]
mod tests;
