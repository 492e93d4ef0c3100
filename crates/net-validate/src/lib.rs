//! Clusternet Validation
//!
//! Per-key rule sets for network configuration maps, the value checks used by
//! the drivers and the config diff used to decide what an update touches.

pub mod checks;
pub mod diff;
pub mod rules;

pub use diff::changed_keys;
pub use rules::{validate_config, Check, Rule, RuleSet, USER_PREFIX};
