//! Exclusive (parent, VLAN) claims of uplink-backed networks

use clusternet_shared_types::ConfigMap;

/// The (parent interface, VLAN) pair a network occupies.
///
/// An untagged claim (empty VLAN) owns the whole parent and therefore
/// conflicts with every VLAN on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParentClaim {
    pub parent: String,
    pub vlan: String,
}

impl ParentClaim {
    pub fn new(parent: impl Into<String>, vlan: impl Into<String>) -> Self {
        Self {
            parent: parent.into(),
            vlan: vlan.into(),
        }
    }

    /// Claim expressed by a config's `parent` and `vlan` keys, if it has a parent.
    pub fn from_config(config: &ConfigMap) -> Option<Self> {
        let parent = config.get("parent").filter(|p| !p.is_empty())?;
        let vlan = config.get("vlan").cloned().unwrap_or_default();
        Some(Self::new(parent.clone(), vlan))
    }

    pub fn is_untagged(&self) -> bool {
        self.vlan.is_empty()
    }

    pub fn conflicts_with(&self, other: &ParentClaim) -> bool {
        self.parent == other.parent
            && (self.is_untagged() || other.is_untagged() || self.vlan == other.vlan)
    }
}

impl std::fmt::Display for ParentClaim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.vlan.is_empty() {
            write!(f, "{}", self.parent)
        } else {
            write!(f, "{} (VLAN {})", self.parent, self.vlan)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflicts() {
        let untagged = ParentClaim::new("eth0", "");
        let vlan10 = ParentClaim::new("eth0", "10");
        let vlan20 = ParentClaim::new("eth0", "20");
        let other = ParentClaim::new("eth1", "");

        assert!(untagged.conflicts_with(&vlan10));
        assert!(vlan10.conflicts_with(&untagged));
        assert!(vlan10.conflicts_with(&vlan10.clone()));
        assert!(!vlan10.conflicts_with(&vlan20));
        assert!(!untagged.conflicts_with(&other));
    }

    #[test]
    fn test_from_config() {
        let mut config = ConfigMap::new();
        assert_eq!(ParentClaim::from_config(&config), None);

        config.insert("parent".into(), "eth0".into());
        assert_eq!(
            ParentClaim::from_config(&config),
            Some(ParentClaim::new("eth0", ""))
        );

        config.insert("vlan".into(), "10".into());
        let claim = ParentClaim::from_config(&config).unwrap();
        assert_eq!(claim.to_string(), "eth0 (VLAN 10)");
    }
}
