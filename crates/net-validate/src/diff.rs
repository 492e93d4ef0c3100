//! Config map diff

use clusternet_shared_types::ConfigMap;

/// Keys whose value differs between `old` and `new`, including keys present
/// on one side only. Keys of `old` come first, in their order.
pub fn changed_keys(old: &ConfigMap, new: &ConfigMap) -> Vec<String> {
    let mut changed: Vec<String> = old
        .iter()
        .filter(|(key, value)| new.get(*key) != Some(*value))
        .map(|(key, _)| key.clone())
        .collect();

    changed.extend(
        new.keys()
            .filter(|key| !old.contains_key(*key))
            .cloned(),
    );
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(pairs: &[(&str, &str)]) -> ConfigMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_identical_configs() {
        let cfg = config(&[("parent", "eth0"), ("mtu", "1500")]);
        assert!(changed_keys(&cfg, &cfg.clone()).is_empty());
    }

    #[test]
    fn test_changed_added_removed() {
        let old = config(&[("parent", "eth0"), ("mtu", "1500"), ("vlan", "10")]);
        let new = config(&[("parent", "eth1"), ("mtu", "1500"), ("gvrp", "true")]);
        assert_eq!(changed_keys(&old, &new), vec!["parent", "vlan", "gvrp"]);
    }
}
