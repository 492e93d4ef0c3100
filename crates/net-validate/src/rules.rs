//! Rule sets and the config validator

use std::sync::Arc;

use indexmap::IndexMap;
use log::debug;

use clusternet_core::ValidationError;
use clusternet_shared_types::ConfigMap;

/// Free-form keys accepted on every network without a rule.
pub const USER_PREFIX: &str = "user.";

/// A value check; the error string explains what is wrong with the value.
pub type Check = Arc<dyn Fn(&str) -> Result<(), String> + Send + Sync>;

/// Validation rule for one config key
#[derive(Clone)]
pub struct Rule {
    required: bool,
    check: Option<Check>,
}

impl Rule {
    /// Key must be present and non-empty and pass `check`.
    pub fn required<F>(check: F) -> Self
    where
        F: Fn(&str) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            required: true,
            check: Some(Arc::new(check)),
        }
    }

    /// Key may be absent or empty; otherwise it must pass `check`.
    pub fn optional<F>(check: F) -> Self
    where
        F: Fn(&str) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            required: false,
            check: Some(Arc::new(check)),
        }
    }

    /// Key is accepted with any value.
    pub fn any() -> Self {
        Self {
            required: false,
            check: None,
        }
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    fn apply(&self, key: &str, value: Option<&str>) -> Result<(), ValidationError> {
        let value = value.unwrap_or_default();
        if value.is_empty() {
            if self.required {
                return Err(ValidationError::MissingKey {
                    key: key.to_string(),
                });
            }
            return Ok(());
        }

        match &self.check {
            Some(check) => check(value).map_err(|reason| ValidationError::InvalidValue {
                key: key.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("required", &self.required)
            .field("checked", &self.check.is_some())
            .finish()
    }
}

/// Ordered key → rule map declared by a driver
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: IndexMap<String, Rule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, rule: Rule) -> Self {
        self.rules.insert(key.into(), rule);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, rule: Rule) {
        self.rules.insert(key.into(), rule);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.rules.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Validate `config` against `rules`.
///
/// Rules are applied in declaration order, then any key without a rule (other
/// than `user.*`) is rejected. The first problem found is returned.
pub fn validate_config(config: &ConfigMap, rules: &RuleSet) -> Result<(), ValidationError> {
    for (key, rule) in &rules.rules {
        rule.apply(key, config.get(key).map(String::as_str))?;
    }

    for key in config.keys() {
        if rules.contains(key) {
            continue;
        }
        if key.starts_with(USER_PREFIX) && key.len() > USER_PREFIX.len() {
            continue;
        }
        debug!("Rejecting unknown network option {}", key);
        return Err(ValidationError::UnknownKey { key: key.clone() });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks;

    fn rules() -> RuleSet {
        RuleSet::new()
            .with("parent", Rule::required(checks::interface_name))
            .with("mtu", Rule::optional(checks::network_mtu))
            .with("maas.subnet.ipv4", Rule::any())
    }

    fn config(pairs: &[(&str, &str)]) -> ConfigMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_valid_config() {
        let cfg = config(&[("parent", "eth0"), ("mtu", "9000"), ("user.owner", "ops")]);
        assert!(validate_config(&cfg, &rules()).is_ok());
    }

    #[test]
    fn test_missing_required_key() {
        let err = validate_config(&config(&[("mtu", "1500")]), &rules()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingKey {
                key: "parent".into()
            }
        );
    }

    #[test]
    fn test_invalid_value_names_key() {
        let err = validate_config(&config(&[("parent", "eth0"), ("mtu", "12")]), &rules())
            .unwrap_err();
        assert_eq!(err.key(), Some("mtu"));
    }

    #[test]
    fn test_empty_optional_is_accepted() {
        assert!(validate_config(&config(&[("parent", "eth0"), ("mtu", "")]), &rules()).is_ok());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = validate_config(&config(&[("parent", "eth0"), ("bogus", "1")]), &rules())
            .unwrap_err();
        assert_eq!(err, ValidationError::UnknownKey { key: "bogus".into() });

        let err = validate_config(&config(&[("parent", "eth0"), ("user.", "1")]), &rules())
            .unwrap_err();
        assert_eq!(err.key(), Some("user."));
    }
}
