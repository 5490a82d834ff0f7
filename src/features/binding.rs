// src/features/binding.rs — Per-space feature bindings (kind → name → provider)

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::infra::config::BindingConfig;
use crate::infra::errors::{FeatureNotFound, Result, SpaceportError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBinding {
    pub provider: String,
    #[serde(default)]
    pub spec: Value,
}

impl From<&BindingConfig> for FeatureBinding {
    fn from(c: &BindingConfig) -> Self {
        Self {
            provider: c.provider.clone(),
            spec: c.spec.clone(),
        }
    }
}

/// Binding table of one space. Kind names are case-insensitive.
#[derive(Debug, Default)]
pub struct FeatureBindings {
    kinds: RwLock<BTreeMap<String, BTreeMap<String, FeatureBinding>>>,
}

impl FeatureBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &BTreeMap<String, BTreeMap<String, BindingConfig>>) -> Self {
        let kinds = config
            .iter()
            .map(|(kind, names)| {
                let names = names
                    .iter()
                    .map(|(name, b)| (name.clone(), FeatureBinding::from(b)))
                    .collect();
                (kind.to_lowercase(), names)
            })
            .collect();
        Self {
            kinds: RwLock::new(kinds),
        }
    }

    /// Find the binding for `kind`/`name`, telling apart a kind the space
    /// declares nothing under from a missing name.
    pub fn lookup(
        &self,
        kind: &str,
        name: &str,
        space: &str,
    ) -> std::result::Result<FeatureBinding, FeatureNotFound> {
        let kinds = self.kinds.read();
        let names = kinds
            .get(&kind.to_lowercase())
            .ok_or_else(|| FeatureNotFound::KindNotBound {
                kind: kind.to_string(),
                space: space.to_string(),
            })?;
        let binding = names
            .get(name)
            .ok_or_else(|| FeatureNotFound::NameNotBound {
                kind: kind.to_string(),
                name: name.to_string(),
                space: space.to_string(),
            })?;
        if binding.provider.is_empty() {
            return Err(FeatureNotFound::ProviderMissing {
                kind: kind.to_string(),
                name: name.to_string(),
                space: space.to_string(),
            });
        }
        Ok(binding.clone())
    }

    pub fn get(&self, kind: &str, name: &str) -> Option<FeatureBinding> {
        self.kinds
            .read()
            .get(&kind.to_lowercase())
            .and_then(|names| names.get(name))
            .cloned()
    }

    /// Add a binding. Replacing an existing one requires `overwrite`; the
    /// replaced binding is returned.
    pub fn insert(
        &self,
        kind: &str,
        name: &str,
        binding: FeatureBinding,
        overwrite: bool,
    ) -> Result<Option<FeatureBinding>> {
        let mut kinds = self.kinds.write();
        let names = kinds.entry(kind.to_lowercase()).or_default();
        if names.contains_key(name) && !overwrite {
            return Err(SpaceportError::Management(format!(
                "feature {kind}/{name} already exists"
            )));
        }
        Ok(names.insert(name.to_string(), binding))
    }

    pub fn remove(&self, kind: &str, name: &str) -> Option<FeatureBinding> {
        let kind = kind.to_lowercase();
        let mut kinds = self.kinds.write();
        let names = kinds.get_mut(&kind)?;
        let removed = names.remove(name);
        if names.is_empty() {
            kinds.remove(&kind);
        }
        removed
    }

    pub fn kinds(&self) -> Vec<String> {
        self.kinds.read().keys().cloned().collect()
    }

    pub fn names(&self, kind: &str) -> Vec<String> {
        self.kinds
            .read()
            .get(&kind.to_lowercase())
            .map(|names| names.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redis() -> FeatureBinding {
        FeatureBinding {
            provider: "redis".into(),
            spec: Value::Null,
        }
    }

    #[test]
    fn test_lookup_causes() {
        let b = FeatureBindings::new();
        assert!(matches!(
            b.lookup("cache", "default", "acme"),
            Err(FeatureNotFound::KindNotBound { .. })
        ));

        b.insert("Cache", "default", redis(), false).unwrap();
        assert!(matches!(
            b.lookup("cache", "other", "acme"),
            Err(FeatureNotFound::NameNotBound { .. })
        ));
        assert_eq!(b.lookup("CACHE", "default", "acme").unwrap().provider, "redis");

        let empty = FeatureBinding {
            provider: String::new(),
            spec: Value::Null,
        };
        b.insert("cache", "blank", empty, false).unwrap();
        assert!(matches!(
            b.lookup("cache", "blank", "acme"),
            Err(FeatureNotFound::ProviderMissing { .. })
        ));
    }

    #[test]
    fn test_insert_requires_overwrite() {
        let b = FeatureBindings::new();
        assert!(b.insert("cache", "default", redis(), false).unwrap().is_none());
        let err = b.insert("cache", "default", redis(), false).unwrap_err();
        assert!(matches!(err, SpaceportError::Management(_)));
        assert!(b.insert("cache", "default", redis(), true).unwrap().is_some());
    }

    #[test]
    fn test_remove_drops_empty_kind() {
        let b = FeatureBindings::new();
        b.insert("cache", "default", redis(), false).unwrap();
        assert_eq!(b.remove("cache", "default"), Some(redis()));
        assert!(b.kinds().is_empty());
        assert!(b.remove("cache", "default").is_none());
    }
}
