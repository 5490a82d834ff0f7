// src/features/registry.rs — Server-wide feature registry and per-space resolution

use dashmap::DashMap;
use std::any::TypeId;
use std::sync::Arc;

use crate::features::capability::{Capability, FeatureType, ServerFeature};
use crate::infra::errors::{FeatureNotFound, Result, SpaceportError};
use crate::space::Space;

/// (kind, provider) → implementation. Re-registering a key replaces it.
#[derive(Default)]
pub struct FeatureRegistry {
    features: DashMap<(String, String), Arc<dyn ServerFeature>>,
    aliases: DashMap<TypeId, String>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a feature under its kind and provider. The kind is the
    /// feature's explicit id, else the alias or declared kind of its type.
    pub fn add_feature(&self, feature: Arc<dyn ServerFeature>) -> Result<()> {
        let ty = feature.feature_type();
        let kind = match feature.id() {
            Some(id) => id.to_lowercase(),
            None => self.kind_of(&ty).ok_or_else(|| {
                SpaceportError::Config(format!(
                    "feature type {} declares no kind and no explicit id was given",
                    ty.type_name()
                ))
            })?,
        };
        let provider = feature.provider().to_string();
        if self
            .features
            .insert((kind.clone(), provider.clone()), feature)
            .is_some()
        {
            tracing::warn!("Feature {kind}/{provider} re-registered, replacing the previous one");
        } else {
            tracing::info!("Feature {kind} registered by {provider}");
        }
        Ok(())
    }

    /// Give a capability type a kind name, overriding its declared one.
    pub fn alias<T: ?Sized + Capability>(&self, kind: &str) {
        self.aliases
            .insert(FeatureType::of::<T>().type_id(), kind.to_lowercase());
    }

    pub fn kind_of(&self, ty: &FeatureType) -> Option<String> {
        if let Some(alias) = self.aliases.get(&ty.type_id()) {
            return Some(alias.clone());
        }
        ty.declared_kind().map(str::to_lowercase)
    }

    /// Resolve the `T` bound to `name` in `space`.
    ///
    /// A `#subname` suffix is ignored when reading the space's binding but is
    /// handed to the provider unchanged. Nothing is cached here.
    pub fn resolve<T: ?Sized + Capability>(&self, space: &Space, name: &str) -> Result<Arc<T>> {
        let ty = FeatureType::of::<T>();
        let kind = self
            .kind_of(&ty)
            .ok_or_else(|| FeatureNotFound::UnknownKind {
                type_name: ty.type_name().to_string(),
            })?;

        let base = name.split_once('#').map_or(name, |(base, _)| base);
        let binding = space.bindings().lookup(&kind, base, space.namespace())?;

        let feature = self
            .features
            .get(&(kind.clone(), binding.provider.clone()))
            .map(|f| f.value().clone())
            .ok_or_else(|| FeatureNotFound::ProviderNotRegistered {
                kind: kind.clone(),
                provider: binding.provider.clone(),
            })?;

        let instance = feature.get(space, name).map_err(|e| SpaceportError::Feature {
            kind: kind.clone(),
            provider: binding.provider.clone(),
            message: format!("{e:#}"),
        })?;
        instance.downcast::<T>().map_err(|_| SpaceportError::Feature {
            kind,
            provider: binding.provider,
            message: format!("instance is not a {}", ty.type_name()),
        })
    }

    pub fn get(&self, kind: &str, provider: &str) -> Option<Arc<dyn ServerFeature>> {
        self.features
            .get(&(kind.to_lowercase(), provider.to_string()))
            .map(|f| f.value().clone())
    }

    pub fn remove(&self, kind: &str, provider: &str) -> Option<Arc<dyn ServerFeature>> {
        self.features
            .remove(&(kind.to_lowercase(), provider.to_string()))
            .map(|(_, f)| f)
    }

    /// Registered (kind, provider) pairs, sorted.
    pub fn describe(&self) -> Vec<(String, String)> {
        let mut keys: Vec<_> = self.features.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
