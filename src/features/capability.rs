// src/features/capability.rs — Capability types and feature factories
//
// A capability is a trait object type (`dyn Cache`, `dyn Storage`, ...) that
// plugins implement and spaces consume. Its kind name is the stable key the
// registry and the per-space bindings agree on.

use std::any::{Any, TypeId};
use std::sync::Arc;

use crate::space::Space;

/// Marker for types that can be resolved as features.
///
/// ```ignore
/// pub trait Cache: Send + Sync { fn get(&self, key: &str) -> Option<String>; }
/// impl Capability for dyn Cache { const KIND: Option<&'static str> = Some("cache"); }
/// ```
pub trait Capability: Send + Sync + 'static {
    /// Declared kind name. Types without one need an alias registered on the
    /// feature registry before they can be resolved.
    const KIND: Option<&'static str> = None;
}

/// Runtime identity of a capability type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeatureType {
    id: TypeId,
    name: &'static str,
    declared: Option<&'static str>,
}

impl FeatureType {
    pub fn of<T: ?Sized + Capability>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            declared: T::KIND,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }

    pub fn type_name(&self) -> &'static str {
        self.name
    }

    pub fn declared_kind(&self) -> Option<&'static str> {
        self.declared
    }
}

/// A handle produced by a feature for one space, type-erased until the
/// registry hands it back to the caller.
pub struct FeatureInstance(Box<dyn Any + Send + Sync>);

impl FeatureInstance {
    pub fn new<T: ?Sized + Capability>(value: Arc<T>) -> Self {
        Self(Box::new(value))
    }

    pub fn downcast<T: ?Sized + Capability>(self) -> Result<Arc<T>, Self> {
        self.0.downcast::<Arc<T>>().map(|b| *b).map_err(Self)
    }
}

/// A provider's implementation of one capability kind.
pub trait ServerFeature: Send + Sync {
    fn feature_type(&self) -> FeatureType;

    /// Explicit kind name, taking precedence over the type's declared one.
    fn id(&self) -> Option<&str> {
        None
    }

    /// Namespace of the plugin providing this implementation.
    fn provider(&self) -> &str;

    /// Produce the instance bound to `name` in `space`. `name` is passed as
    /// requested, `#subname` suffix included.
    fn get(&self, space: &Space, name: &str) -> anyhow::Result<FeatureInstance>;
}

type Build<T> = dyn Fn(&Space, &str) -> anyhow::Result<Arc<T>> + Send + Sync;

/// Closure-backed [`ServerFeature`].
pub struct FeatureFactory<T: ?Sized + Capability> {
    provider: String,
    id: Option<String>,
    build: Box<Build<T>>,
}

impl<T: ?Sized + Capability> FeatureFactory<T> {
    pub fn new<F>(provider: &str, build: F) -> Self
    where
        F: Fn(&Space, &str) -> anyhow::Result<Arc<T>> + Send + Sync + 'static,
    {
        Self {
            provider: provider.to_string(),
            id: None,
            build: Box::new(build),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }
}

impl<T: ?Sized + Capability> ServerFeature for FeatureFactory<T> {
    fn feature_type(&self) -> FeatureType {
        FeatureType::of::<T>()
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn provider(&self) -> &str {
        &self.provider
    }

    fn get(&self, space: &Space, name: &str) -> anyhow::Result<FeatureInstance> {
        (self.build)(space, name).map(FeatureInstance::new)
    }
}
