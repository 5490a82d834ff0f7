// src/features/mod.rs — Features: capabilities plugins provide and spaces bind

pub mod binding;
pub mod capability;
pub mod registry;

pub use binding::{FeatureBinding, FeatureBindings};
pub use capability::{Capability, FeatureFactory, FeatureInstance, FeatureType, ServerFeature};
pub use registry::FeatureRegistry;
