// src/plugins/mod.rs — Plugin system (descriptors, module units, registry)

pub mod archive;
pub mod descriptor;
pub mod events;
pub mod module;
pub mod native;
pub mod plugin;
pub mod registry;

pub use events::{Event, EventKind, EventTarget};
pub use module::ModuleUnit;
pub use plugin::{
    InstalledPlugin, Plugin, PluginContext, PluginFactory, PluginState, ServerTracer, Tracer,
    TracerFactory,
};
pub use registry::PluginRegistry;
