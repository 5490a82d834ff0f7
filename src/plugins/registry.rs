// src/plugins/registry.rs — Plugin registry: discovery, install, lifecycle
//
// Plugins are kept in registration order. Re-installing a namespace replaces
// the earlier entry in place. All state sits behind the registry's own locks
// so request threads can look plugins up while management calls install or
// uninstall others.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::infra::errors::{Result, SpaceportError};
use crate::plugins::archive;
use crate::plugins::descriptor::{self, PluginDescriptor};
use crate::plugins::events::Event;
use crate::plugins::module::ModuleUnit;
use crate::plugins::plugin::{
    InstalledPlugin, PluginFactory, ServerTracer, Tracer, TracerFactory,
};
use crate::server::Server;

pub struct PluginRegistry {
    plugins: RwLock<Vec<Arc<InstalledPlugin>>>,
    /// unit path → namespace it installed
    units: DashMap<PathBuf, String>,
    fail_fast: bool,
    started: AtomicBool,
}

impl PluginRegistry {
    pub fn new(fail_fast: bool) -> Self {
        Self {
            plugins: RwLock::new(Vec::new()),
            units: DashMap::new(),
            fail_fast,
            started: AtomicBool::new(false),
        }
    }

    /// Install every unit (directory or `.xpl` archive) under `root`, in name
    /// order.
    ///
    /// In fail-fast mode the first failing unit aborts the pass and its error
    /// is returned; units after it are not attempted. Otherwise every unit is
    /// attempted and the failures are reported together.
    pub fn discover(&self, server: &Server, root: &Path) -> Result<Vec<Arc<InstalledPlugin>>> {
        if !root.is_dir() {
            tracing::debug!("Plugin root {} does not exist, nothing to discover", root.display());
            return Ok(Vec::new());
        }

        let mut units: Vec<PathBuf> = std::fs::read_dir(root)?
            .flatten()
            .map(|e| e.path())
            .filter(|p| !is_hidden(p) && (p.is_dir() || archive::is_archive(p)))
            .collect();
        units.sort();

        let mut installed = Vec::new();
        let mut failures = Vec::new();
        for unit in units {
            match self.install(server, &unit) {
                Ok(Some(plugin)) => installed.push(plugin),
                Ok(None) => {}
                Err(e) if self.fail_fast => {
                    tracing::error!("Discovery aborted at {}: {e}", unit.display());
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!("Can't install {}: {e}", unit.display());
                    failures.push((unit, e));
                }
            }
        }

        tracing::info!(
            "Discovered {} plugin(s) under {}",
            installed.len(),
            root.display()
        );
        if failures.is_empty() {
            Ok(installed)
        } else {
            Err(SpaceportError::Discovery {
                root: root.to_path_buf(),
                failures,
            })
        }
    }

    /// Install a single unit. Returns `None` when the descriptor opts out
    /// with `install = false`.
    pub fn install(&self, server: &Server, unit: &Path) -> Result<Option<Arc<InstalledPlugin>>> {
        let home = if archive::is_archive(unit) {
            archive::unpack(unit)?
        } else {
            unit.to_path_buf()
        };

        let mut raw = descriptor::load_raw(&home)?;
        let namespace = descriptor::namespace_of(&raw, &home)?;
        let home_str = home.display().to_string();
        let lookup = |prefix: &str, key: &str| match (prefix, key) {
            ("this", "namespace") => Some(namespace.clone()),
            ("this", "home") => Some(home_str.clone()),
            _ => server.placeholder(prefix, key),
        };
        descriptor::resolve_placeholders(&mut raw, &lookup);
        let descriptor = PluginDescriptor::from_value(raw)?;

        if !descriptor.install {
            tracing::info!("Plugin {namespace} is marked install = false, skipped");
            return Ok(None);
        }

        for (key, value) in &descriptor.system_properties {
            server.set_setting(key, value);
        }

        let module = ModuleUnit::create(
            &namespace,
            &home,
            &descriptor.classpath,
            &descriptor.native,
            server.root_scope().clone(),
        )?;

        let spi = match &descriptor.spi {
            Some(bean) => {
                let factory = module.resolve::<PluginFactory>(&bean.class).ok_or_else(|| {
                    SpaceportError::Config(format!(
                        "plugin '{namespace}': spi class '{}' not found",
                        bean.class
                    ))
                })?;
                let plugin = module
                    .invoke(|| factory.build(&bean.args))
                    .map_err(|e| SpaceportError::plugin(&namespace, e))?;
                module.set_owner(plugin.clone());
                Some(plugin)
            }
            None => {
                tracing::warn!("Plugin {namespace} declares no spi, installing it inert");
                None
            }
        };

        let tracer: Arc<dyn Tracer> = match &descriptor.tracer {
            Some(bean) => {
                let factory = module.resolve::<TracerFactory>(&bean.class).ok_or_else(|| {
                    SpaceportError::Config(format!(
                        "plugin '{namespace}': tracer class '{}' not found",
                        bean.class
                    ))
                })?;
                factory
                    .build(&namespace, &bean.args)
                    .map_err(|e| SpaceportError::plugin(&namespace, e))?
            }
            None => Arc::new(ServerTracer::new(&namespace)),
        };
        tracer.on_install(&namespace);

        let init_on_install = descriptor.init_on_install;
        let plugin = Arc::new(InstalledPlugin::new(
            descriptor,
            home,
            unit.to_path_buf(),
            module,
            spi,
            tracer,
        ));
        self.register(plugin.clone());
        self.units.insert(unit.to_path_buf(), namespace);

        if init_on_install {
            plugin.initialize(server)?;
        }
        Ok(Some(plugin))
    }

    fn register(&self, plugin: Arc<InstalledPlugin>) {
        let mut plugins = self.plugins.write();
        match plugins
            .iter_mut()
            .find(|p| p.namespace() == plugin.namespace())
        {
            Some(slot) => {
                tracing::warn!("Plugin {} already installed, replacing it", plugin.namespace());
                *slot = plugin;
            }
            None => plugins.push(plugin),
        }
    }

    /// Initialize every plugin not initialized yet, in registration order.
    /// Async plugins get a detached thread each; their failures are only
    /// logged. A synchronous failure stops the pass. Plugins already
    /// started by an earlier pass are left alone.
    pub fn start(&self, server: &Arc<Server>) -> Result<()> {
        self.started.store(true, Ordering::SeqCst);
        for plugin in self.plugins() {
            self.launch(server, &plugin)?;
        }
        Ok(())
    }

    /// Install a unit and, once the registry has started, bring it up right
    /// away. Before that the plugin waits for [`start`](Self::start).
    pub fn hot_install(
        &self,
        server: &Arc<Server>,
        unit: &Path,
    ) -> Result<Option<Arc<InstalledPlugin>>> {
        let Some(plugin) = self.install(server, unit)? else {
            return Ok(None);
        };
        if self.is_started() {
            self.launch(server, &plugin)?;
        }
        Ok(Some(plugin))
    }

    fn launch(&self, server: &Arc<Server>, plugin: &Arc<InstalledPlugin>) -> Result<()> {
        if plugin.is_inert() {
            return Ok(());
        }
        if plugin.descriptor().init_on_install {
            plugin.promote();
            return Ok(());
        }
        if !plugin.claim() {
            return Ok(());
        }

        tracing::info!("Initialize plugin {}", plugin.namespace());
        if plugin.descriptor().is_async {
            let server = Arc::clone(server);
            let plugin = Arc::clone(plugin);
            std::thread::Builder::new()
                .name(format!("plugin-init-{}", plugin.namespace()))
                .spawn(move || match plugin.initialize(&server) {
                    Ok(()) => {
                        plugin.promote();
                    }
                    Err(e) => tracing::error!("Async init failed: {e}"),
                })?;
        } else {
            plugin.initialize(server)?;
            plugin.promote();
        }
        Ok(())
    }

    /// Tear a plugin down. The module unit is released when the plugin is
    /// closable, and its home is deleted unless `keep_binaries` is set.
    /// A failing teardown hook is reported after the cleanup has run.
    pub fn uninstall(&self, plugin: &Arc<InstalledPlugin>, keep_binaries: bool) -> Result<()> {
        let namespace = plugin.namespace().to_string();
        let outcome = plugin.terminate();

        if plugin.descriptor().closable {
            plugin.module().clear();
        }

        let removed = {
            let mut plugins = self.plugins.write();
            let before = plugins.len();
            plugins.retain(|p| !Arc::ptr_eq(p, plugin));
            before != plugins.len()
        };
        if removed {
            self.units.retain(|_, ns| *ns != namespace);
        }

        if !keep_binaries && plugin.home().exists() {
            std::fs::remove_dir_all(plugin.home())?;
        }

        match &outcome {
            Ok(()) => tracing::info!("Plugin {namespace} uninstalled"),
            Err(e) => tracing::warn!("Plugin {namespace} uninstalled, teardown failed: {e}"),
        }
        outcome
    }

    /// Uninstall whatever plugin `unit` installed, deleting its binaries.
    /// Returns false when the path is unknown.
    pub fn uninstall_unit(&self, unit: &Path) -> Result<bool> {
        let Some(namespace) = self.units.get(unit).map(|ns| ns.clone()) else {
            return Ok(false);
        };
        match self.lookup(&namespace) {
            Some(plugin) => {
                self.uninstall(&plugin, false)?;
                Ok(true)
            }
            None => {
                self.units.remove(unit);
                Ok(false)
            }
        }
    }

    /// Tear down every plugin, lowest weight first, keeping binaries.
    pub fn shutdown(&self) {
        let mut plugins = self.plugins();
        plugins.sort_by_key(|p| p.descriptor().weight);
        for plugin in &plugins {
            if let Err(e) = self.uninstall(plugin, true) {
                tracing::error!("Shutdown of plugin {} failed: {e}", plugin.namespace());
            }
        }
        self.plugins.write().clear();
        self.units.clear();
        self.started.store(false, Ordering::SeqCst);
    }

    /// Deliver `event` to every plugin in registration order. Every plugin
    /// sees the event; the first failure is returned afterwards.
    pub fn on_event(&self, server: &Server, event: &Event) -> Result<()> {
        let mut first = None;
        for plugin in self.plugins() {
            if let Err(e) = plugin.deliver(event, server) {
                tracing::error!("Event {} failed: {e}", event.kind());
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }

    pub fn lookup(&self, namespace: &str) -> Option<Arc<InstalledPlugin>> {
        self.plugins
            .read()
            .iter()
            .find(|p| p.namespace() == namespace)
            .cloned()
    }

    /// The module unit of an installed plugin, for adding dependency edges.
    pub fn find(&self, namespace: &str) -> Option<Arc<ModuleUnit>> {
        self.lookup(namespace).map(|p| p.module().clone())
    }

    pub fn names(&self) -> Vec<String> {
        self.plugins
            .read()
            .iter()
            .map(|p| p.namespace().to_string())
            .collect()
    }

    /// Snapshot in registration order.
    pub fn plugins(&self) -> Vec<Arc<InstalledPlugin>> {
        self.plugins.read().clone()
    }

    pub fn len(&self) -> usize {
        self.plugins.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.read().is_empty()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}
