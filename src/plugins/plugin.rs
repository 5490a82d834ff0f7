// src/plugins/plugin.rs — Plugin SPI, runtime plugin entity, diagnostic sinks

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::infra::errors::{Result, SpaceportError};
use crate::plugins::descriptor::PluginDescriptor;
use crate::plugins::events::Event;
use crate::plugins::module::ModuleUnit;
use crate::server::Server;

/// Code a plugin contributes to the server. Instances are built by a
/// [`PluginFactory`] resolved through the plugin's module unit.
pub trait Plugin: Send + Sync {
    /// Bring the plugin up: register features, open pools, etc.
    fn init(&self, ctx: &PluginContext<'_>) -> anyhow::Result<()>;

    /// Teardown hook, called once on uninstall or server shutdown.
    fn kill(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Lifecycle event broadcast. Plugins ignore targets they don't care about.
    fn on_event(&self, _event: &Event, _ctx: &PluginContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// What a plugin sees of its host during a lifecycle call.
pub struct PluginContext<'a> {
    pub server: &'a Server,
    pub plugin: &'a InstalledPlugin,
}

impl PluginContext<'_> {
    pub fn namespace(&self) -> &str {
        self.plugin.namespace()
    }

    pub fn home(&self) -> &Path {
        self.plugin.home()
    }

    pub fn module(&self) -> &Arc<ModuleUnit> {
        self.plugin.module()
    }

    pub fn tracer(&self) -> &dyn Tracer {
        self.plugin.tracer()
    }
}

type BuildPlugin = dyn Fn(&Value) -> anyhow::Result<Arc<dyn Plugin>> + Send + Sync;
type BuildTracer = dyn Fn(&str, &Value) -> anyhow::Result<Arc<dyn Tracer>> + Send + Sync;

/// Builds a plugin from the descriptor's `spi.args`. Exported into a module
/// unit under the class name descriptors refer to.
pub struct PluginFactory(Box<BuildPlugin>);

impl PluginFactory {
    pub fn new<F>(build: F) -> Self
    where
        F: Fn(&Value) -> anyhow::Result<Arc<dyn Plugin>> + Send + Sync + 'static,
    {
        Self(Box::new(build))
    }

    pub fn build(&self, args: &Value) -> anyhow::Result<Arc<dyn Plugin>> {
        (self.0)(args)
    }
}

/// Builds a custom diagnostic sink from the descriptor's `tracer.args`.
pub struct TracerFactory(Box<BuildTracer>);

impl TracerFactory {
    pub fn new<F>(build: F) -> Self
    where
        F: Fn(&str, &Value) -> anyhow::Result<Arc<dyn Tracer>> + Send + Sync + 'static,
    {
        Self(Box::new(build))
    }

    pub fn build(&self, namespace: &str, args: &Value) -> anyhow::Result<Arc<dyn Tracer>> {
        (self.0)(namespace, args)
    }
}

/// Per-plugin diagnostic sink.
pub trait Tracer: Send + Sync {
    fn log(&self, level: tracing::Level, message: &str);

    fn on_install(&self, namespace: &str) {
        self.log(tracing::Level::INFO, &format!("plugin {namespace} installed"));
    }
}

/// Default sink: forwards to `tracing` with the plugin namespace attached.
pub struct ServerTracer {
    namespace: String,
}

impl ServerTracer {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
        }
    }
}

impl Tracer for ServerTracer {
    fn log(&self, level: tracing::Level, message: &str) {
        let plugin = self.namespace.as_str();
        match level {
            tracing::Level::ERROR => tracing::error!(plugin, "{message}"),
            tracing::Level::WARN => tracing::warn!(plugin, "{message}"),
            tracing::Level::INFO => tracing::info!(plugin, "{message}"),
            tracing::Level::DEBUG => tracing::debug!(plugin, "{message}"),
            _ => tracing::trace!(plugin, "{message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginState {
    Installed,
    Initialized,
    Running,
    Killed,
    Failed(String),
}

impl PluginState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PluginState::Killed | PluginState::Failed(_))
    }
}

/// A plugin as held by the registry.
pub struct InstalledPlugin {
    descriptor: PluginDescriptor,
    home: PathBuf,
    source: PathBuf,
    module: Arc<ModuleUnit>,
    spi: Option<Arc<dyn Plugin>>,
    tracer: Arc<dyn Tracer>,
    state: Mutex<PluginState>,
    /// set once a start pass has taken this plugin over
    claimed: AtomicBool,
    installed_at: DateTime<Utc>,
}

impl std::fmt::Debug for InstalledPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstalledPlugin")
            .field("namespace", &self.namespace())
            .field("home", &self.home)
            .field("state", &self.state())
            .field("inert", &self.is_inert())
            .finish()
    }
}

impl InstalledPlugin {
    pub(crate) fn new(
        descriptor: PluginDescriptor,
        home: PathBuf,
        source: PathBuf,
        module: Arc<ModuleUnit>,
        spi: Option<Arc<dyn Plugin>>,
        tracer: Arc<dyn Tracer>,
    ) -> Self {
        Self {
            descriptor,
            home,
            source,
            module,
            spi,
            tracer,
            state: Mutex::new(PluginState::Installed),
            claimed: AtomicBool::new(false),
            installed_at: Utc::now(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.descriptor.namespace
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// The unit path this plugin was installed from (archive or directory).
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn module(&self) -> &Arc<ModuleUnit> {
        &self.module
    }

    pub fn spi(&self) -> Option<&Arc<dyn Plugin>> {
        self.spi.as_ref()
    }

    /// Installed without an SPI: registered, but never initialized.
    pub fn is_inert(&self) -> bool {
        self.spi.is_none()
    }

    pub fn tracer(&self) -> &dyn Tracer {
        self.tracer.as_ref()
    }

    pub fn state(&self) -> PluginState {
        self.state.lock().clone()
    }

    pub(crate) fn set_state(&self, state: PluginState) {
        *self.state.lock() = state;
    }

    /// Take the plugin over for initialization. Only one caller ever wins,
    /// and only while the plugin is still `Installed`.
    pub(crate) fn claim(&self) -> bool {
        let state = self.state.lock();
        *state == PluginState::Installed && !self.claimed.swap(true, Ordering::SeqCst)
    }

    /// `Initialized` → `Running`. Any other state is left alone.
    pub(crate) fn promote(&self) -> bool {
        let mut state = self.state.lock();
        if *state == PluginState::Initialized {
            *state = PluginState::Running;
            true
        } else {
            false
        }
    }

    pub fn installed_at(&self) -> DateTime<Utc> {
        self.installed_at
    }

    fn within<R>(&self, f: impl FnOnce() -> R) -> R {
        if self.descriptor.isolated {
            self.module.invoke(f)
        } else {
            f()
        }
    }

    /// Run the init hook. Inert plugins are left untouched.
    pub(crate) fn initialize(&self, server: &Server) -> Result<()> {
        let Some(spi) = self.spi.clone() else {
            return Ok(());
        };
        let ctx = PluginContext {
            server,
            plugin: self,
        };
        match self.within(|| spi.init(&ctx)) {
            Ok(()) => {
                {
                    // uninstalled while a detached init was still running
                    let mut state = self.state.lock();
                    if !state.is_terminal() {
                        *state = PluginState::Initialized;
                    }
                }
                self.tracer.log(tracing::Level::DEBUG, "initialized");
                Ok(())
            }
            Err(e) => {
                self.set_state(PluginState::Failed(e.to_string()));
                Err(SpaceportError::plugin(self.namespace(), e))
            }
        }
    }

    /// Run the teardown hook. The plugin ends up `Killed` either way.
    pub(crate) fn terminate(&self) -> Result<()> {
        let outcome = match self.spi.clone() {
            Some(spi) => self.within(|| spi.kill()),
            None => Ok(()),
        };
        self.set_state(PluginState::Killed);
        outcome.map_err(|e| SpaceportError::plugin(self.namespace(), e))
    }

    pub(crate) fn deliver(&self, event: &Event, server: &Server) -> Result<()> {
        let Some(spi) = self.spi.clone() else {
            return Ok(());
        };
        let ctx = PluginContext {
            server,
            plugin: self,
        };
        self.within(|| spi.on_event(event, &ctx))
            .map_err(|e| SpaceportError::plugin(self.namespace(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!PluginState::Installed.is_terminal());
        assert!(!PluginState::Running.is_terminal());
        assert!(PluginState::Killed.is_terminal());
        assert!(PluginState::Failed("x".into()).is_terminal());
    }

    #[test]
    fn test_factory_passes_args() {
        struct Noop;
        impl Plugin for Noop {
            fn init(&self, _ctx: &PluginContext<'_>) -> anyhow::Result<()> {
                Ok(())
            }
        }
        let factory = PluginFactory::new(|args| {
            anyhow::ensure!(args["pool"] == 4, "bad args");
            Ok(Arc::new(Noop) as Arc<dyn Plugin>)
        });
        assert!(factory.build(&serde_json::json!({"pool": 4})).is_ok());
        assert!(factory.build(&Value::Null).is_err());
    }
}
