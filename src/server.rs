// src/server.rs — Composition root: one server owns every registry
//
// Nothing here is global. Host code composes a server with the builder,
// exporting the plugin and tracer factories descriptors may name, then boots
// it. Independent servers can live side by side in one process.

use dashmap::DashMap;
use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::dispatch::dispatcher::{Dispatcher, Outcome};
use crate::dispatch::interceptor::{Interceptor, InterceptorChain};
use crate::dispatch::request::Request;
use crate::dispatch::response::Response;
use crate::dispatch::visitor::{DefaultRequestVisitor, RequestVisitor};
use crate::features::binding::FeatureBinding;
use crate::features::capability::{Capability, ServerFeature};
use crate::features::registry::FeatureRegistry;
use crate::infra::config::{Config, KeysConfig, SpaceConfig};
use crate::infra::errors::{Result, RoutingError, SpaceportError};
use crate::infra::paths;
use crate::plugins::descriptor::is_valid_namespace;
use crate::plugins::events::{Event, EventTarget};
use crate::plugins::module::ModuleUnit;
use crate::plugins::plugin::{PluginFactory, TracerFactory};
use crate::plugins::registry::PluginRegistry;
use crate::space::executor::Mode;
use crate::space::{AppStatus, Application, Space, Spaces};

pub struct ServerBuilder {
    config: Config,
    home: Option<PathBuf>,
    root: Arc<ModuleUnit>,
    visitor: Option<Arc<dyn RequestVisitor>>,
    chain: InterceptorChain,
}

impl ServerBuilder {
    /// Make a plugin implementation available to descriptors as `spi.class`.
    pub fn spi(self, class: &str, factory: PluginFactory) -> Self {
        self.root.export(class, factory);
        self
    }

    /// Make a diagnostic sink available to descriptors as `tracer.class`.
    pub fn tracer(self, class: &str, factory: TracerFactory) -> Self {
        self.root.export(class, factory);
        self
    }

    /// Export any other handle into the server's scope.
    pub fn export<T: Any + Send + Sync>(self, name: &str, value: T) -> Self {
        self.root.export(name, value);
        self
    }

    pub fn visitor(mut self, visitor: Arc<dyn RequestVisitor>) -> Self {
        self.visitor = Some(visitor);
        self
    }

    pub fn interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.chain.push(interceptor);
        self
    }

    /// Server home used for `[server.home]` placeholders.
    pub fn home(mut self, home: &Path) -> Self {
        self.home = Some(home.to_path_buf());
        self
    }

    pub fn build(self) -> Arc<Server> {
        let spaces = Arc::new(Spaces::new());
        let visitor = self
            .visitor
            .unwrap_or_else(|| Arc::new(DefaultRequestVisitor::new(self.config.routing.clone())));
        let dispatcher = Dispatcher::new(
            self.config.keys.clone(),
            spaces.clone(),
            visitor,
            self.chain,
        );
        Arc::new(Server {
            plugins: PluginRegistry::new(self.config.plugins.fail_fast),
            features: FeatureRegistry::new(),
            home: self.home.unwrap_or_else(paths::server_home),
            root: self.root,
            spaces,
            dispatcher,
            settings: DashMap::new(),
            config: self.config,
        })
    }
}

pub struct Server {
    config: Config,
    home: PathBuf,
    root: Arc<ModuleUnit>,
    plugins: PluginRegistry,
    features: FeatureRegistry,
    spaces: Arc<Spaces>,
    dispatcher: Dispatcher,
    settings: DashMap<String, String>,
}

impl Server {
    pub fn builder(config: Config) -> ServerBuilder {
        let root = ModuleUnit::root(&config.server.id);
        ServerBuilder {
            config,
            home: None,
            root,
            visitor: None,
            chain: InterceptorChain::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn id(&self) -> &str {
        &self.config.server.id
    }

    pub fn name(&self) -> &str {
        &self.config.server.name
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// The scope every plugin module unit is parented to.
    pub fn root_scope(&self) -> &Arc<ModuleUnit> {
        &self.root
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn features(&self) -> &FeatureRegistry {
        &self.features
    }

    pub fn spaces(&self) -> &Spaces {
        &self.spaces
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Value for a descriptor placeholder `[prefix.key]`, if known.
    pub fn placeholder(&self, prefix: &str, key: &str) -> Option<String> {
        match prefix {
            "vars" => self.config.variables.get(key).cloned(),
            "server" => match key {
                "id" => Some(self.id().to_string()),
                "name" => Some(self.name().to_string()),
                "home" => Some(self.home.display().to_string()),
                _ => self.setting(key),
            },
            "sys" => std::env::var(key).ok(),
            _ => None,
        }
    }

    /// Server-wide settings; plugins contribute theirs at install time.
    pub fn set_setting(&self, key: &str, value: &str) {
        if let Some(previous) = self.settings.insert(key.to_string(), value.to_string()) {
            if previous != value {
                tracing::debug!("Setting {key} changed from {previous} to {value}");
            }
        }
    }

    pub fn setting(&self, key: &str) -> Option<String> {
        self.settings.get(key).map(|v| v.clone())
    }

    pub fn settings(&self) -> BTreeMap<String, String> {
        self.settings
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    // ─── Lifecycle ──────────────────────────────────────────────

    /// Install the plugins under the configured home, start them, then
    /// create and start the configured spaces.
    pub fn boot(self: &Arc<Self>) -> Result<()> {
        let root = self.config.plugins.home();
        self.plugins.discover(self, &root)?;
        self.plugins.start(self)?;

        for space in &self.config.spaces {
            self.create_space(space)?;
            if space.start {
                self.start_space(&space.namespace)?;
            }
        }
        tracing::info!(
            "Server {} up: {} plugin(s), {} feature(s), {} space(s)",
            self.id(),
            self.plugins.len(),
            self.features.len(),
            self.spaces.names().len()
        );
        Ok(())
    }

    /// Stop every space, then tear plugins down by weight.
    pub async fn shutdown(&self) {
        for space in self.spaces.all() {
            if let Err(e) = self.stop_space(space.namespace()).await {
                tracing::error!("Stopping space {} failed: {e}", space.namespace());
            }
        }
        self.plugins.shutdown();
        tracing::info!("Server {} shut down", self.id());
    }

    // ─── Spaces & applications ──────────────────────────────────

    pub fn create_space(&self, config: &SpaceConfig) -> Result<Arc<Space>> {
        if !is_valid_namespace(&config.namespace) {
            return Err(SpaceportError::Management(format!(
                "invalid space namespace '{}'",
                config.namespace
            )));
        }
        if self.spaces.get(&config.namespace).is_some() {
            return Err(SpaceportError::Management(format!(
                "space '{}' already exists",
                config.namespace
            )));
        }
        let space = Arc::new(Space::from_config(config, &self.config.executor));
        self.spaces.insert(space.clone());
        tracing::info!("Space {} created", space.namespace());
        self.plugins
            .on_event(self, &Event::Create(EventTarget::Space(space.clone())))?;
        Ok(space)
    }

    pub fn start_space(&self, namespace: &str) -> Result<()> {
        let space = self.space(namespace)?;
        space.start();
        self.plugins
            .on_event(self, &Event::Start(EventTarget::Space(space)))
    }

    pub async fn stop_space(&self, namespace: &str) -> Result<()> {
        let space = self.space(namespace)?;
        let broadcast = self
            .plugins
            .on_event(self, &Event::Stop(EventTarget::Space(space.clone())));
        space.stop().await;
        broadcast
    }

    /// Stop a space and forget it.
    pub async fn drop_space(&self, namespace: &str) -> Result<()> {
        let outcome = self.stop_space(namespace).await;
        self.spaces.remove(namespace);
        outcome
    }

    pub fn add_application(&self, space: &str, app: &str) -> Result<Arc<Application>> {
        let space = self.space(space)?;
        if !is_valid_namespace(app) {
            return Err(SpaceportError::Management(format!(
                "invalid application namespace '{app}'"
            )));
        }
        let application = space.add_application(app);
        self.plugins.on_event(
            self,
            &Event::Create(EventTarget::Application {
                space,
                app: application.clone(),
            }),
        )?;
        Ok(application)
    }

    pub fn start_application(&self, space: &str, app: &str) -> Result<()> {
        self.set_app_status(space, app, AppStatus::Running)
    }

    pub fn stop_application(&self, space: &str, app: &str) -> Result<()> {
        self.set_app_status(space, app, AppStatus::Stopped)
    }

    fn set_app_status(&self, space: &str, app: &str, status: AppStatus) -> Result<()> {
        let space = self.space(space)?;
        let application = space.application(app).ok_or_else(|| RoutingError::AppNotFound {
            space: space.namespace().to_string(),
            app: app.to_string(),
        })?;
        application.set_status(status);
        let target = EventTarget::Application {
            space,
            app: application,
        };
        let event = match status {
            AppStatus::Running => Event::Start(target),
            _ => Event::Stop(target),
        };
        self.plugins.on_event(self, &event)
    }

    fn space(&self, namespace: &str) -> Result<Arc<Space>> {
        self.spaces
            .get(namespace)
            .ok_or_else(|| RoutingError::SpaceNotFound(namespace.to_string()).into())
    }

    // ─── Features ───────────────────────────────────────────────

    pub fn register_feature(&self, feature: Arc<dyn ServerFeature>) -> Result<()> {
        self.features.add_feature(feature)
    }

    /// Bind `kind`/`name` in a space to `provider`. Resources created under a
    /// replaced binding are recycled before plugins hear about the change.
    pub fn add_feature(
        &self,
        space: &str,
        kind: &str,
        name: &str,
        provider: &str,
        spec: Value,
        overwrite: bool,
    ) -> Result<()> {
        let space = self.space(space)?;
        space.add_binding(
            kind,
            name,
            FeatureBinding {
                provider: provider.to_string(),
                spec,
            },
            overwrite,
        )?;
        self.plugins.on_event(
            self,
            &Event::AddFeature {
                space,
                kind: kind.to_lowercase(),
                name: name.to_string(),
                provider: provider.to_string(),
                overwrite,
            },
        )
    }

    /// Remove a binding from a space, recycling what was created under it.
    pub fn delete_feature(&self, space: &str, kind: &str, name: &str) -> Result<()> {
        let space = self.space(space)?;
        let removed = space.remove_binding(kind, name).ok_or_else(|| {
            SpaceportError::Management(format!(
                "feature {kind}/{name} not found in space '{}'",
                space.namespace()
            ))
        })?;
        self.plugins.on_event(
            self,
            &Event::DeleteFeature {
                space,
                kind: kind.to_lowercase(),
                name: name.to_string(),
                provider: removed.provider,
            },
        )
    }

    /// Resolve the `T` bound to `name` in a space.
    pub fn feature<T: ?Sized + Capability>(&self, space: &str, name: &str) -> Result<Arc<T>> {
        let space = self.space(space)?;
        self.features.resolve::<T>(&space, name)
    }

    // ─── Requests ───────────────────────────────────────────────

    pub async fn dispatch(
        &self,
        request: Arc<Request>,
        response: Arc<dyn Response>,
        mode: Mode,
    ) -> Outcome {
        self.dispatcher.dispatch(request, response, mode).await
    }

    /// Ask a space's policy to interrupt the job running a request.
    pub fn interrupt(&self, space: &str, request_id: &str) -> bool {
        self.spaces
            .get(space)
            .and_then(|s| s.executor())
            .is_some_and(|e| e.interrupt(request_id))
    }

    pub fn set_keys(&self, keys: KeysConfig) {
        self.dispatcher.set_keys(keys);
    }
}
