// src/space/mod.rs — Tenant spaces, applications, recyclable resources
//
// A space is the tenant boundary: it hosts applications, carries its own
// feature bindings, and owns the concurrency policy its requests run under.

pub mod executor;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::features::binding::{FeatureBinding, FeatureBindings};
use crate::infra::config::{ExecutorConfig, SpaceConfig};
use crate::infra::errors::Result;
use executor::{ExecutionPolicy, WorkerPool};

/// A tenant-held resource that must be released when the binding it was
/// created from goes away, or when the space stops.
pub trait Recyclable: Send + Sync {
    fn recycle(&self);
}

struct Held {
    handle: Arc<dyn Any + Send + Sync>,
    recyclable: Arc<dyn Recyclable>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AppStatus {
    Running,
    Stopped,
    Paused,
    Failed,
}

#[derive(Debug)]
pub struct Application {
    namespace: String,
    space: String,
    status: RwLock<AppStatus>,
}

impl Application {
    pub fn new(space: &str, namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            space: space.to_string(),
            status: RwLock::new(AppStatus::Running),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn space(&self) -> &str {
        &self.space
    }

    pub fn status(&self) -> AppStatus {
        *self.status.read()
    }

    pub fn set_status(&self, status: AppStatus) {
        *self.status.write() = status;
    }

    pub fn is_running(&self) -> bool {
        self.status() == AppStatus::Running
    }
}

pub struct Space {
    namespace: String,
    bindings: FeatureBindings,
    apps: DashMap<String, Arc<Application>>,
    executor_config: ExecutorConfig,
    executor: RwLock<Option<Arc<dyn ExecutionPolicy>>>,
    recyclables: DashMap<String, Held>,
    started: AtomicBool,
}

impl std::fmt::Debug for Space {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Space")
            .field("namespace", &self.namespace)
            .field("started", &self.is_started())
            .field("apps", &self.apps.len())
            .field("recyclables", &self.recyclables.len())
            .finish()
    }
}

impl Space {
    pub fn new(namespace: &str, executor_config: ExecutorConfig) -> Self {
        Self {
            namespace: namespace.to_string(),
            bindings: FeatureBindings::new(),
            apps: DashMap::new(),
            executor_config,
            executor: RwLock::new(None),
            recyclables: DashMap::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Build a space from its config section. `defaults` is the server-wide
    /// executor config, used when the space doesn't override it.
    pub fn from_config(config: &SpaceConfig, defaults: &ExecutorConfig) -> Self {
        let mut space = Self::new(
            &config.namespace,
            config.executor.clone().unwrap_or_else(|| defaults.clone()),
        );
        space.bindings = FeatureBindings::from_config(&config.features);
        for app in &config.apps {
            space.add_application(app);
        }
        space
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn bindings(&self) -> &FeatureBindings {
        &self.bindings
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Open the space for requests, creating its worker pool if no policy
    /// was installed.
    pub fn start(&self) {
        {
            let mut executor = self.executor.write();
            if executor.is_none() {
                *executor = Some(Arc::new(WorkerPool::new(
                    &self.namespace,
                    self.executor_config.clone(),
                )));
            }
        }
        self.started.store(true, Ordering::SeqCst);
        tracing::info!("Space {} started", self.namespace);
    }

    /// Close the space: shut its policy down and recycle everything it holds.
    pub async fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
        let executor = self.executor.write().take();
        if let Some(executor) = executor {
            executor.shutdown().await;
        }
        self.recycle_all();
        tracing::info!("Space {} stopped", self.namespace);
    }

    pub fn executor(&self) -> Option<Arc<dyn ExecutionPolicy>> {
        self.executor.read().clone()
    }

    /// Replace the concurrency policy. Takes effect for the next submission.
    pub fn set_executor(&self, policy: Arc<dyn ExecutionPolicy>) {
        *self.executor.write() = Some(policy);
    }

    pub fn executor_config(&self) -> &ExecutorConfig {
        &self.executor_config
    }

    // ─── Applications ───────────────────────────────────────────

    pub fn add_application(&self, namespace: &str) -> Arc<Application> {
        let app = Arc::new(Application::new(&self.namespace, namespace));
        self.apps.insert(namespace.to_string(), app.clone());
        app
    }

    pub fn application(&self, namespace: &str) -> Option<Arc<Application>> {
        self.apps.get(namespace).map(|a| a.value().clone())
    }

    pub fn remove_application(&self, namespace: &str) -> Option<Arc<Application>> {
        self.apps.remove(namespace).map(|(_, a)| a)
    }

    pub fn applications(&self) -> Vec<String> {
        let mut names: Vec<String> = self.apps.iter().map(|a| a.key().clone()).collect();
        names.sort();
        names
    }

    // ─── Bindings ───────────────────────────────────────────────

    /// Add or replace a binding. Resources created under a replaced binding
    /// are recycled.
    pub fn add_binding(
        &self,
        kind: &str,
        name: &str,
        binding: FeatureBinding,
        overwrite: bool,
    ) -> Result<Option<FeatureBinding>> {
        let replaced = self.bindings.insert(kind, name, binding, overwrite)?;
        if replaced.is_some() {
            self.recycle_binding(kind, name);
        }
        Ok(replaced)
    }

    /// Remove a binding and recycle every resource created under it.
    pub fn remove_binding(&self, kind: &str, name: &str) -> Option<FeatureBinding> {
        let removed = self.bindings.remove(kind, name)?;
        self.recycle_binding(kind, name);
        Some(removed)
    }

    // ─── Recyclables ────────────────────────────────────────────

    /// Key under which a feature keeps resources for `kind`/`name`
    /// (`name` may carry a `#subname`).
    pub fn recyclable_key(kind: &str, name: &str) -> String {
        format!("{}/{}", kind.to_lowercase(), name)
    }

    /// Hold `resource` under `key`, recycling whatever was held there before.
    pub fn add_recyclable<R: Recyclable + 'static>(&self, key: &str, resource: Arc<R>) {
        let held = Held {
            handle: resource.clone(),
            recyclable: resource,
        };
        if let Some(previous) = self.recyclables.insert(key.to_string(), held) {
            previous.recyclable.recycle();
        }
    }

    pub fn recyclable<R: Recyclable + 'static>(&self, key: &str) -> Option<Arc<R>> {
        let handle = self.recyclables.get(key)?.handle.clone();
        handle.downcast::<R>().ok()
    }

    /// Forget `key` without recycling it.
    pub fn remove_recyclable(&self, key: &str) -> bool {
        self.recyclables.remove(key).is_some()
    }

    pub fn recyclable_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.recyclables.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    fn recycle_binding(&self, kind: &str, name: &str) {
        let key = Self::recyclable_key(kind, name);
        let prefix = format!("{key}#");
        let stale: Vec<String> = self
            .recyclables
            .iter()
            .map(|e| e.key().clone())
            .filter(|k| *k == key || k.starts_with(&prefix))
            .collect();
        for k in stale {
            if let Some((_, held)) = self.recyclables.remove(&k) {
                tracing::debug!("Recycling {k} in space {}", self.namespace);
                held.recyclable.recycle();
            }
        }
    }

    fn recycle_all(&self) {
        let keys: Vec<String> = self.recyclables.iter().map(|e| e.key().clone()).collect();
        for k in keys {
            if let Some((_, held)) = self.recyclables.remove(&k) {
                held.recyclable.recycle();
            }
        }
    }
}

/// The server's spaces, keyed by namespace.
#[derive(Default)]
pub struct Spaces {
    spaces: DashMap<String, Arc<Space>>,
}

impl Spaces {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, namespace: &str) -> Option<Arc<Space>> {
        self.spaces.get(namespace).map(|s| s.value().clone())
    }

    /// Register a space, returning the one it replaced.
    pub fn insert(&self, space: Arc<Space>) -> Option<Arc<Space>> {
        self.spaces.insert(space.namespace().to_string(), space)
    }

    pub fn remove(&self, namespace: &str) -> Option<Arc<Space>> {
        self.spaces.remove(namespace).map(|(_, s)| s)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.spaces.iter().map(|s| s.key().clone()).collect();
        names.sort();
        names
    }

    pub fn all(&self) -> Vec<Arc<Space>> {
        self.spaces.iter().map(|s| s.value().clone()).collect()
    }
}
