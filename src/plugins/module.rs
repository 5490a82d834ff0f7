// src/plugins/module.rs — Module units: per-plugin resolution scopes
//
// A module unit is the boundary a plugin's code runs within. It owns the
// plugin's resource list and a table of typed exports. Names resolve through
// the unit itself, then its dependency edges, then its parent scope (the
// server's root unit). Factories compiled into the host are exported into the
// root unit at composition time; plugins may export their own handles for
// others, which reach them via `add_dependency`.
//
// `invoke` makes a unit the thread's current scope for the duration of a call
// and restores the previous one on every exit path, unwinding included.

use parking_lot::RwLock;
use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::infra::errors::{Result, SpaceportError};
use crate::plugins::native::{self, NativeResources, Platform};
use crate::plugins::plugin::Plugin;

pub type Export = Arc<dyn Any + Send + Sync>;

thread_local! {
    static CURRENT: RefCell<Option<Arc<ModuleUnit>>> = const { RefCell::new(None) };
}

pub struct ModuleUnit {
    name: String,
    resources: Vec<PathBuf>,
    native: Option<PathBuf>,
    parent: Option<Arc<ModuleUnit>>,
    dependencies: RwLock<Vec<Arc<ModuleUnit>>>,
    exports: RwLock<HashMap<String, Export>>,
    owner: RwLock<Option<Arc<dyn Plugin>>>,
    cleared: AtomicBool,
}

impl std::fmt::Debug for ModuleUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleUnit")
            .field("name", &self.name)
            .field("resources", &self.resources.len())
            .field("dependencies", &self.dependencies.read().len())
            .field("cleared", &self.is_cleared())
            .finish()
    }
}

impl ModuleUnit {
    /// A scope with no parent, used as the server's own scope.
    pub fn root(name: &str) -> Arc<Self> {
        Arc::new(Self::bare(name, Vec::new(), None, None))
    }

    fn bare(
        name: &str,
        resources: Vec<PathBuf>,
        native: Option<PathBuf>,
        parent: Option<Arc<ModuleUnit>>,
    ) -> Self {
        Self {
            name: name.to_string(),
            resources,
            native,
            parent,
            dependencies: RwLock::new(Vec::new()),
            exports: RwLock::new(HashMap::new()),
            owner: RwLock::new(None),
            cleared: AtomicBool::new(false),
        }
    }

    /// Create a plugin's unit. Fails right away when the plugin requires
    /// native resources that are not present for the current platform.
    pub fn create(
        name: &str,
        home: &Path,
        classpath: &[String],
        native_decl: &BTreeMap<String, String>,
        parent: Arc<ModuleUnit>,
    ) -> Result<Arc<Self>> {
        let native = match native::locate(home, native_decl, &Platform::current()) {
            NativeResources::NotRequired => None,
            NativeResources::Found(path) => Some(path),
            NativeResources::Missing { expected } => {
                return Err(SpaceportError::Dependency {
                    namespace: name.to_string(),
                    expected,
                })
            }
        };
        let resources = expand_resources(home, classpath);
        Ok(Arc::new(Self::bare(name, resources, native, Some(parent))))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resources(&self) -> &[PathBuf] {
        &self.resources
    }

    /// Native resource folder selected for this platform, if any.
    pub fn native_path(&self) -> Option<&Path> {
        self.native.as_deref()
    }

    pub fn parent(&self) -> Option<&Arc<ModuleUnit>> {
        self.parent.as_ref()
    }

    /// Let this unit resolve names exported by `other`.
    pub fn add_dependency(&self, other: Arc<ModuleUnit>) {
        if std::ptr::eq(self, Arc::as_ptr(&other)) {
            return;
        }
        let mut deps = self.dependencies.write();
        if !deps.iter().any(|d| Arc::ptr_eq(d, &other)) {
            tracing::debug!("Module {} now depends on {}", self.name, other.name);
            deps.push(other);
        }
    }

    pub fn dependencies(&self) -> Vec<Arc<ModuleUnit>> {
        self.dependencies.read().clone()
    }

    pub fn export<T: Any + Send + Sync>(&self, name: &str, value: T) {
        self.export_arc(name, Arc::new(value));
    }

    pub fn export_arc(&self, name: &str, value: Export) {
        self.exports.write().insert(name.to_string(), value);
    }

    /// Resolve `name` as a `T`, searching this unit, its dependencies, then
    /// its parent.
    pub fn resolve<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        let mut visited = Vec::new();
        self.lookup(name, &mut visited)
            .and_then(|export| export.downcast::<T>().ok())
    }

    fn lookup(&self, name: &str, visited: &mut Vec<*const ModuleUnit>) -> Option<Export> {
        let me = self as *const ModuleUnit;
        if visited.contains(&me) {
            return None;
        }
        visited.push(me);

        if let Some(found) = self.exports.read().get(name) {
            return Some(found.clone());
        }
        for dep in self.dependencies() {
            if let Some(found) = dep.lookup(name, visited) {
                return Some(found);
            }
        }
        self.parent.as_ref().and_then(|p| p.lookup(name, visited))
    }

    /// Run `f` with this unit as the thread's current scope.
    pub fn invoke<R>(self: &Arc<Self>, f: impl FnOnce() -> R) -> R {
        let _guard = ScopeGuard::enter(self.clone());
        f()
    }

    /// The unit whose `invoke` the current thread is inside of, if any.
    pub fn current() -> Option<Arc<ModuleUnit>> {
        CURRENT.with(|c| c.borrow().clone())
    }

    pub fn set_owner(&self, plugin: Arc<dyn Plugin>) {
        *self.owner.write() = Some(plugin);
    }

    pub fn owner(&self) -> Option<Arc<dyn Plugin>> {
        self.owner.read().clone()
    }

    /// Drop every reference this unit holds. Handles already resolved from it
    /// stay alive for as long as their holders keep them.
    pub fn clear(&self) {
        self.exports.write().clear();
        self.dependencies.write().clear();
        *self.owner.write() = None;
        self.cleared.store(true, Ordering::SeqCst);
    }

    pub fn is_cleared(&self) -> bool {
        self.cleared.load(Ordering::SeqCst)
    }
}

struct ScopeGuard {
    previous: Option<Arc<ModuleUnit>>,
}

impl ScopeGuard {
    fn enter(unit: Arc<ModuleUnit>) -> Self {
        let previous = CURRENT.with(|c| c.borrow_mut().replace(unit));
        Self { previous }
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|c| *c.borrow_mut() = previous);
    }
}

/// Expand a classpath-like list against a plugin home: files are taken as is,
/// directories contribute themselves and their direct children, glob patterns
/// are expanded, missing entries are skipped. The home is always included.
/// With an empty list the home and its `lib/` folder are used.
fn expand_resources(home: &Path, classpath: &[String]) -> Vec<PathBuf> {
    let mut out = vec![home.to_path_buf()];
    let entries: Vec<String> = if classpath.is_empty() {
        vec!["lib".to_string()]
    } else {
        classpath.to_vec()
    };

    for entry in entries {
        let candidate = home.join(&entry);
        if entry.contains(['*', '?', '[']) {
            let pattern = candidate.to_string_lossy().to_string();
            if let Ok(paths) = glob::glob(&pattern) {
                out.extend(paths.flatten());
            }
        } else if candidate.is_file() {
            out.push(candidate);
        } else if candidate.is_dir() {
            out.push(candidate.clone());
            if let Ok(children) = std::fs::read_dir(&candidate) {
                let mut children: Vec<PathBuf> =
                    children.flatten().map(|e| e.path()).collect();
                children.sort();
                out.extend(children);
            }
        }
    }
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child(name: &str, parent: &Arc<ModuleUnit>) -> Arc<ModuleUnit> {
        let dir = tempfile::tempdir().unwrap();
        ModuleUnit::create(name, dir.path(), &[], &BTreeMap::new(), parent.clone()).unwrap()
    }

    #[test]
    fn test_resolve_self_then_parent() {
        let root = ModuleUnit::root("server");
        root.export("greeting", String::from("from root"));
        let unit = child("store", &root);

        assert_eq!(*unit.resolve::<String>("greeting").unwrap(), "from root");

        unit.export("greeting", String::from("from store"));
        assert_eq!(*unit.resolve::<String>("greeting").unwrap(), "from store");
        assert!(unit.resolve::<u32>("greeting").is_none());
    }

    #[test]
    fn test_dependency_added_after_creation() {
        let root = ModuleUnit::root("server");
        let a = child("a", &root);
        let b = child("b", &root);
        b.export("b.client", 42u32);

        assert!(a.resolve::<u32>("b.client").is_none());
        a.add_dependency(b.clone());
        assert_eq!(*a.resolve::<u32>("b.client").unwrap(), 42);

        // duplicates and self edges are ignored
        a.add_dependency(b.clone());
        a.add_dependency(a.clone());
        assert_eq!(a.dependencies().len(), 1);
    }

    #[test]
    fn test_dependency_cycles_terminate() {
        let root = ModuleUnit::root("server");
        let a = child("a", &root);
        let b = child("b", &root);
        a.add_dependency(b.clone());
        b.add_dependency(a.clone());
        assert!(a.resolve::<u32>("nowhere").is_none());
    }

    #[test]
    fn test_invoke_restores_previous_scope() {
        let root = ModuleUnit::root("server");
        let a = child("a", &root);
        let b = child("b", &root);

        assert!(ModuleUnit::current().is_none());
        a.invoke(|| {
            assert_eq!(ModuleUnit::current().unwrap().name(), "a");
            b.invoke(|| {
                assert_eq!(ModuleUnit::current().unwrap().name(), "b");
            });
            assert_eq!(ModuleUnit::current().unwrap().name(), "a");
        });
        assert!(ModuleUnit::current().is_none());
    }

    #[test]
    fn test_invoke_restores_on_error() {
        let root = ModuleUnit::root("server");
        let a = child("a", &root);
        let result: anyhow::Result<()> = a.invoke(|| anyhow::bail!("init failed"));
        assert!(result.is_err());
        assert!(ModuleUnit::current().is_none());
    }

    #[test]
    fn test_invoke_restores_on_panic() {
        let root = ModuleUnit::root("server");
        let a = child("a", &root);
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            a.invoke(|| panic!("boom"));
        }));
        assert!(outcome.is_err());
        assert!(ModuleUnit::current().is_none());
    }

    #[test]
    fn test_clear_drops_references() {
        let root = ModuleUnit::root("server");
        let a = child("a", &root);
        let b = child("b", &root);
        a.export("x", 1u8);
        a.add_dependency(b);
        a.clear();

        assert!(a.is_cleared());
        assert!(a.dependencies().is_empty());
        assert!(a.owner().is_none());
        assert!(a.resolve::<u8>("x").is_none());
    }

    #[test]
    fn test_resources_expansion() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path();
        std::fs::write(home.join("a.res"), b"a").unwrap();
        std::fs::create_dir_all(home.join("lib")).unwrap();
        std::fs::write(home.join("lib/one.res"), b"1").unwrap();
        std::fs::write(home.join("lib/two.res"), b"2").unwrap();

        let cp = vec![
            "a.res".to_string(),
            "lib".to_string(),
            "missing.res".to_string(),
        ];
        let resources = expand_resources(home, &cp);
        assert_eq!(resources[0], home);
        assert!(resources.contains(&home.join("a.res")));
        assert!(resources.contains(&home.join("lib/one.res")));
        assert!(resources.contains(&home.join("lib/two.res")));
        assert!(!resources.contains(&home.join("missing.res")));

        let globbed = expand_resources(home, &["lib/*.res".to_string()]);
        assert_eq!(globbed.len(), 3);
    }

    #[test]
    fn test_missing_native_fails_at_creation() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("native/plan9/mips")).unwrap();
        let err = ModuleUnit::create(
            "nat",
            dir.path(),
            &[],
            &BTreeMap::new(),
            ModuleUnit::root("server"),
        )
        .unwrap_err();
        assert!(matches!(err, SpaceportError::Dependency { .. }));
    }
}
