// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::infra::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub keys: KeysConfig,

    #[serde(default)]
    pub plugins: PluginsConfig,

    #[serde(default)]
    pub routing: RoutingConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Values available to descriptors as `[vars.<key>]`.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,

    #[serde(default)]
    pub spaces: Vec<SpaceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    pub id: String,
    pub name: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            id: "spaceport".into(),
            name: "Spaceport".into(),
        }
    }
}

/// The node's own credential material.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeysConfig {
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Discovery root; defaults to `<server home>/plugins`.
    #[serde(default)]
    pub home: Option<PathBuf>,
    /// Stop a discovery pass at the first unit that fails to install.
    #[serde(default = "default_true")]
    pub fail_fast: bool,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            home: None,
            fail_fast: true,
        }
    }
}

impl PluginsConfig {
    pub fn home(&self) -> PathBuf {
        self.home.clone().unwrap_or_else(paths::plugins_dir)
    }
}

/// Where the request visitor reads a routing target from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placeholder {
    /// Host name tokens split on `.`
    Endpoint,
    /// Path tokens split on `/`
    Path,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(default = "default_placeholder")]
    pub placeholder: Placeholder,
    /// Zero-based token index. Defaults to the target's position (0, 1, 2).
    #[serde(default)]
    pub index: Option<usize>,
    /// Literal value; skips token lookup entirely.
    #[serde(default)]
    pub value: Option<String>,
    /// Renames a resolved token (e.g. a public alias to the real namespace).
    #[serde(default)]
    pub mapping: HashMap<String, String>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            placeholder: Placeholder::Path,
            index: None,
            value: None,
            mapping: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default)]
    pub space: TargetConfig,
    #[serde(default)]
    pub api: TargetConfig,
    #[serde(default)]
    pub resource: TargetConfig,
    /// Exact request path → replacement path, applied before tokenizing.
    #[serde(default)]
    pub statics: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub workers: usize,
    pub queue: usize,
    pub timeout_ms: u64,
    pub await_termination_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            queue: 10,
            timeout_ms: 600_000,
            await_termination_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceConfig {
    pub namespace: String,
    /// Start the space's executor during boot.
    #[serde(default = "default_true")]
    pub start: bool,
    /// Applications hosted by the space; they start in the Running state.
    #[serde(default)]
    pub apps: Vec<String>,
    #[serde(default)]
    pub executor: Option<ExecutorConfig>,
    /// kind → name → binding
    #[serde(default)]
    pub features: BTreeMap<String, BTreeMap<String, BindingConfig>>,
}

impl SpaceConfig {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            start: true,
            apps: Vec::new(),
            executor: None,
            features: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingConfig {
    pub provider: String,
    #[serde(default)]
    pub spec: serde_json::Value,
}

fn default_true() -> bool {
    true
}

fn default_placeholder() -> Placeholder {
    Placeholder::Path
}

impl Config {
    /// Load config from file, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
