// src/plugins/descriptor.rs — Plugin descriptor (plugin.toml / plugin.json)
//
// The descriptor is read as an untyped value first so that `[prefix.key]`
// placeholders can be substituted anywhere in it, then deserialized into
// `PluginDescriptor`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::infra::errors::{Result, SpaceportError};

pub const DESCRIPTOR_TOML: &str = "plugin.toml";
pub const DESCRIPTOR_JSON: &str = "plugin.json";

/// How to build a bean (plugin SPI or diagnostic sink) through a module unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeanSpec {
    pub class: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDescriptor {
    pub namespace: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub classpath: Vec<String>,
    #[serde(default)]
    pub spi: Option<BeanSpec>,
    /// Teardown order only; lower weights are torn down first.
    #[serde(default)]
    pub weight: i32,
    #[serde(default = "default_true")]
    pub install: bool,
    #[serde(default, rename = "async")]
    pub is_async: bool,
    #[serde(default = "default_true")]
    pub closable: bool,
    #[serde(default = "default_true")]
    pub isolated: bool,
    #[serde(default)]
    pub init_on_install: bool,
    #[serde(default)]
    pub system_properties: BTreeMap<String, String>,
    #[serde(default)]
    pub tracer: Option<BeanSpec>,
    /// `"<os>/<arch>"` → subpath of the plugin home holding native resources.
    #[serde(default)]
    pub native: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

/// Namespaces are non-empty and limited to ASCII letters, digits, `_`, `-` and `.`.
pub fn is_valid_namespace(ns: &str) -> bool {
    !ns.is_empty()
        && ns
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Locate the descriptor file inside a plugin home.
pub fn descriptor_path(home: &Path) -> Option<PathBuf> {
    [DESCRIPTOR_TOML, DESCRIPTOR_JSON]
        .iter()
        .map(|f| home.join(f))
        .find(|p| p.is_file())
}

/// Read a descriptor into an untyped value.
pub fn load_raw(home: &Path) -> Result<Value> {
    let path = descriptor_path(home).ok_or_else(|| {
        SpaceportError::Config(format!(
            "no {DESCRIPTOR_TOML} or {DESCRIPTOR_JSON} in {}",
            home.display()
        ))
    })?;
    let content = std::fs::read_to_string(&path)?;
    let json = path.extension().is_some_and(|e| e == "json");
    parse_raw(&content, json, &path.display().to_string())
}

/// Parse descriptor text (TOML, or JSON when `json` is set). `origin` only
/// labels errors.
pub fn parse_raw(content: &str, json: bool, origin: &str) -> Result<Value> {
    let value = if json {
        serde_json::from_str(content)
            .map_err(|e| SpaceportError::Config(format!("{origin}: {e}")))?
    } else {
        toml::from_str(content).map_err(|e| SpaceportError::Config(format!("{origin}: {e}")))?
    };
    Ok(value)
}

/// Extract and validate the namespace of an untyped descriptor.
pub fn namespace_of(raw: &Value, home: &Path) -> Result<String> {
    let ns = raw
        .get("namespace")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            SpaceportError::Config(format!(
                "plugin namespace not found in descriptor {}",
                home.display()
            ))
        })?;
    if !is_valid_namespace(ns) {
        return Err(SpaceportError::Config(format!(
            "invalid plugin namespace '{ns}'"
        )));
    }
    Ok(ns.to_string())
}

/// Replace every `[prefix.key]` placeholder in string values for which
/// `lookup(prefix, key)` yields a value. Unknown placeholders stay verbatim.
pub fn resolve_placeholders<F>(value: &mut Value, lookup: &F)
where
    F: Fn(&str, &str) -> Option<String>,
{
    match value {
        Value::String(s) => {
            if s.contains('[') {
                *s = substitute(s, lookup);
            }
        }
        Value::Array(items) => {
            for item in items {
                resolve_placeholders(item, lookup);
            }
        }
        Value::Object(map) => {
            for (_, v) in map.iter_mut() {
                resolve_placeholders(v, lookup);
            }
        }
        _ => {}
    }
}

fn substitute<F>(input: &str, lookup: &F) -> String
where
    F: Fn(&str, &str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find('[') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find(']') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let token = &after[..end];
        let replaced = token
            .split_once('.')
            .and_then(|(prefix, key)| lookup(prefix, key));
        match replaced {
            Some(v) => out.push_str(&v),
            None => {
                out.push('[');
                out.push_str(token);
                out.push(']');
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

impl PluginDescriptor {
    /// Deserialize an already resolved descriptor value.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| SpaceportError::Config(format!("malformed plugin descriptor: {e}")))
    }

    /// Load, validate and deserialize a descriptor without placeholder
    /// resolution. Used by `spaceport check`.
    pub fn load(home: &Path) -> Result<Self> {
        let raw = load_raw(home)?;
        namespace_of(&raw, home)?;
        Self::from_value(raw)
    }
}
