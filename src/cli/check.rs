// src/cli/check.rs — Validate plugin descriptors without installing them

use std::path::{Path, PathBuf};

use crate::plugins::archive;
use crate::plugins::descriptor::{self, PluginDescriptor};

/// Print one line per unit under `dir`. Fails if any unit is invalid.
pub fn run_check(dir: &str) -> anyhow::Result<()> {
    let root = Path::new(dir);
    let mut units: Vec<PathBuf> = std::fs::read_dir(root)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir() || archive::is_archive(p))
        .collect();
    units.sort();

    let mut failed = 0;
    for unit in &units {
        match check_unit(unit) {
            Ok(d) => println!("  ok    {} {} {}", d.namespace, version(&d), flags(&d)),
            Err(e) => {
                failed += 1;
                println!("  FAIL  {}: {e}", unit.display());
            }
        }
    }

    println!();
    println!("{} unit(s), {} invalid", units.len(), failed);
    if failed > 0 {
        anyhow::bail!("{failed} invalid plugin unit(s) under {}", root.display());
    }
    Ok(())
}

fn check_unit(unit: &Path) -> anyhow::Result<PluginDescriptor> {
    if !archive::is_archive(unit) {
        return Ok(PluginDescriptor::load(unit)?);
    }
    let raw = archive::read_descriptor(unit)?;
    descriptor::namespace_of(&raw, unit)?;
    Ok(PluginDescriptor::from_value(raw)?)
}

fn version(d: &PluginDescriptor) -> &str {
    if d.version.is_empty() {
        "-"
    } else {
        &d.version
    }
}

fn flags(d: &PluginDescriptor) -> String {
    let mut flags = vec![format!("weight={}", d.weight)];
    if !d.install {
        flags.push("skipped".into());
    }
    if d.is_async {
        flags.push("async".into());
    }
    if d.init_on_install {
        flags.push("init-on-install".into());
    }
    if d.spi.is_none() {
        flags.push("inert".into());
    }
    format!("({})", flags.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(root: &Path, dir: &str, descriptor: &str) {
        let home = root.join(dir);
        std::fs::create_dir_all(&home).unwrap();
        std::fs::write(home.join("plugin.toml"), descriptor).unwrap();
    }

    #[test]
    fn test_check_accepts_valid_units() {
        let dir = tempfile::tempdir().unwrap();
        unit(dir.path(), "store", "namespace = \"store\"\nversion = \"1.0\"\n");
        unit(dir.path(), "lazy", "namespace = \"lazy\"\nasync = true\n");
        assert!(run_check(dir.path().to_str().unwrap()).is_ok());
    }

    #[test]
    fn test_check_fails_on_invalid_unit() {
        let dir = tempfile::tempdir().unwrap();
        unit(dir.path(), "store", "namespace = \"store\"\n");
        unit(dir.path(), "broken", "namespace = \"not valid\"\n");
        let err = run_check(dir.path().to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("1 invalid"));
    }

    #[test]
    fn test_flags_summary() {
        let d = PluginDescriptor::from_value(serde_json::json!({
            "namespace": "lazy",
            "weight": 3,
            "async": true,
            "initOnInstall": true,
        }))
        .unwrap();
        assert_eq!(version(&d), "-");
        assert_eq!(flags(&d), "(weight=3, async, init-on-install, inert)");
    }
}
