// src/plugins/archive.rs — Single-file plugin units (.xpl zip archives)

use serde_json::Value;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::infra::errors::{Result, SpaceportError};
use crate::plugins::descriptor::{self, DESCRIPTOR_JSON, DESCRIPTOR_TOML};

pub const PLUGIN_EXT: &str = "xpl";

pub fn is_archive(path: &Path) -> bool {
    path.is_file() && path.extension().is_some_and(|e| e == PLUGIN_EXT)
}

/// Unpack `archive` into a sibling directory named after its stem, then
/// delete the archive. Returns the new plugin home.
pub fn unpack(archive: &Path) -> Result<PathBuf> {
    let stem = archive
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| {
            SpaceportError::Config(format!("bad plugin archive name {}", archive.display()))
        })?;
    let home = archive
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(stem);

    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| {
        SpaceportError::Config(format!("unreadable plugin archive {}: {e}", archive.display()))
    })?;
    std::fs::create_dir_all(&home)?;
    zip.extract(&home).map_err(|e| {
        SpaceportError::Config(format!("can't unpack {}: {e}", archive.display()))
    })?;
    std::fs::remove_file(archive)?;

    tracing::debug!("Unpacked {} into {}", archive.display(), home.display());
    Ok(home)
}

/// Read the untyped descriptor straight out of an archive, without unpacking.
pub fn read_descriptor(archive: &Path) -> Result<Value> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| {
        SpaceportError::Config(format!("unreadable plugin archive {}: {e}", archive.display()))
    })?;
    for name in [DESCRIPTOR_TOML, DESCRIPTOR_JSON] {
        let Ok(mut entry) = zip.by_name(name) else {
            continue;
        };
        let mut content = String::new();
        entry.read_to_string(&mut content)?;
        let origin = format!("{}!{name}", archive.display());
        return descriptor::parse_raw(&content, name == DESCRIPTOR_JSON, &origin);
    }
    Err(SpaceportError::Config(format!(
        "no {DESCRIPTOR_TOML} or {DESCRIPTOR_JSON} in {}",
        archive.display()
    )))
}
