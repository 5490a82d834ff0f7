// src/infra/paths.rs — Server home and well-known locations
//
// All paths respect the SPACEPORT_HOME environment variable for isolation.
// When SPACEPORT_HOME is set, config, plugins and work files live under it.
// When unset, everything lives under ~/.spaceport/.

use directories::BaseDirs;
use std::path::PathBuf;

/// Returns the SPACEPORT_HOME override, if set.
fn spaceport_home() -> Option<PathBuf> {
    std::env::var_os("SPACEPORT_HOME").map(PathBuf::from)
}

/// Home directory of the current user, or the working directory when
/// none can be determined (containers without a passwd entry).
pub fn dirs_home() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Server home: $SPACEPORT_HOME/ or ~/.spaceport/
pub fn server_home() -> PathBuf {
    if let Some(home) = spaceport_home() {
        return home;
    }
    dirs_home().join(".spaceport")
}

pub fn config_file_path() -> PathBuf {
    server_home().join("config.toml")
}

/// Default plugin discovery root.
pub fn plugins_dir() -> PathBuf {
    server_home().join("plugins")
}
