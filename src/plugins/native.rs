// src/plugins/native.rs — Platform-specific native resources

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Conventional folder under a plugin home holding `<os>/<arch>` subfolders.
pub const NATIVE_DIR: &str = "native";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }

    pub fn key(&self) -> String {
        format!("{}/{}", self.os, self.arch)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

/// Outcome of checking a plugin home for native resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeResources {
    /// The plugin declares none.
    NotRequired,
    Found(PathBuf),
    Missing { expected: PathBuf },
}

/// Locate the native resources a plugin needs on `platform`.
///
/// An explicit `declared` table (`"<os>/<arch>"` → subpath) takes precedence.
/// Otherwise a `native/` folder in the home means resources are required under
/// `native/<os>/<arch>`.
pub fn locate(
    home: &Path,
    declared: &BTreeMap<String, String>,
    platform: &Platform,
) -> NativeResources {
    if !declared.is_empty() {
        return match declared.get(&platform.key()) {
            Some(sub) => check(home.join(sub)),
            None => NativeResources::Missing {
                expected: home.join(NATIVE_DIR).join(&platform.os).join(&platform.arch),
            },
        };
    }

    let native = home.join(NATIVE_DIR);
    if !native.exists() {
        return NativeResources::NotRequired;
    }
    check(native.join(&platform.os).join(&platform.arch))
}

fn check(path: PathBuf) -> NativeResources {
    if path.exists() {
        NativeResources::Found(path)
    } else {
        NativeResources::Missing { expected: path }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linux() -> Platform {
        Platform {
            os: "linux".into(),
            arch: "x86_64".into(),
        }
    }

    #[test]
    fn test_no_native_folder_means_not_required() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            locate(dir.path(), &BTreeMap::new(), &linux()),
            NativeResources::NotRequired
        );
    }

    #[test]
    fn test_conventional_layout() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("native/windows/x86_64")).unwrap();
        assert!(matches!(
            locate(dir.path(), &BTreeMap::new(), &linux()),
            NativeResources::Missing { .. }
        ));

        std::fs::create_dir_all(dir.path().join("native/linux/x86_64")).unwrap();
        assert_eq!(
            locate(dir.path(), &BTreeMap::new(), &linux()),
            NativeResources::Found(dir.path().join("native/linux/x86_64"))
        );
    }

    #[test]
    fn test_declared_table_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("libs/l64")).unwrap();
        let mut declared = BTreeMap::new();
        declared.insert("linux/x86_64".to_string(), "libs/l64".to_string());
        assert_eq!(
            locate(dir.path(), &declared, &linux()),
            NativeResources::Found(dir.path().join("libs/l64"))
        );

        let mac = Platform {
            os: "macos".into(),
            arch: "aarch64".into(),
        };
        assert!(matches!(
            locate(dir.path(), &declared, &mac),
            NativeResources::Missing { .. }
        ));
    }
}
