//! Path resolution for .npmrc configuration files.
//!
//! This module finds the default project and user `.npmrc` locations
//! following npm's resolution logic.

use std::path::{Path, PathBuf};

/// Walk up from the given directory looking for the first directory containing
/// either a `package.json` file or a `node_modules` directory.
///
/// Falls back to the starting directory if nothing is found.
pub fn find_local_prefix(cwd: &Path) -> PathBuf {
    let mut current = cwd.to_path_buf();

    loop {
        if current.join("package.json").is_file() || current.join("node_modules").is_dir() {
            return current;
        }

        match current.parent() {
            Some(parent) if parent != current => {
                current = parent.to_path_buf();
            }
            _ => break,
        }
    }

    cwd.to_path_buf()
}

/// Get the path to the user's .npmrc file (`~/.npmrc`).
///
/// Returns `None` if the home directory cannot be determined.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".npmrc"))
}

/// Get the path to the project .npmrc file (`{localPrefix}/.npmrc`).
pub fn project_config_path(prefix: &Path) -> PathBuf {
    prefix.join(".npmrc")
}

/// Expand `~` at the start of a path to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Whether two paths name the same file.
///
/// Existing files are compared by their canonical path (so symlinks and `..`
/// are resolved); paths that do not exist are compared in absolute form.
pub fn same_file(a: &Path, b: &Path) -> bool {
    normalize(a) == normalize(b)
}

fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
