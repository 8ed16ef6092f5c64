//! Crash-safe replacement of config files.

use crate::error::{Error, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Atomically replace the file at `path` with `content`.
///
/// 1. Write to a temporary file in the destination's directory (same filesystem).
/// 2. Copy the permissions of the existing file, if any.
/// 3. fsync the temporary file.
/// 4. Rename (atomic on POSIX) over the destination.
///
/// If `path` is a symlink, the file it points to is replaced and the link is
/// left in place. Readers never observe a partially written file.
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let path = resolve_symlink(path);
    let write_err = |source: std::io::Error| Error::WriteFile {
        path: path.clone(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;

    if let Ok(metadata) = fs::metadata(&path) {
        tmp.as_file()
            .set_permissions(metadata.permissions())
            .map_err(write_err)?;
    }

    tmp.write_all(content.as_bytes()).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;

    debug!(path = %path.display(), bytes = content.len(), "replacing config file");
    tmp.persist(&path).map_err(|e| write_err(e.error))?;

    Ok(())
}

/// Follow a symlinked destination to the real file. Paths that do not exist
/// yet are returned unchanged.
fn resolve_symlink(path: &Path) -> PathBuf {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => {
            fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
        }
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_creates_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("npmrc");

        write_atomic(&path, "registry=https://npm.pkg.dev/p/r/").unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "registry=https://npm.pkg.dev/p/r/"
        );
    }

    #[test]
    fn test_write_replaces_and_leaves_no_temp_files() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("npmrc");
        fs::write(&path, "old contents that are much longer than the new ones").unwrap();

        write_atomic(&path, "new").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        let names: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("npmrc")]);
    }

    #[test]
    fn test_write_missing_directory_fails() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("missing").join("npmrc");

        match write_atomic(&path, "x") {
            Err(Error::WriteFile { path: p, .. }) => assert_eq!(p, path),
            other => panic!("Expected WriteFile error, got: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_write_preserves_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("npmrc");
        fs::write(&path, "old").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        write_atomic(&path, "new").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }

    #[cfg(unix)]
    #[test]
    fn test_write_through_symlink() {
        let temp = tempfile::tempdir().unwrap();
        let real = temp.path().join("dotfiles-npmrc");
        let link = temp.path().join(".npmrc");
        fs::write(&real, "old").unwrap();
        std::os::unix::fs::symlink(&real, &link).unwrap();

        write_atomic(&link, "new").unwrap();

        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(&real).unwrap(), "new");
    }
}
