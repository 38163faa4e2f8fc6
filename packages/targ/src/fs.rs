//! Thin async wrappers over real disk I/O.
//!
//! Unlike [`crate::filesystem::Filesystem`], this module is not swappable:
//! the cache store, the compiler driver, and the isolated-module builder all
//! specifically manage on-disk artifacts, so faking this out would just move
//! the thing under test somewhere else. Only discovery's directory walk
//! needs to be injectable, and that lives behind `Filesystem` instead.

use std::path::Path;

use color_eyre::{Result, eyre::Context};

use crate::path::{AbsDirPath, AbsFilePath};

/// Create `dir` and all of its ancestors if they don't already exist.
pub async fn create_dir_all(dir: &AbsDirPath) -> Result<()> {
    tokio::fs::create_dir_all(dir.as_std_path())
        .await
        .with_context(|| format!("create directory {dir:?}"))
}

/// Read the full contents of a file.
pub async fn read(path: &AbsFilePath) -> Result<Vec<u8>> {
    tokio::fs::read(path.as_std_path())
        .await
        .with_context(|| format!("read {path:?}"))
}

/// Read the full contents of a file as UTF-8.
pub async fn read_to_string(path: &AbsFilePath) -> Result<String> {
    tokio::fs::read_to_string(path.as_std_path())
        .await
        .with_context(|| format!("read {path:?} as utf-8"))
}

/// Write `contents` to `path`, creating the parent directory if needed.
pub async fn write(path: &AbsFilePath, contents: impl AsRef<[u8]>) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(&parent).await?;
    }
    tokio::fs::write(path.as_std_path(), contents.as_ref())
        .await
        .with_context(|| format!("write {path:?}"))
}

/// Copy a single file, creating the destination's parent directory if
/// needed.
pub async fn copy_file(from: &AbsFilePath, to: &AbsFilePath) -> Result<()> {
    if let Some(parent) = to.parent() {
        create_dir_all(&parent).await?;
    }
    tokio::fs::copy(from.as_std_path(), to.as_std_path())
        .await
        .with_context(|| format!("copy {from:?} to {to:?}"))?;
    Ok(())
}

/// Remove a directory and everything under it. Missing directories are not
/// an error.
pub async fn remove_dir_all(dir: &AbsDirPath) -> Result<()> {
    match tokio::fs::remove_dir_all(dir.as_std_path()).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("remove directory {dir:?}")),
    }
}

/// Remove a single file. Missing files are not an error.
pub async fn remove_file(path: &AbsFilePath) -> Result<()> {
    match tokio::fs::remove_file(path.as_std_path()).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("remove file {path:?}")),
    }
}

/// Whether `path` exists (following symlinks).
pub async fn exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}

/// Whether `path` is a regular file.
pub async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Whether `path` is a directory.
pub async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

/// Whether `path` has any execute bit set.
///
/// Used by the cache store's hit check: per the contract, a hit requires the
/// binary to exist, be a regular file, and have any execute bit set.
pub async fn is_executable(path: &Path) -> bool {
    let path = path.to_owned();
    tokio::task::spawn_blocking(move || is_executable::is_executable(&path))
        .await
        .unwrap_or(false)
}

/// Set the owner/group/other execute bits on `path`.
#[cfg(unix)]
pub async fn set_executable(path: &AbsFilePath) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let std_path = path.as_std_path().to_owned();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let metadata = std::fs::metadata(&std_path)
            .with_context(|| format!("stat {std_path:?} before chmod"))?;
        let mut perms = metadata.permissions();
        perms.set_mode(perms.mode() | 0o111);
        std::fs::set_permissions(&std_path, perms)
            .with_context(|| format!("chmod +x {std_path:?}"))
    })
    .await
    .with_context(|| format!("join chmod task for {path:?}"))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = AbsFilePath::try_from(dir.path().join("out.txt")).unwrap();
        write(&path, b"hello").await.unwrap();
        assert_eq!(read(&path).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn set_executable_makes_file_executable() {
        let dir = tempfile::tempdir().unwrap();
        let path = AbsFilePath::try_from(dir.path().join("bin")).unwrap();
        write(&path, b"#!/bin/sh\n").await.unwrap();
        assert!(!is_executable(path.as_std_path()).await);
        set_executable(&path).await.unwrap();
        assert!(is_executable(path.as_std_path()).await);
    }

    #[tokio::test]
    async fn remove_dir_all_missing_is_not_an_error() {
        let dir = AbsDirPath::try_from("/nonexistent-targ-test-dir").unwrap();
        remove_dir_all(&dir).await.unwrap();
    }
}
