//! The on-disk binary cache store.
//!
//! Base directory chosen per OS conventions (`$XDG_CACHE_HOME`, else
//! `$HOME/.cache`, else OS temp), with a project-specific subdirectory
//! derived by hashing the project root's absolute path so that projects
//! sharing a cache root don't collide.

use color_eyre::{Result, eyre::Context};
use sha2::{Digest, Sha256};

use crate::{
    cachekey::CacheKey,
    fs,
    path::{AbsDirPath, AbsFilePath, TryJoinWith},
};

/// Subdirectory name under `$XDG_CACHE_HOME` or `$HOME/.cache`.
const CACHE_DIR_NAME: &str = "targ";

/// Subdirectory name used when neither `$XDG_CACHE_HOME` nor `$HOME` is set
/// and the cache base falls all the way back to OS temp space.
const TEMP_FALLBACK_DIR_NAME: &str = "targ-cache";

/// Number of hex digits of the project-root hash used as the project
/// subdirectory name.
const PROJECT_ID_HEX_LEN: usize = 16;

/// A project's cache directory: `bin/` for binaries, `tmp/` for transient
/// driver sources during a build.
#[derive(Clone, Debug)]
pub struct CacheStore {
    project_dir: AbsDirPath,
}

impl CacheStore {
    /// Resolve the cache store for the project rooted at `project_root`.
    #[tracing::instrument(fields(project_root = %project_root))]
    pub fn open(project_root: &AbsDirPath) -> Result<Self> {
        let (base, dir_name) = cache_base()?;
        let project_id = project_id(project_root);
        let project_dir = base.try_join_dir(dir_name)?.try_join_dir(&project_id)?;
        Ok(Self { project_dir })
    }

    /// Resolve the cache store rooted at an explicit base directory,
    /// bypassing environment-variable discovery. Used by tests.
    pub fn open_at(base: AbsDirPath, project_root: &AbsDirPath) -> Result<Self> {
        let project_id = project_id(project_root);
        let project_dir = base
            .try_join_dir(CACHE_DIR_NAME)?
            .try_join_dir(&project_id)?;
        Ok(Self { project_dir })
    }

    fn bin_dir(&self) -> Result<AbsDirPath> {
        self.project_dir.try_join_dir("bin")
    }

    /// The directory transient driver sources are written to during a build.
    pub fn tmp_dir(&self) -> Result<AbsDirPath> {
        self.project_dir.try_join_dir("tmp")
    }

    /// The path a binary for `prefix`/`cache_key` would live at, whether or
    /// not it currently exists.
    pub fn bin_path(&self, prefix: &str, cache_key: &CacheKey) -> Result<AbsFilePath> {
        self.bin_dir()?.try_join_file(format!("{prefix}_{cache_key}"))
    }

    /// Look up a cache entry. A hit requires the file to exist, be a regular
    /// file, and have any execute bit set.
    #[tracing::instrument(skip(self), fields(prefix, cache_key = %cache_key))]
    pub async fn lookup(&self, prefix: &str, cache_key: &CacheKey) -> Result<Option<AbsFilePath>> {
        let path = self.bin_path(prefix, cache_key)?;
        if fs::is_file(path.as_std_path()).await && fs::is_executable(path.as_std_path()).await {
            Ok(Some(path))
        } else {
            Ok(None)
        }
    }

    /// Install a freshly built binary at `src` into the cache under
    /// `prefix`/`cache_key`, marking it executable.
    #[tracing::instrument(skip(self, src), fields(prefix, cache_key = %cache_key))]
    pub async fn store_binary(
        &self,
        prefix: &str,
        cache_key: &CacheKey,
        src: &AbsFilePath,
    ) -> Result<AbsFilePath> {
        let dest = self.bin_path(prefix, cache_key)?;
        fs::copy_file(src, &dest).await?;
        fs::set_executable(&dest).await?;
        Ok(dest)
    }
}

/// Resolve the cache base directory and the subdirectory name to nest under
/// it. The subdirectory name differs for the OS-temp fallback (`targ-cache`)
/// versus `$XDG_CACHE_HOME`/`$HOME/.cache` (`targ`).
fn cache_base() -> Result<(AbsDirPath, &'static str)> {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        if !xdg.is_empty() {
            let base =
                AbsDirPath::try_from(xdg).context("XDG_CACHE_HOME is not an absolute path")?;
            return Ok((base, CACHE_DIR_NAME));
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        if !home.is_empty() {
            let base = AbsDirPath::try_from(home)
                .context("HOME is not an absolute path")?
                .try_join_dir(".cache")?;
            return Ok((base, CACHE_DIR_NAME));
        }
    }
    let base =
        AbsDirPath::try_from(std::env::temp_dir()).context("OS temp dir is not absolute")?;
    Ok((base, TEMP_FALLBACK_DIR_NAME))
}

fn project_id(project_root: &AbsDirPath) -> String {
    let mut hasher = Sha256::new();
    hasher.update(project_root.as_str_lossy().as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)[..PROJECT_ID_HEX_LEN].to_string()
}
