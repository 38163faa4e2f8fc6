//! Cache-key computation.
//!
//! A pure function of (module path, module root, build tag, driver bytes,
//! sorted file set): feed labeled, `\0`-separated fields into SHA-256 so
//! distinct fields can never collide with each other, then hex-encode the
//! digest. This is the same shape as hashing a struct field-by-field rather
//! than concatenating its `Debug` output — labeled prefixes are what make it
//! safe to add fields later without silently changing what collides with
//! what.

use std::fmt;

use color_eyre::{Result, eyre::bail};
use sha2::{Digest, Sha256};

use crate::{model::TaggedFile, path::AbsDirPath};

/// Hex-encoded SHA-256 digest over a module's full input set.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compute the cache key for one module build.
    ///
    /// `tagged_files` need not be pre-sorted; this function sorts a copy by
    /// path before hashing so permutations of the input list never change
    /// the result.
    #[tracing::instrument(skip_all, fields(module_path, build_tag, num_files = tagged_files.len()))]
    pub fn from_fields(
        module_path: &str,
        module_root: &AbsDirPath,
        build_tag: &str,
        driver_source: &[u8],
        tagged_files: &[TaggedFile],
    ) -> Result<Self> {
        let mut hasher = Sha256::new();
        hasher.update(b"module:");
        hasher.update(module_path.as_bytes());
        hasher.update(b"\0");
        hasher.update(b"root:");
        hasher.update(module_root.as_str_lossy().as_bytes());
        hasher.update(b"\0");
        hasher.update(b"tag:");
        hasher.update(build_tag.as_bytes());
        hasher.update(b"\0");
        hasher.update(b"bootstrap:");
        hasher.update(driver_source);
        hasher.update(b"\0");

        let mut sorted: Vec<&TaggedFile> = tagged_files.iter().collect();
        sorted.sort_by(|a, b| a.path.as_std_path().cmp(b.path.as_std_path()));

        for file in sorted {
            let Some(path_str) = file.path.as_os_str().to_str() else {
                bail!("path is not valid utf-8, refusing to hash: {:?}", file.path);
            };
            hasher.update(b"file:");
            hasher.update(path_str.as_bytes());
            hasher.update(b"\0");
            hasher.update(&file.contents);
            hasher.update(b"\0");
        }

        Ok(Self(hex::encode(hasher.finalize())))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
