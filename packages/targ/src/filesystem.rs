//! The injectable filesystem adapter.
//!
//! `discover` and `isolate` are generic over this trait instead of calling
//! `tokio::fs` directly, so tests can drive them against an in-memory tree
//! instead of real disk. Everything else in this crate (the cache store, the
//! compiler driver) always touches real disk through `fs` — their whole job
//! is managing on-disk artifacts, so faking them out would just relocate the
//! thing under test.

use std::{
    collections::BTreeMap,
    ffi::OsString,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use color_eyre::{Result, eyre::Context};

/// One entry returned by [`Filesystem::read_dir`].
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct DirEntry {
    pub name: OsString,
    pub is_dir: bool,
}

/// Read/write/list capability over a directory tree.
///
/// Implemented by [`RealFs`] (backed by `tokio::fs`) and [`FakeFs`] (backed
/// by an in-memory tree, for tests).
pub trait Filesystem: Clone + Send + Sync + 'static {
    /// Read the full contents of a file.
    fn read_file(&self, path: &Path) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// List the immediate children of a directory.
    fn read_dir(&self, path: &Path) -> impl Future<Output = Result<Vec<DirEntry>>> + Send;

    /// Write `contents` to `path`, creating parent directories as needed.
    fn write_file(&self, path: &Path, contents: &[u8]) -> impl Future<Output = Result<()>> + Send;
}

/// Real-disk implementation of [`Filesystem`], backed by `tokio::fs`.
#[derive(Copy, Clone, Default, Debug)]
pub struct RealFs;

impl Filesystem for RealFs {
    async fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .with_context(|| format!("read {path:?}"))
    }

    async fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let mut rd = tokio::fs::read_dir(path)
            .await
            .with_context(|| format!("open directory {path:?}"))?;
        let mut out = Vec::new();
        while let Some(entry) = rd
            .next_entry()
            .await
            .with_context(|| format!("read next entry in {path:?}"))?
        {
            let file_type = entry
                .file_type()
                .await
                .with_context(|| format!("stat {:?}", entry.path()))?;
            out.push(DirEntry {
                name: entry.file_name(),
                is_dir: file_type.is_dir(),
            });
        }
        Ok(out)
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create parent directories for {path:?}"))?;
        }
        tokio::fs::write(path, contents)
            .await
            .with_context(|| format!("write {path:?}"))
    }
}

#[derive(Clone, Debug)]
enum FakeNode {
    File(Vec<u8>),
    Dir,
}

/// In-memory [`Filesystem`] for tests.
///
/// Paths are stored verbatim as keys; directories are implicit from the
/// presence of entries beneath them, plus any directory explicitly created
/// via [`FakeFs::with_dir`].
#[derive(Clone, Default, Debug)]
pub struct FakeFs {
    nodes: Arc<Mutex<BTreeMap<PathBuf, FakeNode>>>,
}

impl FakeFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file into the fake tree.
    pub fn with_file(self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        let path = path.into();
        for ancestor in path.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            self.nodes
                .lock()
                .unwrap()
                .entry(ancestor.to_path_buf())
                .or_insert(FakeNode::Dir);
        }
        self.nodes
            .lock()
            .unwrap()
            .insert(path, FakeNode::File(contents.into()));
        self
    }

    /// Seed an (otherwise empty) directory into the fake tree.
    pub fn with_dir(self, path: impl Into<PathBuf>) -> Self {
        self.nodes
            .lock()
            .unwrap()
            .insert(path.into(), FakeNode::Dir);
        self
    }
}

impl Filesystem for FakeFs {
    async fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        match self.nodes.lock().unwrap().get(path) {
            Some(FakeNode::File(bytes)) => Ok(bytes.clone()),
            Some(FakeNode::Dir) => color_eyre::eyre::bail!("{path:?} is a directory"),
            None => color_eyre::eyre::bail!("{path:?} not found in fake filesystem"),
        }
    }

    async fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let nodes = self.nodes.lock().unwrap();
        if !matches!(nodes.get(path), Some(FakeNode::Dir)) {
            color_eyre::eyre::bail!("{path:?} is not a known directory in fake filesystem");
        }
        let mut seen = BTreeMap::new();
        for (candidate, node) in nodes.iter() {
            let Ok(rest) = candidate.strip_prefix(path) else {
                continue;
            };
            let mut components = rest.components();
            let Some(first) = components.next() else {
                continue;
            };
            let is_direct_child = components.next().is_none();
            let name = first.as_os_str().to_owned();
            let is_dir = if is_direct_child {
                matches!(node, FakeNode::Dir)
            } else {
                true
            };
            seen.entry(name).or_insert(is_dir);
        }
        Ok(seen
            .into_iter()
            .map(|(name, is_dir)| DirEntry { name, is_dir })
            .collect())
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        for ancestor in path.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            self.nodes
                .lock()
                .unwrap()
                .entry(ancestor.to_path_buf())
                .or_insert(FakeNode::Dir);
        }
        self.nodes
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), FakeNode::File(contents.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn fake_fs_lists_direct_children_only() {
        let fs = FakeFs::new()
            .with_file("/root/a/one.go", b"a".to_vec())
            .with_file("/root/b/two.go", b"b".to_vec());

        let mut entries = fs.read_dir(Path::new("/root")).await.unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        let names: Vec<_> = entries.iter().map(|e| e.name.to_string_lossy().to_string()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(entries.iter().all(|e| e.is_dir));
    }

    #[tokio::test]
    async fn fake_fs_round_trips_writes() {
        let fs = FakeFs::new();
        fs.write_file(Path::new("/scratch/out.go"), b"package app")
            .await
            .unwrap();
        let contents = fs.read_file(Path::new("/scratch/out.go")).await.unwrap();
        assert_eq!(contents, b"package app");
    }
}
