//! Core data types shared across the pipeline.
//!
//! These are plain data: construction lives in the modules that produce each
//! type (`discover`, `module`, `bootstrap`, ...), not here.

use std::time::Duration;

use bon::Builder;

use crate::{
    cachekey::CacheKey,
    path::{AbsDirPath, AbsFilePath},
};

/// The module path used for packages with no ancestor module descriptor.
///
/// Grouping code treats this the same as any other module path; only the
/// isolated-module builder special-cases it.
pub const LOCAL_MODULE_SENTINEL: &str = "<local>";

/// A discovered source file.
///
/// Immutable once produced by discovery: nothing downstream mutates a
/// `FileEntry`, it only reads `contents` or re-derives a new path from `path`.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct FileEntry {
    pub path: AbsFilePath,
    pub base_name: String,
    pub contents: Option<Vec<u8>>,
}

/// One directory containing at least one tagged file.
///
/// Invariants upheld by discovery, not re-checked here: every file in
/// `files` lives under `dir`; all files agree on `package`; `files` is
/// sorted by base name.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct PackageInfo {
    pub dir: AbsDirPath,
    pub package: String,
    pub doc: String,
    pub files: Vec<FileEntry>,
    pub uses_explicit_registration: bool,
}

/// A tagged file's path and exact bytes, used only for cache-key computation.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct TaggedFile {
    pub path: AbsFilePath,
    pub contents: Vec<u8>,
}

/// One compilation unit: a module root plus the packages rooted at it.
///
/// Invariant: every package's directory is a descendant of `root`, or
/// `module_path == LOCAL_MODULE_SENTINEL`.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ModuleTargets {
    pub root: AbsDirPath,
    pub module_path: String,
    pub packages: Vec<PackageInfo>,
}

impl ModuleTargets {
    pub fn is_local(&self) -> bool {
        self.module_path == LOCAL_MODULE_SENTINEL
    }
}

/// The generated driver source plus the cache key computed from the full
/// input set. Immutable.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct BootstrapArtifact {
    pub source: Vec<u8>,
    pub cache_key: CacheKey,
}

/// One command a compiled binary advertises via `__list`.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, serde::Deserialize, serde::Serialize)]
pub struct CommandInfo {
    pub name: String,
    pub description: String,
}

/// The outcome of building one module: binary path plus the commands it
/// advertises. Created per run, consulted by the dispatcher, not persisted —
/// the binary on disk is the persistent artifact.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ModuleRegistry {
    pub binary: AbsFilePath,
    pub root: AbsDirPath,
    pub module_path: String,
    pub commands: Vec<CommandInfo>,
}

impl ModuleRegistry {
    /// Find the command this registry should route `command` to, per the
    /// exact-match-or-prefix-group rule.
    pub fn route(&self, command: &str) -> Option<&CommandInfo> {
        self.commands.iter().find(|c| {
            c.name == command || c.name.starts_with(&format!("{command} "))
        })
    }
}

/// The outcome of one pipeline run, used to compute the process exit code.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum RunOutcome {
    /// The core pipeline completed with no child process to defer to.
    Ok,
    /// A child binary ran and exited with this code; it is propagated
    /// verbatim as the process exit code.
    ChildExit(i32),
    /// A core error occurred; the runner prints it and exits 1.
    Error(String),
}

/// How a target's dependencies are interpreted by the runtime.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum DependencyMode {
    #[default]
    Sequential,
    Parallel,
}

/// Input accepted from the external target-creation collaborator.
///
/// The bootstrap synthesizer only needs to tolerate packages authored via
/// this shape; it does not itself construct one. Built with `bon` because
/// most fields are optional.
#[derive(Clone, Eq, PartialEq, Debug, Builder)]
pub struct CreateOptions {
    pub name: String,
    pub group_path: Option<String>,
    pub shell_command: String,
    #[builder(default)]
    pub dependencies: Vec<String>,
    #[builder(default)]
    pub cache_glob: Vec<String>,
    #[builder(default)]
    pub watch_glob: Vec<String>,
    pub timeout: Option<Duration>,
    #[builder(default)]
    pub retry: bool,
    #[builder(default = 1)]
    pub repeat: u32,
    pub backoff: Option<Duration>,
    #[builder(default)]
    pub dependency_mode: DependencyMode,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn route_matches_exact_name() {
        let registry = ModuleRegistry {
            binary: AbsFilePath::try_from("/tmp/bin").unwrap(),
            root: AbsDirPath::try_from("/tmp").unwrap(),
            module_path: "example.com/mod".into(),
            commands: vec![CommandInfo {
                name: "build".into(),
                description: "build the thing".into(),
            }],
        };
        assert_eq!(registry.route("build").unwrap().name, "build");
    }

    #[test]
    fn route_matches_group_prefix() {
        let registry = ModuleRegistry {
            binary: AbsFilePath::try_from("/tmp/bin").unwrap(),
            root: AbsDirPath::try_from("/tmp").unwrap(),
            module_path: "example.com/mod".into(),
            commands: vec![CommandInfo {
                name: "db migrate".into(),
                description: "run migrations".into(),
            }],
        };
        assert_eq!(registry.route("db").unwrap().name, "db migrate");
        assert!(registry.route("dbx").is_none());
    }

    #[test]
    fn create_options_builder_applies_defaults() {
        let opts = CreateOptions::builder()
            .name("deploy".to_string())
            .shell_command("echo hi".to_string())
            .build();
        assert_eq!(opts.repeat, 1);
        assert!(!opts.retry);
        assert_eq!(opts.dependency_mode, DependencyMode::Sequential);
    }
}
