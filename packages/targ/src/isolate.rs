//! The isolated-module builder.
//!
//! Used when no module descriptor is found for a discovered package: copies
//! tagged files (with the build-tag line stripped) into a scratch directory
//! under stable "collapsed namespace" subpaths, writes a synthetic module
//! descriptor that pins the runtime dependency, and returns the scratch
//! directory as the build root.

use std::collections::{BTreeSet, HashMap};

use color_eyre::{Result, eyre::Context};

use crate::{
    discover::strip_build_tag_line,
    filesystem::Filesystem,
    model::{FileEntry, PackageInfo},
    path::{AbsDirPath, JoinWith, RelativeTo, TryJoinWith},
};

/// The module path written into the synthetic descriptor. Distinct from
/// [`crate::model::LOCAL_MODULE_SENTINEL`], which is only an in-memory
/// grouping marker and is never written to disk.
pub const ISOLATED_MODULE_PATH: &str = "targ/local";

/// Environment variable naming the runtime version pinned in the currently
/// running binary's build metadata, when one is embedded.
pub const PINNED_RUNTIME_VERSION_ENV: &str = "TARG_RUNTIME_VERSION";

/// Environment variable pointing at the runtime's source root, used for a
/// local-replace directive when no pinned, cached version is available.
pub const RUNTIME_SRC_ENV: &str = "TARG_RUNTIME_SRC";

/// The result of isolating a set of packages with no owning module: a
/// scratch build root plus the packages rewritten to point at their copies.
pub struct IsolatedBuild {
    pub build_root: AbsDirPath,
    pub packages: Vec<PackageInfo>,
}

/// Build a scratch compilation root for `packages`, all of which are
/// discovered below `start_dir` but have no ancestor module descriptor.
#[tracing::instrument(skip(fs, packages), fields(start_dir = %start_dir, num_packages = packages.len()))]
pub async fn isolate<F: Filesystem>(
    fs: &F,
    start_dir: &AbsDirPath,
    packages: &[PackageInfo],
    runtime_import_path: &str,
) -> Result<IsolatedBuild> {
    let scratch_root = tempfile::Builder::new()
        .prefix("targ-isolated-")
        .tempdir()
        .context("create scratch directory under OS temp space")?;
    // Leaked deliberately: the scratch directory is removed via `cleanup`,
    // not on drop, because it must outlive this function while the compiler
    // runs against it.
    let scratch_path = scratch_root.into_path();
    let build_root = AbsDirPath::try_from(scratch_path)
        .context("scratch directory path was not absolute")?;

    let collapsed = collapse_namespace(start_dir, packages)?;

    let mut rewritten_packages = Vec::with_capacity(packages.len());
    for (pkg, collapsed_dir) in packages.iter().zip(collapsed) {
        let pkg_dir = if collapsed_dir.as_str_lossy() == "." {
            build_root.try_join_dir(&pkg.package)?
        } else {
            build_root.join(&collapsed_dir).try_join_dir(&pkg.package)?
        };

        let mut files = Vec::with_capacity(pkg.files.len());
        for file in &pkg.files {
            let contents = match &file.contents {
                Some(bytes) => bytes.clone(),
                None => fs
                    .read_file(file.path.as_std_path())
                    .await
                    .with_context(|| format!("read {:?} before isolating", file.path))?,
            };
            let text = String::from_utf8_lossy(&contents);
            let stripped = strip_build_tag_line(&text).into_bytes();

            let file_name = file
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("{}.go", file.base_name));
            let dest = pkg_dir.try_join_file(&file_name)?;
            crate::fs::write(&dest, &stripped).await?;

            files.push(FileEntry {
                path: dest,
                base_name: file.base_name.clone(),
                contents: Some(stripped),
            });
        }
        files.sort_by(|a, b| a.base_name.cmp(&b.base_name));

        rewritten_packages.push(PackageInfo {
            dir: pkg_dir,
            package: pkg.package.clone(),
            doc: pkg.doc.clone(),
            files,
            uses_explicit_registration: pkg.uses_explicit_registration,
        });
    }

    write_module_descriptor(&build_root, runtime_import_path).await?;

    Ok(IsolatedBuild {
        build_root,
        packages: rewritten_packages,
    })
}

/// Best-effort removal of a scratch directory. Leaking it on a hard kill is
/// acceptable: the scratch layout is deterministic and gets reused.
pub async fn cleanup(build_root: &AbsDirPath) -> Result<()> {
    crate::fs::remove_dir_all(build_root).await
}

async fn write_module_descriptor(build_root: &AbsDirPath, runtime_import_path: &str) -> Result<()> {
    let mut descriptor = format!("module {ISOLATED_MODULE_PATH}\n\ngo 1.22\n\n");

    if let Ok(version) = std::env::var(PINNED_RUNTIME_VERSION_ENV) {
        descriptor.push_str(&format!("require {runtime_import_path} {version}\n"));
    } else if let Ok(src) = std::env::var(RUNTIME_SRC_ENV) {
        descriptor.push_str(&format!("require {runtime_import_path} v0.0.0\n\n"));
        descriptor.push_str(&format!("replace {runtime_import_path} => {src}\n"));
    } else {
        descriptor.push_str(&format!("require {runtime_import_path} v0.0.0\n"));
    }

    let path = build_root.try_join_file("go.mod")?;
    crate::fs::write(&path, descriptor).await
}

/// Compute each package's collapsed namespace directory, relative to
/// `start_dir`: strip the longest common path prefix across all packages,
/// then compress any ancestor directory that has exactly one child. Returns
/// one collapsed relative directory per package, in the same order as
/// `packages`. Distinct packages always map to distinct collapsed paths.
fn collapse_namespace(
    start_dir: &AbsDirPath,
    packages: &[PackageInfo],
) -> Result<Vec<crate::path::RelDirPath>> {
    let suffixes: Vec<Vec<String>> = packages
        .iter()
        .map(|pkg| {
            pkg.dir
                .relative_to(start_dir)
                .map(|rel| {
                    rel.components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect::<Vec<_>>()
                })
        })
        .collect::<Result<_>>()?;

    let common_len = longest_common_prefix_len(&suffixes);
    let trimmed: Vec<Vec<String>> = suffixes
        .iter()
        .map(|s| s[common_len..].to_vec())
        .collect();

    let mut prefix_children: HashMap<Vec<String>, BTreeSet<String>> = HashMap::new();
    for components in &trimmed {
        for i in 0..components.len() {
            prefix_children
                .entry(components[0..i].to_vec())
                .or_default()
                .insert(components[i].clone());
        }
    }

    let mut out = Vec::with_capacity(trimmed.len());
    for components in &trimmed {
        let n = components.len();
        let mut emitted = Vec::new();
        for k in 0..n {
            // The leaf (the package's own directory) is always kept. An
            // ancestor is kept only if its parent has more than one child —
            // a parent with exactly one child is a single-directory chain
            // and contributes nothing to disambiguating packages.
            let is_leaf = k == n - 1;
            let parent = components[0..k].to_vec();
            let parent_child_count = prefix_children.get(&parent).map_or(0, |s| s.len());
            if is_leaf || parent_child_count != 1 {
                emitted.push(components[k].clone());
            }
        }
        let rel = if emitted.is_empty() {
            String::new()
        } else {
            emitted.join("/")
        };
        out.push(if rel.is_empty() {
            crate::path::RelDirPath::try_from(".").context("build collapsed root path")?
        } else {
            crate::path::RelDirPath::try_from(rel.as_str())
                .with_context(|| format!("build collapsed path from {emitted:?}"))?
        });
    }

    Ok(out)
}

fn longest_common_prefix_len(sequences: &[Vec<String>]) -> usize {
    let Some(first) = sequences.first() else {
        return 0;
    };
    let mut len = first.len();
    for seq in &sequences[1..] {
        len = len.min(seq.len());
        for i in 0..len {
            if seq[i] != first[i] {
                len = i;
                break;
            }
        }
    }
    len
}
