//! Module resolution and grouping.
//!
//! A module is the nearest ancestor of a package that carries a module
//! descriptor; packages with no ancestor module are bucketed under a
//! synthetic "local" module rooted at the start directory, so grouping code
//! downstream never has to special-case "no module found" — only the
//! isolated-module builder does.

use std::collections::BTreeMap;

use color_eyre::{Result, eyre::Context};
use lazy_regex::regex;

use crate::{
    filesystem::Filesystem,
    model::{LOCAL_MODULE_SENTINEL, ModuleTargets, PackageInfo},
    path::{AbsDirPath, TryJoinWith},
};

/// The filename of a module descriptor.
const MODULE_DESCRIPTOR_FILENAME: &str = "go.mod";

/// Find the nearest module descriptor at or above `dir`, walking parents.
///
/// Returns `Ok(None)` when no ancestor carries a descriptor; that is not an
/// error, it's the signal to fall back to the synthetic local module.
#[tracing::instrument(skip(fs), fields(dir = %dir))]
pub async fn find_module_for_path<F: Filesystem>(
    fs: &F,
    dir: &AbsDirPath,
) -> Result<Option<(AbsDirPath, String)>> {
    let mut current = Some(dir.clone());
    while let Some(candidate_dir) = current {
        let descriptor = candidate_dir.try_join_file(MODULE_DESCRIPTOR_FILENAME)?;
        if let Ok(contents) = fs.read_file(descriptor.as_std_path()).await {
            let text = String::from_utf8_lossy(&contents);
            let module_path = parse_module_path(&text)
                .with_context(|| format!("malformed module descriptor at {descriptor:?}"))?;
            return Ok(Some((candidate_dir, module_path)));
        }
        current = candidate_dir.parent();
    }
    Ok(None)
}

fn parse_module_path(text: &str) -> Result<String> {
    for line in text.lines() {
        if let Some(captures) = regex!(r"^module\s+(\S+)\s*$").captures(line.trim_start()) {
            return Ok(captures.get(1).unwrap().as_str().to_string());
        }
    }
    color_eyre::eyre::bail!("no `module <path>` line found")
}

/// Partition `packages` by their resolved module root, producing an ordered
/// list of compilation units. Order of packages within a group preserves
/// discovery order; groups themselves are sorted by module root.
#[tracing::instrument(skip(fs, packages), fields(start_dir = %start_dir, num_packages = packages.len()))]
pub async fn group_by_module<F: Filesystem>(
    fs: &F,
    packages: Vec<PackageInfo>,
    start_dir: &AbsDirPath,
) -> Result<Vec<ModuleTargets>> {
    let mut groups: BTreeMap<AbsDirPath, (String, Vec<PackageInfo>)> = BTreeMap::new();

    for package in packages {
        let (root, module_path) = match find_module_for_path(fs, &package.dir).await? {
            Some((root, module_path)) => (root, module_path),
            None => (start_dir.clone(), LOCAL_MODULE_SENTINEL.to_string()),
        };
        groups
            .entry(root)
            .or_insert_with(|| (module_path, Vec::new()))
            .1
            .push(package);
    }

    Ok(groups
        .into_iter()
        .map(|(root, (module_path, packages))| ModuleTargets {
            root,
            module_path,
            packages,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use crate::{filesystem::FakeFs, model::FileEntry};

    fn package(dir: &str, name: &str) -> PackageInfo {
        PackageInfo {
            dir: AbsDirPath::try_from(dir).unwrap(),
            package: name.into(),
            doc: String::new(),
            files: vec![FileEntry {
                path: AbsDirPath::try_from(dir)
                    .unwrap()
                    .try_join_file("a.go")
                    .unwrap(),
                base_name: "a".into(),
                contents: None,
            }],
            uses_explicit_registration: true,
        }
    }

    #[tokio::test]
    async fn finds_module_in_ancestor_directory() {
        let fs = FakeFs::new().with_file(
            "/proj/go.mod",
            "module example.com/proj\n\ngo 1.22\n",
        );
        let (root, path) = find_module_for_path(&fs, &AbsDirPath::try_from("/proj/pkg/sub").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(root.as_str_lossy(), "/proj");
        assert_eq!(path, "example.com/proj");
    }

    #[tokio::test]
    async fn falls_back_to_synthetic_local_module() {
        let fs = FakeFs::new().with_dir("/proj/pkg");
        let result = find_module_for_path(&fs, &AbsDirPath::try_from("/proj/pkg").unwrap())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn groups_packages_with_no_module_under_local_sentinel() {
        let fs = FakeFs::new().with_dir("/proj/pkg");
        let start = AbsDirPath::try_from("/proj").unwrap();
        let groups = group_by_module(&fs, vec![package("/proj/pkg", "app")], &start)
            .await
            .unwrap();

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].module_path, LOCAL_MODULE_SENTINEL);
        assert_eq!(groups[0].root, start);
        assert!(groups[0].is_local());
    }

    #[tokio::test]
    async fn groups_two_modules_sorted_by_root() {
        let fs = FakeFs::new()
            .with_file("/a/go.mod", "module example.com/a\n")
            .with_file("/b/go.mod", "module example.com/b\n");
        let start = AbsDirPath::try_from("/proj").unwrap();
        let groups = group_by_module(
            &fs,
            vec![package("/b/pkg", "bpkg"), package("/a/pkg", "apkg")],
            &start,
        )
        .await
        .unwrap();

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].module_path, "example.com/a");
        assert_eq!(groups[1].module_path, "example.com/b");
    }
}
