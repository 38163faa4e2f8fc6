//! Bootstrap synthesis: generate the driver source compiled for each module.
//!
//! Correctness hinges entirely on the runtime's initializer-driven
//! registration — the driver never enumerates targets itself, it only
//! imports each package for its side effects and lets the runtime's
//! `Register` calls populate themselves.

use std::path::Component;

use color_eyre::{Result, eyre::Context, eyre::bail};

use crate::{
    cachekey::CacheKey,
    discover::{self, DiscoverOptions},
    filesystem::Filesystem,
    model::{BootstrapArtifact, PackageInfo},
    path::AbsDirPath,
};
#[cfg(test)]
use crate::path::TryJoinWith;

/// Fixed, tool-branded description passed to the runtime's
/// `ExecuteRegistered`. Tests may assert on this string verbatim.
pub const DRIVER_DESCRIPTION: &str = "targ-generated driver";

/// The inputs needed to synthesize one module's bootstrap driver.
pub struct BootstrapInput<'a> {
    /// The module's import path. For the isolated-module path this is the
    /// synthetic descriptor's module path, not the in-memory grouping
    /// sentinel.
    pub module_path: &'a str,
    /// The directory the compiler will run from; package import paths are
    /// computed relative to this root. For an isolated build this is the
    /// scratch directory `isolate::isolate` created, which is random and
    /// different on every invocation.
    pub build_root: &'a AbsDirPath,
    /// The root the cache key's file set is discovered under. Equal to
    /// `build_root` for a real module. For an isolated build this must
    /// instead be the original (pre-copy) start directory: it, and the
    /// original tagged/module files under it, are stable across runs, while
    /// `build_root`'s random scratch path is not — hashing the scratch root
    /// would make every isolated build a permanent cache miss.
    pub cache_root: &'a AbsDirPath,
    pub packages: &'a [PackageInfo],
}

/// Synthesize the driver source for one module and compute its cache key
/// over the module's full input set.
#[tracing::instrument(skip(fs, input), fields(module_path = input.module_path, num_packages = input.packages.len()))]
pub async fn synthesize<F: Filesystem>(
    fs: &F,
    input: BootstrapInput<'_>,
    build_tag: &str,
) -> Result<BootstrapArtifact> {
    for pkg in input.packages {
        if !pkg.uses_explicit_registration {
            bail!(
                "package at {:?} does not use explicit registration; \
                 it must call the runtime's Register from an initializer",
                pkg.dir
            );
        }
    }

    let mut seen = std::collections::HashMap::new();
    for pkg in input.packages {
        if let Some(existing) = seen.insert(&pkg.package, &pkg.dir) {
            bail!(
                "duplicate package identifier {:?} in directories {:?} and {:?}; \
                 the bootstrap synthesizer does not alias colliding imports",
                pkg.package,
                existing,
                pkg.dir
            );
        }
    }

    let source = render_driver(input.module_path, input.build_root, input.packages)?;

    let tagged = discover::tagged_files(
        fs,
        &DiscoverOptions {
            start_dir: input.cache_root.clone(),
            build_tag: build_tag.to_string(),
        },
    )
    .await
    .context("collect tagged files for cache-key computation")?;

    // The key must also move when any other module source changes, not only
    // tagged files, so dependency and helper-file edits invalidate the cache
    // too.
    let module_files = discover::module_files(fs, input.cache_root)
        .await
        .context("collect module source files for cache-key computation")?;

    let mut cache_inputs = tagged;
    for file in module_files {
        if !cache_inputs.iter().any(|t| t.path == file.path) {
            cache_inputs.push(file);
        }
    }

    let cache_key = CacheKey::from_fields(
        input.module_path,
        input.cache_root,
        build_tag,
        &source,
        &cache_inputs,
    )?;

    Ok(BootstrapArtifact { source, cache_key })
}

fn render_driver(module_path: &str, build_root: &AbsDirPath, packages: &[PackageInfo]) -> Result<Vec<u8>> {
    let mut imports = Vec::with_capacity(packages.len());
    for pkg in packages {
        imports.push(import_path(module_path, build_root, pkg)?);
    }
    imports.sort();
    imports.dedup();

    let mut out = String::new();
    out.push_str("// Code generated by targ. DO NOT EDIT.\n\n");
    out.push_str("package main\n\n");
    out.push_str("import (\n");
    for import in &imports {
        out.push_str(&format!("\t_ \"{import}\"\n"));
    }
    out.push('\n');
    out.push_str(&format!(
        "\ttargtask \"{}\"\n",
        discover::RUNTIME_IMPORT_PATH
    ));
    out.push_str(")\n\n");
    out.push_str("func main() {\n");
    out.push_str("\ttargtask.EnableCleanup()\n");
    out.push_str(&format!(
        "\ttargtask.ExecuteRegistered(targtask.RunOptions{{Description: {DRIVER_DESCRIPTION:?}}})\n"
    ));
    out.push_str("}\n");
    Ok(out.into_bytes())
}

fn import_path(module_path: &str, build_root: &AbsDirPath, pkg: &PackageInfo) -> Result<String> {
    let rel = pkg
        .dir
        .relative_to(build_root)
        .with_context(|| format!("package {:?} is not under build root {build_root:?}", pkg.dir))?;

    let segments: Vec<String> = rel
        .components()
        .map(|c| match c {
            Component::Normal(s) => Ok(s.to_string_lossy().into_owned()),
            other => bail!("unexpected path component in package import path: {other:?}"),
        })
        .collect::<Result<_>>()?;

    if segments.is_empty() {
        Ok(module_path.to_string())
    } else {
        Ok(format!("{module_path}/{}", segments.join("/")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use crate::{filesystem::FakeFs, model::FileEntry};

    fn pkg(dir: &str, name: &str, registers: bool) -> PackageInfo {
        PackageInfo {
            dir: AbsDirPath::try_from(dir).unwrap(),
            package: name.into(),
            doc: String::new(),
            files: vec![FileEntry {
                path: AbsDirPath::try_from(dir).unwrap().try_join_file("a.go").unwrap(),
                base_name: "a".into(),
                contents: Some(b"package app".to_vec()),
            }],
            uses_explicit_registration: registers,
        }
    }

    #[tokio::test]
    async fn synthesizes_one_side_effect_import_per_package() {
        let fs = FakeFs::new();
        let root = AbsDirPath::try_from("/mod").unwrap();
        let packages = vec![pkg("/mod/a", "a", true), pkg("/mod/b", "b", true)];
        let artifact = synthesize(
            &fs,
            BootstrapInput {
                module_path: "example.com/mod",
                build_root: &root,
                cache_root: &root,
                packages: &packages,
            },
            "targ",
        )
        .await
        .unwrap();

        let src = String::from_utf8(artifact.source).unwrap();
        assert!(src.contains("_ \"example.com/mod/a\""));
        assert!(src.contains("_ \"example.com/mod/b\""));
        assert!(src.contains(DRIVER_DESCRIPTION));
        assert!(src.contains("EnableCleanup"));
    }

    #[tokio::test]
    async fn fails_when_package_does_not_register() {
        let fs = FakeFs::new();
        let root = AbsDirPath::try_from("/mod").unwrap();
        let packages = vec![pkg("/mod/a", "a", false)];
        let err = synthesize(
            &fs,
            BootstrapInput {
                module_path: "example.com/mod",
                build_root: &root,
                cache_root: &root,
                packages: &packages,
            },
            "targ",
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("does not use explicit registration"));
    }

    #[tokio::test]
    async fn cache_key_changes_when_a_non_tagged_module_file_changes() {
        let root = AbsDirPath::try_from("/mod").unwrap();
        let packages = vec![pkg("/mod/a", "a", true)];
        let input = || BootstrapInput {
            module_path: "example.com/mod",
            build_root: &root,
            cache_root: &root,
            packages: &packages,
        };

        let fs_before = FakeFs::new().with_file("/mod/helper/util.go", "package helper\n\nfunc V1() {}\n");
        let before = synthesize(&fs_before, input(), "targ").await.unwrap();

        let fs_after = FakeFs::new().with_file("/mod/helper/util.go", "package helper\n\nfunc V2() {}\n");
        let after = synthesize(&fs_after, input(), "targ").await.unwrap();

        assert_ne!(before.cache_key, after.cache_key);
    }

    #[tokio::test]
    async fn fails_on_duplicate_package_identifiers() {
        let fs = FakeFs::new();
        let root = AbsDirPath::try_from("/mod").unwrap();
        let packages = vec![pkg("/mod/a", "dup", true), pkg("/mod/b", "dup", true)];
        let err = synthesize(
            &fs,
            BootstrapInput {
                module_path: "example.com/mod",
                build_root: &root,
                cache_root: &root,
                packages: &packages,
            },
            "targ",
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("duplicate package identifier"));
    }
}
