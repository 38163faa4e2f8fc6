//! Discovery: walk a start directory and return every tagged package.
//!
//! Parsing here is a small hand-written lexical scanner over the subset of
//! the grammar that matters (package clause, import block, top-level
//! declarations, build-constraint comment lines), not a full AST parser —
//! there is no such parser in this crate's dependency stack, and a strong
//! engineer could reimplement this module from the registry contract alone.

use std::path::Path;

use color_eyre::{Result, eyre::Context, eyre::bail};
use itertools::Itertools;
use lazy_regex::regex;

use crate::{
    filesystem::Filesystem,
    model::{FileEntry, PackageInfo, TaggedFile},
    path::{AbsDirPath, TryJoinWith},
};

/// Directory names skipped during discovery's walk, in addition to any
/// hidden (leading-dot) entry.
const SKIPPED_DIR_NAMES: &[&str] = &["vendor", "testdata", "internal"];

/// Directory names skipped when walking for the cache-key file set. Only
/// `vendor` is excluded: `internal` and `testdata` packages are still
/// compiled into (or can be imported by) the module, so their sources must
/// still move the cache key, even though discovery proper never treats them
/// as candidates for tagged packages.
const CACHE_KEY_SKIPPED_DIR_NAMES: &[&str] = &["vendor"];

/// Extension marking a source file.
const SOURCE_EXTENSION: &str = "go";

/// Suffix marking a test file; test files are never considered, tagged or not.
const TEST_FILE_SUFFIX: &str = "_test.go";

/// Prefix reserved for files this tool itself generates; never discovered.
const GENERATED_FILE_PREFIX: &str = "targ_gen_";

/// The package identifier reserved for program entry points; a tagged
/// package may not use it.
const ENTRY_POINT_PACKAGE: &str = "main";

/// Canonical import path of the target-runtime package the bootstrap driver
/// imports. Aliased imports of this path are what `UsesExplicitRegistration`
/// looks for a `Register` call against.
pub const RUNTIME_IMPORT_PATH: &str = "github.com/toejough/targ/task";

/// Parameters shared by [`discover`] and [`tagged_files`].
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct DiscoverOptions {
    pub start_dir: AbsDirPath,
    pub build_tag: String,
}

/// Walk `opts.start_dir` and return every tagged package below it, sorted by
/// directory path.
#[tracing::instrument(skip(fs), fields(start_dir = %opts.start_dir, build_tag = %opts.build_tag))]
pub async fn discover<F: Filesystem>(
    fs: &F,
    opts: &DiscoverOptions,
) -> Result<Vec<PackageInfo>> {
    let mut packages = Vec::new();

    for dir in walk_dirs(fs, &opts.start_dir).await? {
        let Some(candidates) = candidate_files(fs, &dir).await? else {
            continue;
        };

        let mut tagged = Vec::new();
        for (name, contents) in candidates {
            let text = String::from_utf8_lossy(&contents);
            if is_tagged(&text, &opts.build_tag) {
                tagged.push((name, contents));
            }
        }
        if tagged.is_empty() {
            continue;
        }

        packages.push(build_package_info(&dir, tagged)?);
    }

    packages.sort_by(|a, b| a.dir.as_std_path().cmp(b.dir.as_std_path()));
    Ok(packages)
}

/// Same walk as [`discover`], but returns every tagged file's path and exact
/// bytes; used only by cache-key computation.
#[tracing::instrument(skip(fs), fields(start_dir = %opts.start_dir, build_tag = %opts.build_tag))]
pub async fn tagged_files<F: Filesystem>(
    fs: &F,
    opts: &DiscoverOptions,
) -> Result<Vec<TaggedFile>> {
    let mut files = Vec::new();

    for dir in walk_dirs(fs, &opts.start_dir).await? {
        let Some(candidates) = candidate_files(fs, &dir).await? else {
            continue;
        };
        for (name, contents) in candidates {
            let text = String::from_utf8_lossy(&contents);
            if is_tagged(&text, &opts.build_tag) {
                let path = dir.try_join_file(&name)?;
                files.push(TaggedFile { path, contents });
            }
        }
    }

    files.sort_by(|a, b| a.path.as_std_path().cmp(b.path.as_std_path()));
    Ok(files)
}

/// Module descriptor and checksum file names included in the cache-key input
/// set whenever present, so dependency changes invalidate cached binaries
/// even though neither file is itself a tagged source file.
const MODULE_METADATA_FILES: &[&str] = &["go.mod", "go.sum"];

/// Every non-test, non-vendored source file under `module_root`, plus its
/// `go.mod`/`go.sum` if present — regardless of build tag. Used only by the
/// cache-key computer: the key must change when *any* module source changes,
/// not only when a tagged file does.
#[tracing::instrument(skip(fs), fields(module_root = %module_root))]
pub async fn module_files<F: Filesystem>(
    fs: &F,
    module_root: &AbsDirPath,
) -> Result<Vec<TaggedFile>> {
    let mut files = Vec::new();

    for dir in walk_dirs_skipping(fs, module_root, CACHE_KEY_SKIPPED_DIR_NAMES).await? {
        let entries = fs
            .read_dir(dir.as_std_path())
            .await
            .with_context(|| format!("list {dir:?}"))?;
        for entry in entries {
            if entry.is_dir {
                continue;
            }
            let name = entry.name.to_string_lossy().into_owned();
            let is_source = name.ends_with(&format!(".{SOURCE_EXTENSION}"))
                && !name.ends_with(TEST_FILE_SUFFIX)
                && !name.starts_with(GENERATED_FILE_PREFIX);
            let is_metadata = dir == *module_root && MODULE_METADATA_FILES.contains(&name.as_str());
            if !is_source && !is_metadata {
                continue;
            }
            let path = dir.try_join_file(&name)?;
            let contents = fs
                .read_file(path.as_std_path())
                .await
                .with_context(|| format!("read {path:?}"))?;
            files.push(TaggedFile { path, contents });
        }
    }

    files.sort_by(|a, b| a.path.as_std_path().cmp(b.path.as_std_path()));
    Ok(files)
}

/// Recursively list every directory at or below `root`, skipping hidden,
/// vendor, testdata, and internal directories (the root itself is never
/// skipped even if it matches one of those names).
async fn walk_dirs<F: Filesystem>(fs: &F, root: &AbsDirPath) -> Result<Vec<AbsDirPath>> {
    walk_dirs_skipping(fs, root, SKIPPED_DIR_NAMES).await
}

/// Recursively list every directory at or below `root`, skipping hidden
/// entries and any directory whose name appears in `skipped_names` (the root
/// itself is never skipped even if it matches one of those names).
async fn walk_dirs_skipping<F: Filesystem>(
    fs: &F,
    root: &AbsDirPath,
    skipped_names: &[&str],
) -> Result<Vec<AbsDirPath>> {
    let mut out = vec![root.clone()];
    let mut stack = vec![root.clone()];

    while let Some(dir) = stack.pop() {
        let entries = fs
            .read_dir(dir.as_std_path())
            .await
            .with_context(|| format!("walk {dir:?}"))?;
        for entry in entries {
            if !entry.is_dir {
                continue;
            }
            let name = entry.name.to_string_lossy();
            if is_hidden(&name) || skipped_names.contains(&name.as_ref()) {
                continue;
            }
            let child = dir.try_join_dir(&name)?;
            out.push(child.clone());
            stack.push(child);
        }
    }

    Ok(out)
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Read every candidate source file in `dir` (right extension, not a test
/// file, not tool-generated). Returns `None` if `dir` isn't readable as a
/// directory at all (this happens for leaf file paths surfaced transiently
/// during the walk; callers treat it as "nothing here").
async fn candidate_files<F: Filesystem>(
    fs: &F,
    dir: &AbsDirPath,
) -> Result<Option<Vec<(String, Vec<u8>)>>> {
    let entries = fs
        .read_dir(dir.as_std_path())
        .await
        .with_context(|| format!("list {dir:?}"))?;

    let mut out = Vec::new();
    for entry in entries {
        if entry.is_dir {
            continue;
        }
        let name = entry.name.to_string_lossy().into_owned();
        if !name.ends_with(&format!(".{SOURCE_EXTENSION}")) {
            continue;
        }
        if name.ends_with(TEST_FILE_SUFFIX) || name.starts_with(GENERATED_FILE_PREFIX) {
            continue;
        }
        let path = dir.try_join_file(&name)?;
        let contents = fs
            .read_file(path.as_std_path())
            .await
            .with_context(|| format!("read {path:?}"))?;
        out.push((name, contents));
    }
    Ok(Some(out))
}

/// The first non-blank line of `src`, if any.
fn first_non_blank_line(src: &str) -> Option<&str> {
    src.lines().find(|line| !line.trim().is_empty())
}

/// Parse a build-constraint comment line (modern `//go:build EXPR` or legacy
/// `// +build EXPR`), returning the trimmed expression text. Compound
/// expressions are returned verbatim and compared for exact equality against
/// the configured tag elsewhere — they are never expanded.
fn parse_build_constraint(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if let Some(rest) = trimmed.strip_prefix("//go:build") {
        return Some(rest.trim());
    }
    if let Some(rest) = trimmed.strip_prefix("// +build") {
        return Some(rest.trim());
    }
    None
}

/// Whether `src`'s build-constraint header equals `tag` exactly.
fn is_tagged(src: &str, tag: &str) -> bool {
    first_non_blank_line(src)
        .and_then(parse_build_constraint)
        .is_some_and(|expr| expr == tag)
}

/// Strip the build-constraint header line (and the blank line Go convention
/// places after it) from `src`, leaving the rest of the file untouched.
/// Used by the isolated-module builder when copying tagged files into a
/// scratch directory.
pub fn strip_build_tag_line(src: &str) -> String {
    let Some(first) = first_non_blank_line(src) else {
        return src.to_string();
    };
    if parse_build_constraint(first).is_none() {
        return src.to_string();
    }

    let mut lines = src.lines();
    for line in lines.by_ref() {
        if line == first {
            break;
        }
    }
    let mut rest: Vec<&str> = lines.collect();
    if rest.first().is_some_and(|l| l.trim().is_empty()) {
        rest.remove(0);
    }
    let mut out = rest.join("\n");
    if src.ends_with('\n') {
        out.push('\n');
    }
    out
}

fn package_name_line(line: &str) -> Option<&str> {
    regex!(r"^package\s+(\w+)\s*$")
        .captures(line)
        .map(|c| c.get(1).unwrap().as_str())
}

fn func_decl_name(line: &str) -> Option<&str> {
    regex!(r"^func\s+(\w+)\s*\(").captures(line).map(|c| c.get(1).unwrap().as_str())
}

fn var_decl_name(line: &str) -> Option<&str> {
    regex!(r"^var\s+(\w+)\b").captures(line).map(|c| c.get(1).unwrap().as_str())
}

/// The alias a line's import statement binds `import_path` to, if any.
fn import_alias(line: &str, import_path: &str) -> Option<String> {
    let trimmed = line.trim();
    let quoted = format!("\"{import_path}\"");
    if !trimmed.ends_with(&quoted) {
        return None;
    }
    let prefix = trimmed.trim_end_matches(&quoted).trim();
    let prefix = prefix.strip_prefix("import").unwrap_or(prefix).trim();
    if prefix.is_empty() {
        // no explicit alias: the alias is the final path segment.
        Some(import_path.rsplit('/').next().unwrap_or(import_path).to_string())
    } else {
        Some(prefix.to_string())
    }
}

/// Parse one file's text for its package name, doc comment, declared target
/// names, and whether it explicitly registers via the runtime's `Register`.
struct ParsedFile {
    package: String,
    doc: String,
    declarations: Vec<String>,
    uses_explicit_registration: bool,
}

fn parse_file(text: &str) -> Result<ParsedFile> {
    let lines: Vec<&str> = text.lines().collect();

    let Some(pkg_idx) = lines.iter().position(|l| package_name_line(l).is_some()) else {
        bail!("no package clause found");
    };
    let package = package_name_line(lines[pkg_idx]).unwrap().to_string();

    let mut doc_lines = Vec::new();
    let mut i = pkg_idx;
    while i > 0 {
        let candidate = lines[i - 1].trim();
        if let Some(text) = candidate.strip_prefix("//") {
            doc_lines.push(text.trim().to_string());
            i -= 1;
        } else {
            break;
        }
    }
    doc_lines.reverse();
    let doc = doc_lines.join(" ");

    let mut declarations = Vec::new();
    let mut runtime_alias = None;
    for line in &lines {
        if let Some(name) = func_decl_name(line) {
            declarations.push(name.to_string());
        }
        if let Some(name) = var_decl_name(line) {
            declarations.push(name.to_string());
        }
        if let Some(alias) = import_alias(line, RUNTIME_IMPORT_PATH) {
            runtime_alias = Some(alias);
        }
    }
    declarations = declarations.into_iter().unique().collect();

    let uses_explicit_registration = runtime_alias
        .map(|alias| text.contains(&format!("{alias}.Register(")))
        .unwrap_or(false);

    Ok(ParsedFile {
        package,
        doc,
        declarations,
        uses_explicit_registration,
    })
}

fn build_package_info(dir: &AbsDirPath, tagged: Vec<(String, Vec<u8>)>) -> Result<PackageInfo> {
    let mut package_name: Option<String> = None;
    let mut doc = String::new();
    let mut files = Vec::new();
    let mut uses_explicit_registration = false;

    for (name, contents) in tagged {
        let text = String::from_utf8_lossy(&contents);
        let parsed = parse_file(&text)
            .with_context(|| format!("parse {dir:?}/{name}"))?;

        if parsed.package == ENTRY_POINT_PACKAGE {
            bail!(
                "tagged package in {dir:?} uses the reserved entry-point package \
                 name {ENTRY_POINT_PACKAGE:?}; use a named package instead"
            );
        }

        match &package_name {
            None => package_name = Some(parsed.package.clone()),
            Some(existing) if *existing != parsed.package => {
                bail!(
                    "multiple package names in {dir:?}: {existing:?} and {:?}",
                    parsed.package
                );
            }
            Some(_) => {}
        }

        if doc.is_empty() {
            doc = parsed.doc;
        }
        uses_explicit_registration |= parsed.uses_explicit_registration;

        let base_name = Path::new(&name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.clone());
        let path = dir.try_join_file(&name)?;
        files.push(FileEntry {
            path,
            base_name,
            contents: Some(contents),
        });
    }

    files.sort_by(|a, b| a.base_name.cmp(&b.base_name));

    Ok(PackageInfo {
        dir: dir.clone(),
        package: package_name.expect("tagged is non-empty, so at least one file was parsed"),
        doc,
        files,
        uses_explicit_registration,
    })
}
