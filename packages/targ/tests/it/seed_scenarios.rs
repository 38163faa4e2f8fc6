//! End-to-end runs of [`targ::runner::run`] covering the cold-cache,
//! isolated-module, multi-package, multi-module, cache-invalidation, and
//! duplicate-identifier scenarios, using [`crate::fixtures::FakeToolchain`]
//! in place of a real Go install.

use targ::{
    filesystem::RealFs,
    model::RunOutcome,
    runner::{self, RunnerOptions},
};

use crate::fixtures::{FakeToolchain, abs_dir, tagged_source};

fn write(path: &std::path::Path, contents: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

/// Scenario 1: single package, cold cache, then a cache hit on rerun.
#[tokio::test]
async fn single_package_cold_cache_then_cache_hit() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("proj");
    write(&root.join("go.mod"), "module example.com/proj\n\ngo 1.22\n");
    write(&root.join("app/main.go"), &tagged_source("app", "Build"));

    let toolchain = FakeToolchain::install(&[("proj", &[("build", "runs build")])]);

    let outcome = runner::run(
        &RealFs,
        abs_dir(&root),
        RunnerOptions::default(),
        "targ",
        &["build".to_string()],
    )
    .await
    .unwrap();
    assert_eq!(outcome, RunOutcome::Ok);
    assert_eq!(toolchain.compile_count(), 1, "first run should compile");

    let outcome = runner::run(
        &RealFs,
        abs_dir(&root),
        RunnerOptions::default(),
        "targ",
        &["build".to_string()],
    )
    .await
    .unwrap();
    assert_eq!(outcome, RunOutcome::Ok);
    assert_eq!(
        toolchain.compile_count(),
        1,
        "unchanged inputs should hit the binary cache, not recompile"
    );
}

/// Scenario 5: modifying a single byte in a non-tagged module source file
/// invalidates the cache even though the tagged package itself didn't change.
#[tokio::test]
async fn cache_invalidates_when_a_non_tagged_module_file_changes() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("proj");
    write(&root.join("go.mod"), "module example.com/proj\n\ngo 1.22\n");
    write(&root.join("app/main.go"), &tagged_source("app", "Build"));
    write(&root.join("helper/util.go"), "package helper\n\nfunc V1() {}\n");

    let toolchain = FakeToolchain::install(&[("proj", &[("build", "runs build")])]);

    runner::run(
        &RealFs,
        abs_dir(&root),
        RunnerOptions::default(),
        "targ",
        &["build".to_string()],
    )
    .await
    .unwrap();
    assert_eq!(toolchain.compile_count(), 1);

    write(&root.join("helper/util.go"), "package helper\n\nfunc V2() {}\n");

    runner::run(
        &RealFs,
        abs_dir(&root),
        RunnerOptions::default(),
        "targ",
        &["build".to_string()],
    )
    .await
    .unwrap();
    assert_eq!(
        toolchain.compile_count(),
        2,
        "changing a non-tagged module file must invalidate the cache key"
    );
}

/// Scenario 2: no ancestor module descriptor triggers the isolated-module
/// builder; the build still succeeds against the scratch root.
#[tokio::test]
async fn isolated_build_succeeds_with_no_module_descriptor() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("proj");
    write(&root.join("app/main.go"), &tagged_source("app", "Build"));

    let _toolchain = FakeToolchain::install(&[]);

    let outcome = runner::run(
        &RealFs,
        abs_dir(&root),
        RunnerOptions::default(),
        "targ",
        &["build".to_string()],
    )
    .await
    .unwrap();
    assert_eq!(outcome, RunOutcome::Ok);
}

/// Scenario 4: two modules under one start directory produce two binaries;
/// a command is routed to whichever binary advertises it, and an unknown
/// command prints merged help and exits non-zero.
#[tokio::test]
async fn multi_module_routes_commands_to_the_owning_binary() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("proj");
    write(&root.join("mod-a/go.mod"), "module example.com/a\n\ngo 1.22\n");
    write(&root.join("mod-a/app/main.go"), &tagged_source("appa", "Foo"));
    write(&root.join("mod-b/go.mod"), "module example.com/b\n\ngo 1.22\n");
    write(&root.join("mod-b/app/main.go"), &tagged_source("appb", "Bar"));

    let _toolchain = FakeToolchain::install(&[
        ("mod-a", &[("foo", "does foo")]),
        ("mod-b", &[("bar", "does bar")]),
    ]);

    let outcome = runner::run(
        &RealFs,
        abs_dir(&root),
        RunnerOptions::default(),
        "targ",
        &["bar".to_string()],
    )
    .await
    .unwrap();
    assert_eq!(outcome, RunOutcome::Ok);

    let outcome = runner::run(
        &RealFs,
        abs_dir(&root),
        RunnerOptions::default(),
        "targ",
        &["missing-command".to_string()],
    )
    .await
    .unwrap();
    assert_eq!(outcome, RunOutcome::ChildExit(1));
}

/// Scenario 3: two tagged packages under one module root both get imported
/// into the same driver, and the resulting single binary advertises the
/// union of their commands.
#[tokio::test]
async fn two_packages_in_one_module_share_a_single_driver() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("proj");
    write(&root.join("go.mod"), "module example.com/proj\n\ngo 1.22\n");
    write(&root.join("build/main.go"), &tagged_source("build", "Build"));
    write(&root.join("deploy/main.go"), &tagged_source("deploy", "Deploy"));

    let toolchain = FakeToolchain::install(&[(
        "proj",
        &[("build", "runs build"), ("deploy", "runs deploy")],
    )]);

    let outcome = runner::run(
        &RealFs,
        abs_dir(&root),
        RunnerOptions::default(),
        "targ",
        &["deploy".to_string()],
    )
    .await
    .unwrap();
    assert_eq!(outcome, RunOutcome::Ok);
    assert_eq!(
        toolchain.compile_count(),
        1,
        "both packages should be compiled into one driver binary"
    );
}

/// Scenario 6: two tagged directories under the same module declare the same
/// package identifier; the bootstrap synthesizer fails loudly naming both
/// directories rather than silently aliasing or picking one.
#[tokio::test]
async fn duplicate_package_identifiers_in_one_module_fail_loudly() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("proj");
    write(&root.join("go.mod"), "module example.com/proj\n\ngo 1.22\n");
    write(&root.join("a/main.go"), &tagged_source("dup", "Build"));
    write(&root.join("b/main.go"), &tagged_source("dup", "Deploy"));

    let _toolchain = FakeToolchain::install(&[("proj", &[])]);

    let err = runner::run(
        &RealFs,
        abs_dir(&root),
        RunnerOptions::default(),
        "targ",
        &["build".to_string()],
    )
    .await
    .unwrap_err();
    assert!(format!("{err:?}").contains("duplicate package identifier"));
}
