//! The runner shell: orchestrates discovery through execution for one
//! invocation and propagates the resulting exit code.
//!
//! Scheduling model: single-process, cooperative sequencing. Within one
//! invocation the pipeline runs in a fixed order — discover, group, then
//! per module: synthesize, key, cache-check, build-if-miss, execute.
//! Multi-module builds parallelize at module granularity since each
//! module's build touches disjoint inputs, outputs, and working
//! directories.

use color_eyre::{Result, eyre::Context};
use futures::future::try_join_all;

use crate::{
    bootstrap::{self, BootstrapInput},
    cache::CacheStore,
    discover::{self, DiscoverOptions, RUNTIME_IMPORT_PATH},
    dispatch,
    filesystem::Filesystem,
    isolate,
    model::{ModuleRegistry, ModuleTargets, RunOutcome},
    path::{AbsDirPath, TryJoinWith},
};

/// Binary name prefix used in cache filenames (`<prefix>_<cachekey>`).
const DEFAULT_BINARY_PREFIX: &str = "targ";

/// Options controlling one pipeline run.
#[derive(Clone, Debug)]
pub struct RunnerOptions {
    pub build_tag: String,
    pub binary_prefix: String,
    pub no_binary_cache: bool,
    /// Keep the temporary driver source after a successful build, instead of
    /// deleting it.
    pub keep_driver: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            build_tag: "targ".to_string(),
            binary_prefix: DEFAULT_BINARY_PREFIX.to_string(),
            no_binary_cache: false,
            keep_driver: false,
        }
    }
}

/// Run the full pipeline: discover tagged packages below `start_dir`, group
/// them into modules, build (or reuse a cached binary for) each, and
/// dispatch `user_args` to the right one.
#[tracing::instrument(skip(fs, user_args), fields(start_dir = %start_dir, bin_name))]
pub async fn run<F: Filesystem>(
    fs: &F,
    start_dir: AbsDirPath,
    opts: RunnerOptions,
    bin_name: &str,
    user_args: &[String],
) -> Result<RunOutcome> {
    let packages = discover::discover(
        fs,
        &DiscoverOptions {
            start_dir: start_dir.clone(),
            build_tag: opts.build_tag.clone(),
        },
    )
    .await
    .context("discover tagged packages")?;

    if packages.is_empty() {
        if user_args.first().map(String::as_str) == Some(dispatch::COMPLETE_TOKEN) {
            return Ok(RunOutcome::Ok);
        }
        return Ok(RunOutcome::Error("no target files found".to_string()));
    }

    let module_targets = crate::module::group_by_module(fs, packages, &start_dir)
        .await
        .context("group packages by module")?;

    if module_targets.len() == 1 {
        let registry = build_module(fs, &start_dir, &module_targets[0], &opts).await?;
        dispatch::exec_single(&registry.binary, bin_name, user_args).await
    } else {
        let registries = try_join_all(
            module_targets
                .iter()
                .cloned()
                .map(|module| {
                    let fs = fs.clone();
                    let start_dir = start_dir.clone();
                    let opts = opts.clone();
                    tokio::spawn(async move { build_module(&fs, &start_dir, &module, &opts).await })
                }),
        )
        .await
        .context("join module build tasks")?
        .into_iter()
        .collect::<Result<Vec<_>>>()?;

        dispatch::dispatch(&registries, bin_name, user_args).await
    }
}

/// Build (or reuse a cached binary for) one module, returning the registry
/// the dispatcher routes against.
#[tracing::instrument(skip(fs, project_root, opts), fields(module_path = %module.module_path))]
async fn build_module<F: Filesystem>(
    fs: &F,
    project_root: &AbsDirPath,
    module: &ModuleTargets,
    opts: &RunnerOptions,
) -> Result<ModuleRegistry> {
    let isolated = module.is_local();

    let (build_root, cache_root, module_path, packages, scratch_to_clean) = if isolated {
        let isolated_build =
            isolate::isolate(fs, &module.root, &module.packages, RUNTIME_IMPORT_PATH)
                .await
                .context("isolate packages with no owning module")?;
        (
            isolated_build.build_root.clone(),
            module.root.clone(),
            isolate::ISOLATED_MODULE_PATH.to_string(),
            isolated_build.packages,
            Some(isolated_build.build_root),
        )
    } else {
        (
            module.root.clone(),
            module.root.clone(),
            module.module_path.clone(),
            module.packages.clone(),
            None,
        )
    };

    let artifact = bootstrap::synthesize(
        fs,
        BootstrapInput {
            module_path: &module_path,
            build_root: &build_root,
            cache_root: &cache_root,
            packages: &packages,
        },
        &opts.build_tag,
    )
    .await
    .context("synthesize bootstrap driver")?;

    let cache_store = CacheStore::open(project_root).context("resolve cache store")?;

    let cache_hit = if opts.no_binary_cache {
        None
    } else {
        cache_store
            .lookup(&opts.binary_prefix, &artifact.cache_key)
            .await?
    };
    let binary = match cache_hit {
        Some(hit) => hit,
        None => build_and_cache(&build_root, &cache_store, &artifact, opts, isolated).await?,
    };

    if let Some(scratch) = scratch_to_clean {
        let _ = isolate::cleanup(&scratch).await;
    }

    dispatch::build_registry(binary, module.root.clone(), module.module_path.clone())
        .await
        .context("query built binary for its advertised commands")
}

async fn build_and_cache(
    build_root: &AbsDirPath,
    cache_store: &CacheStore,
    artifact: &crate::model::BootstrapArtifact,
    opts: &RunnerOptions,
    isolated: bool,
) -> Result<crate::path::AbsFilePath> {
    let tmp_dir = cache_store.tmp_dir()?;
    let driver_path = tmp_dir.try_join_file(format!("driver_{}.go", artifact.cache_key))?;
    let out_path = tmp_dir.try_join_file(format!("out_{}", artifact.cache_key))?;

    crate::fs::write(&driver_path, &artifact.source).await?;

    crate::compile::build(crate::compile::BuildRequest {
        build_dir: build_root,
        out_path: &out_path,
        driver_src_path: &driver_path,
        build_tag: &opts.build_tag,
        isolated,
    })
    .await
    .context("invoke compiler")?;

    let installed = cache_store
        .store_binary(&opts.binary_prefix, &artifact.cache_key, &out_path)
        .await
        .context("install built binary into cache")?;

    crate::fs::remove_file(&out_path).await?;
    if !opts.keep_driver {
        crate::fs::remove_file(&driver_path).await?;
    }

    Ok(installed)
}
