//! `targ`: discover, build, cache, and run build-tag targets.

mod log;

use clap::Parser;
use color_eyre::{Result, eyre::Context};

use targ::{
    collab,
    dispatch::COMPLETE_TOKEN,
    filesystem::RealFs,
    flags::{self, EarlyFlags},
    model::RunOutcome,
    path::{AbsDirPath, TryJoinWith},
    runner::{self, RunnerOptions},
};

use crate::log::WhenColor;

/// Top-level flags recognized before the first non-flag argument; the
/// command and its own arguments are captured verbatim and passed through,
/// mirroring how a user's target name is just as free-form as any other
/// passthrough command.
#[derive(Parser, Debug)]
#[command(name = "targ", version = git_version::git_version!(fallback = "unknown"))]
struct TopLevel {
    /// Colorize log output.
    #[arg(long, value_enum, default_value_t = WhenColor::Auto, global = true)]
    color: WhenColor,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    rest: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let top = TopLevel::parse();

    let subscriber = log::make_logger(top.color)?;
    tracing::subscriber::set_global_default(subscriber).context("install tracing subscriber")?;

    match run(top.rest).await? {
        RunOutcome::Ok => Ok(()),
        RunOutcome::ChildExit(code) => std::process::exit(code),
        RunOutcome::Error(message) => {
            eprintln!("targ: {message}");
            std::process::exit(1);
        }
    }
}

#[tracing::instrument(skip(argv))]
async fn run(argv: Vec<String>) -> Result<RunOutcome> {
    if let Some(hit) = flags::find_removed_flag(&argv) {
        eprintln!("targ: {}", hit.message);
        std::process::exit(1);
    }

    let (early, remainder) = flags::extract_early_flags(&argv);

    if let Some(collaborator) = early.collaborator {
        return match collab::route_request(collaborator, &remainder) {
            Ok(request) => {
                eprintln!(
                    "targ: {request:?} is handled by an external collaborator tool, \
                     not implemented in this build"
                );
                Ok(RunOutcome::ChildExit(1))
            }
            Err(e) => Ok(RunOutcome::Error(e.to_string())),
        };
    }

    let start_dir = resolve_start_dir(&early).await?;

    let bin_name = std::env::args()
        .next()
        .map(|argv0| {
            std::path::Path::new(&argv0)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or(argv0)
        })
        .unwrap_or_else(|| "targ".to_string());

    let opts = RunnerOptions {
        no_binary_cache: early.no_binary_cache,
        ..RunnerOptions::default()
    };

    runner::run(&RealFs, start_dir, opts, &bin_name, &remainder)
        .await
        .map_err(|e| {
            if remainder.first().map(String::as_str) == Some(COMPLETE_TOKEN) {
                tracing::debug!("completion request failed: {e:?}");
            }
            e
        })
}

async fn resolve_start_dir(early: &EarlyFlags) -> Result<AbsDirPath> {
    match &early.source_override {
        Some(dir) => {
            let abs = AbsDirPath::try_from(dir.clone())
                .or_else(|_| -> Result<AbsDirPath> {
                    let cwd = AbsDirPath::current()?;
                    cwd.try_join_dir(dir.to_string_lossy())
                })
                .context("--source must name an existing directory")?;
            if !targ::fs::is_dir(abs.as_std_path()).await {
                color_eyre::eyre::bail!("--source path {abs:?} does not exist or is not a directory");
            }
            Ok(abs)
        }
        None => AbsDirPath::current(),
    }
}
