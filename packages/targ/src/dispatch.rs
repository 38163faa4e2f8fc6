//! The dispatcher: executes the built binary, or routes a command across
//! several module binaries.

use std::process::Stdio;

use color_eyre::{Result, eyre::Context, eyre::bail};
use itertools::Itertools;
use serde::Deserialize;
use tokio::process::Command;

use crate::{
    model::{CommandInfo, ModuleRegistry, RunOutcome},
    path::AbsFilePath,
};

/// Environment variable set on the child binary to the basename the user
/// invoked the top-level tool as.
pub const BIN_NAME_ENV: &str = "TARG_BIN_NAME";

/// The reserved subcommand a binary is queried with to discover its
/// advertised commands.
pub const LIST_SUBCOMMAND: &str = "__list";

/// The reserved token marking a shell-completion request.
pub const COMPLETE_TOKEN: &str = "__complete";

#[derive(Deserialize)]
struct ListResponse {
    commands: Vec<CommandInfo>,
}

/// Query `binary`'s advertised commands via the `__list` protocol.
#[tracing::instrument(fields(binary = %binary))]
pub async fn list_commands(binary: &AbsFilePath) -> Result<Vec<CommandInfo>> {
    let output = Command::new(binary.as_std_path())
        .arg(LIST_SUBCOMMAND)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .with_context(|| format!("invoke {binary:?} {LIST_SUBCOMMAND}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("{binary:?} {LIST_SUBCOMMAND} exited with {}: {stderr}", output.status);
    }

    let response: ListResponse = serde_json::from_slice(&output.stdout)
        .with_context(|| format!("parse {LIST_SUBCOMMAND} output from {binary:?}"))?;
    Ok(response.commands)
}

/// Build a [`ModuleRegistry`] for one already-built module binary.
pub async fn build_registry(
    binary: AbsFilePath,
    root: crate::path::AbsDirPath,
    module_path: String,
) -> Result<ModuleRegistry> {
    let commands = list_commands(&binary).await?;
    Ok(ModuleRegistry {
        binary,
        root,
        module_path,
        commands,
    })
}

/// Single-module path: exec the binary with the user's residual arguments,
/// inheriting stdio.
#[tracing::instrument(skip(args), fields(binary = %binary, bin_name))]
pub async fn exec_single(binary: &AbsFilePath, bin_name: &str, args: &[String]) -> Result<RunOutcome> {
    let status = Command::new(binary.as_std_path())
        .args(args)
        .env(BIN_NAME_ENV, bin_name)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .with_context(|| format!("exec {binary:?}"))?;

    Ok(exit_status_to_outcome(status))
}

fn exit_status_to_outcome(status: std::process::ExitStatus) -> RunOutcome {
    match status.code() {
        Some(0) => RunOutcome::Ok,
        Some(code) => RunOutcome::ChildExit(code),
        None => RunOutcome::Error(format!("child process terminated by signal: {status}")),
    }
}

/// Find the first registry whose advertised commands contain `command`
/// exactly, or a command beginning with `"{command} "` (the nested
/// "group subcommand" form).
pub fn route<'a>(registries: &'a [ModuleRegistry], command: &str) -> Option<&'a ModuleRegistry> {
    registries.iter().find(|r| r.route(command).is_some())
}

/// Multi-module path: route `args` to the owning binary and exec it with the
/// user's full argument vector, or print merged help and exit non-zero if no
/// registry advertises the command.
#[tracing::instrument(skip(registries, args), fields(bin_name, num_registries = registries.len()))]
pub async fn dispatch(
    registries: &[ModuleRegistry],
    bin_name: &str,
    args: &[String],
) -> Result<RunOutcome> {
    let Some(command) = args.first() else {
        println!("{}", merged_help(registries));
        return Ok(RunOutcome::ChildExit(1));
    };

    if command == COMPLETE_TOKEN {
        for candidate in complete(registries, &args[1..]).await? {
            println!("{candidate}");
        }
        return Ok(RunOutcome::Ok);
    }

    match route(registries, command) {
        Some(registry) => exec_single(&registry.binary, bin_name, args).await,
        None => {
            println!("{}", merged_help(registries));
            Ok(RunOutcome::ChildExit(1))
        }
    }
}

/// Merge every registry's advertised commands into one alphabetized listing.
pub fn merged_help(registries: &[ModuleRegistry]) -> String {
    registries
        .iter()
        .flat_map(|r| r.commands.iter())
        .sorted_by(|a, b| a.name.cmp(&b.name))
        .map(|c| format!("{}\t{}", c.name, c.description))
        .join("\n")
}

/// Fan a completion request out to every binary, deduplicating the combined
/// output while preserving first-seen order.
async fn complete(registries: &[ModuleRegistry], partial_args: &[String]) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for registry in registries {
        let output = Command::new(registry.binary.as_std_path())
            .arg(COMPLETE_TOKEN)
            .args(partial_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
            .with_context(|| format!("invoke {:?} {COMPLETE_TOKEN}", registry.binary))?;
        if output.status.success() {
            out.extend(
                String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .map(|l| l.to_string()),
            );
        }
    }
    Ok(out.into_iter().unique().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn registry(module_path: &str, commands: &[(&str, &str)]) -> ModuleRegistry {
        ModuleRegistry {
            binary: AbsFilePath::try_from("/bin/mod").unwrap(),
            root: crate::path::AbsDirPath::try_from("/mod").unwrap(),
            module_path: module_path.into(),
            commands: commands
                .iter()
                .map(|(name, desc)| CommandInfo {
                    name: name.to_string(),
                    description: desc.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn routes_to_the_registry_advertising_the_command() {
        let registries = vec![
            registry("a", &[("foo", "does foo")]),
            registry("b", &[("bar", "does bar")]),
        ];
        assert_eq!(route(&registries, "bar").unwrap().module_path, "b");
        assert!(route(&registries, "missing").is_none());
    }

    #[test]
    fn merged_help_is_alphabetized_across_registries() {
        let registries = vec![
            registry("a", &[("zzz", "last")]),
            registry("b", &[("aaa", "first")]),
        ];
        let help = merged_help(&registries);
        assert!(help.find("aaa").unwrap() < help.find("zzz").unwrap());
    }
}
