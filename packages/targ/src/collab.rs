//! CLI surface for the external collaborators.
//!
//! Target creation, the string/function conversion subcommand, tag-file
//! sync, the issue-file tooling, and shell-completion emission are thin
//! transformations over this core's outputs or over parsed source — this
//! crate specifies and routes to their *interface* (so flag parsing and
//! routing stay testable, per the invariants this module's tests cover) but
//! does not implement their behavior.

use color_eyre::{Result, eyre::bail};

use crate::{flags::EarlyCollaboratorFlag, model::CreateOptions};

/// A request routed to one of the external collaborators. Carries enough of
/// the parsed CLI surface to prove routing works; the collaborator itself
/// decides what to do with it.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum CollaboratorRequest {
    Create(CreateOptions),
    Sync,
    Convert { target: String },
}

/// Parse the residual argv for an early collaborator flag into a typed
/// request. This only validates the shape the core contract requires
/// (name and shell command for `--create`, a target name for `--convert`);
/// the collaborator that actually performs the creation/sync/conversion is
/// out of scope here.
pub fn route_request(flag: EarlyCollaboratorFlag, args: &[String]) -> Result<CollaboratorRequest> {
    match flag {
        EarlyCollaboratorFlag::Sync => Ok(CollaboratorRequest::Sync),
        EarlyCollaboratorFlag::Convert => {
            let Some(target) = args.first() else {
                bail!("--convert requires a target name");
            };
            Ok(CollaboratorRequest::Convert {
                target: target.clone(),
            })
        }
        EarlyCollaboratorFlag::Create => {
            let [name, shell_command, ..] = args else {
                bail!("--create requires a target name and a shell command");
            };
            Ok(CollaboratorRequest::Create(
                CreateOptions::builder()
                    .name(name.clone())
                    .shell_command(shell_command.clone())
                    .build(),
            ))
        }
    }
}
