//! Early-flag and source-override handling.
//!
//! Before discovery runs, the runner scans raw argv for two classes of
//! flag: position-sensitive ones (consumed only before the first non-flag
//! argument) and early ones (short-circuit the pipeline entirely). This
//! module is pure argv-in, struct-out so the testable properties in the
//! corresponding test suite don't need a child process or a filesystem.

use std::path::PathBuf;

/// An early flag whose presence short-circuits the normal pipeline,
/// routed to an external collaborator instead.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum EarlyCollaboratorFlag {
    Create,
    Sync,
    Convert,
}

impl EarlyCollaboratorFlag {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "--create" => Some(Self::Create),
            "--sync" => Some(Self::Sync),
            "--convert" => Some(Self::Convert),
            _ => None,
        }
    }
}

/// A flag that has been removed; encountering it prints its own removal
/// message and exits non-zero rather than running the pipeline.
const REMOVED_FLAGS: &[(&str, &str)] = &[(
    "--legacy-runner",
    "--legacy-runner was removed; the legacy runner backend no longer exists",
)];

/// The result of scanning argv for position-sensitive and early flags.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct EarlyFlags {
    /// `--source <dir>` / `-s <dir>`: overrides the discovery start directory.
    pub source_override: Option<PathBuf>,
    /// `--no-binary-cache`, or the deprecated `--no-cache` alias.
    pub no_binary_cache: bool,
    /// An early flag that should short-circuit the pipeline entirely.
    pub collaborator: Option<EarlyCollaboratorFlag>,
}

/// The outcome of scanning for a removed flag.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct RemovedFlagHit {
    pub flag: String,
    pub message: String,
}

/// Scan `argv` for position-sensitive and early flags, consuming them only
/// up to (not including) the first non-flag argument. Returns the parsed
/// flags plus the untouched remainder of argv — any flag occurrence at or
/// after the first non-flag argument passes through unchanged in the
/// remainder, exactly as given.
pub fn extract_early_flags(argv: &[String]) -> (EarlyFlags, Vec<String>) {
    let mut flags = EarlyFlags::default();
    let mut i = 0;

    while i < argv.len() {
        let token = argv[i].as_str();

        if !token.starts_with('-') {
            break;
        }

        match token {
            "--source" | "-s" => {
                if let Some(dir) = argv.get(i + 1) {
                    flags.source_override = Some(PathBuf::from(dir));
                    i += 2;
                    continue;
                }
                break;
            }
            "--no-binary-cache" => {
                flags.no_binary_cache = true;
                i += 1;
                continue;
            }
            "--no-cache" => {
                tracing::warn!("--no-cache is deprecated; use --no-binary-cache instead");
                flags.no_binary_cache = true;
                i += 1;
                continue;
            }
            _ => {}
        }

        if let Some(collaborator) = EarlyCollaboratorFlag::from_token(token) {
            flags.collaborator = Some(collaborator);
            i += 1;
            continue;
        }

        // An unrecognized flag before the first non-flag argument: it isn't
        // one of ours, stop scanning and let the remainder carry it through.
        break;
    }

    (flags, argv[i..].to_vec())
}

/// Scan `argv` (before the first non-flag argument) for a removed flag.
pub fn find_removed_flag(argv: &[String]) -> Option<RemovedFlagHit> {
    for token in argv {
        if token == "--" {
            break;
        }
        if !token.starts_with('-') {
            break;
        }
        if let Some((flag, message)) = REMOVED_FLAGS.iter().find(|(flag, _)| flag == token) {
            return Some(RemovedFlagHit {
                flag: flag.to_string(),
                message: message.to_string(),
            });
        }
    }
    None
}

/// The result of [`parse_help_request`].
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct HelpRequest {
    pub help_requested: bool,
    /// True when a non-flag argument preceded the first `--help`/`-h`,
    /// meaning the request should be scoped to that target rather than
    /// rendered as top-level help.
    pub scoped_to_target: bool,
}

/// `--help`/`-h` anywhere in argv marks help requested; a non-flag before
/// the first help token scopes the request to that target. Tokens after a
/// bare `--` are ignored.
pub fn parse_help_request(argv: &[String]) -> HelpRequest {
    let mut saw_non_flag = false;

    for token in argv {
        if token == "--" {
            break;
        }
        if token == "--help" || token == "-h" {
            return HelpRequest {
                help_requested: true,
                scoped_to_target: saw_non_flag,
            };
        }
        if !token.starts_with('-') {
            saw_non_flag = true;
        }
    }

    HelpRequest {
        help_requested: false,
        scoped_to_target: false,
    }
}
