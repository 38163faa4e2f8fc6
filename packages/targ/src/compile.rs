//! The compiler driver: invokes the external language compiler.

use std::process::Stdio;

use color_eyre::{Result, eyre::Context, eyre::bail};
use tokio::process::Command;

use crate::path::{AbsDirPath, AbsFilePath, TryJoinWith};

/// Environment variable overriding the compiler binary invoked, primarily so
/// tests can run without the real toolchain installed.
pub const COMPILER_ENV: &str = "TARG_COMPILER";

/// Default compiler binary.
const DEFAULT_COMPILER: &str = "go";

/// One compilation request.
pub struct BuildRequest<'a> {
    pub build_dir: &'a AbsDirPath,
    pub out_path: &'a AbsFilePath,
    pub driver_src_path: &'a AbsFilePath,
    pub build_tag: &'a str,
    /// Whether this build is against an isolated-module scratch root,
    /// requiring the module descriptor to be read locally rather than
    /// resolved against the user's original module graph.
    pub isolated: bool,
}

fn compiler_binary() -> String {
    std::env::var(COMPILER_ENV).unwrap_or_else(|_| DEFAULT_COMPILER.to_string())
}

/// Invoke the external compiler. Stdout is discarded; stderr is captured and,
/// on a non-zero exit, forwarded verbatim in the returned error.
#[tracing::instrument(skip(request), fields(build_dir = %request.build_dir, isolated = request.isolated))]
pub async fn build(request: BuildRequest<'_>) -> Result<()> {
    let compiler = compiler_binary();

    let mut cmd = Command::new(&compiler);
    cmd.current_dir(request.build_dir.as_std_path())
        .arg("build")
        .arg("-tags")
        .arg(request.build_tag)
        .arg("-o")
        .arg(request.out_path.as_std_path());

    if request.isolated {
        cmd.arg("-mod=mod");
    }

    cmd.arg(request.driver_src_path.as_std_path());
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    let output = cmd
        .output()
        .await
        .with_context(|| format!("invoke compiler {compiler:?}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::error!(%stderr, "compiler exited non-zero");
        bail!(
            "compiler {compiler:?} exited with {}:\n{stderr}",
            output.status
        );
    }

    Ok(())
}
