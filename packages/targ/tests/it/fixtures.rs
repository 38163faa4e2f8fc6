//! Test fixtures: a fake compiler/toolchain sandbox so the pipeline tests
//! don't need a real Go install, plus small helpers for writing tagged
//! source trees.

use std::{
    path::Path,
    sync::{Mutex, OnceLock},
};

use targ::{compile::COMPILER_ENV, path::AbsDirPath};

/// Every test in this crate mutates process-global environment variables
/// (`TARG_COMPILER`, `HOME`, `XDG_CACHE_HOME`) to sandbox the pipeline, so
/// only one can run at a time. `cargo test` runs this integration binary's
/// tests on multiple threads by default; this mutex turns that into the
/// sequential execution the env-var sandboxing actually requires.
fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

/// A sandboxed toolchain: an isolated `$HOME`/`$XDG_CACHE_HOME` so the binary
/// cache never touches the real user cache, plus a fake compiler standing in
/// for `go build`.
pub struct FakeToolchain {
    _env_guard: std::sync::MutexGuard<'static, ()>,
    _home: tempfile::TempDir,
    _cache_home: tempfile::TempDir,
    _compiler_dir: tempfile::TempDir,
    /// Path to a file the fake compiler appends a line to on every
    /// invocation, so tests can assert on how many times it actually ran.
    pub compile_marker: std::path::PathBuf,
}

impl FakeToolchain {
    /// Install the sandboxed toolchain for the current test. Responses are
    /// chosen by the fake compiler based on the basename of its working
    /// directory (the module root it's building), per `responses`.
    ///
    /// # Safety
    /// Mutates process environment variables; serialized by [`env_lock`].
    pub fn install(responses: &[(&str, &[(&str, &str)])]) -> Self {
        let guard = env_lock().lock().unwrap_or_else(|e| e.into_inner());

        let home = tempfile::tempdir().expect("create fake $HOME");
        let cache_home = tempfile::tempdir().expect("create fake $XDG_CACHE_HOME");
        let compiler_dir = tempfile::tempdir().expect("create fake compiler dir");

        let compile_marker = compiler_dir.path().join("compile-count");
        std::fs::write(&compile_marker, b"").expect("seed compile marker");

        let compiler_path = compiler_dir.path().join("fake-go");
        std::fs::write(&compiler_path, render_compiler_script(responses))
            .expect("write fake compiler script");
        make_executable(&compiler_path);

        // SAFETY: serialized by `env_lock`; restored by nothing (each test
        // process is short-lived and these are set before any other test on
        // this thread reads them).
        unsafe {
            std::env::set_var(COMPILER_ENV, &compiler_path);
            std::env::set_var("HOME", home.path());
            std::env::set_var("XDG_CACHE_HOME", cache_home.path());
            std::env::set_var("TARG_COMPILE_MARKER", &compile_marker);
        }

        Self {
            _env_guard: guard,
            _home: home,
            _cache_home: cache_home,
            _compiler_dir: compiler_dir,
            compile_marker,
        }
    }

    /// Number of times the fake compiler has been invoked so far.
    pub fn compile_count(&self) -> usize {
        std::fs::read_to_string(&self.compile_marker)
            .expect("read compile marker")
            .lines()
            .filter(|l| !l.is_empty())
            .count()
    }
}

fn render_compiler_script(responses: &[(&str, &[(&str, &str)])]) -> String {
    let mut cases = String::new();
    for (dirname, commands) in responses {
        let cmds_json = commands
            .iter()
            .map(|(name, desc)| format!(r#"{{"name":"{name}","description":"{desc}"}}"#))
            .collect::<Vec<_>>()
            .join(",");
        cases.push_str(&format!(
            "    {dirname}) cmds='[{cmds_json}]' ;;\n"
        ));
    }

    format!(
        r#"#!/bin/sh
set -e

out=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "-o" ]; then
    out="$arg"
  fi
  prev="$arg"
done

echo x >> "$TARG_COMPILE_MARKER"

dirname=$(basename "$(pwd)")
case "$dirname" in
{cases}    *) cmds='[]' ;;
esac

{{
  echo '#!/bin/sh'
  echo 'if [ "$1" = "__list" ]; then'
  echo "  echo '{{\"commands\":$cmds}}'"
  echo '  exit 0'
  echo 'fi'
  echo 'exit 0'
}} > "$out"
chmod +x "$out"
"#
    )
}

#[cfg(unix)]
fn make_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path).unwrap().permissions();
    perms.set_mode(perms.mode() | 0o111);
    std::fs::set_permissions(path, perms).unwrap();
}

/// A tagged Go-style source file body registering `target` via the targ
/// runtime, for a package named `package_name`, under the configured build
/// tag.
pub fn tagged_source(package_name: &str, target: &str) -> String {
    format!(
        "//go:build targ\n\n\
         package {package_name}\n\n\
         import (\n\
         \ttargtask \"github.com/toejough/targ/task\"\n\
         )\n\n\
         func init() {{ targtask.Register({target}) }}\n\n\
         func {target}() {{}}\n"
    )
}

pub fn abs_dir(path: impl AsRef<Path>) -> AbsDirPath {
    AbsDirPath::try_from(path.as_ref().to_path_buf()).expect("temp path is absolute")
}
