//! Shared test utilities for testjars integration tests.
//!
//! Child processes in tests are small `sh` scripts standing in for a real
//! application: [`FakeApplication`] renders one that reads `-DPORTFILE=` and
//! `-classpath` from its arguments and writes a port the way a real server
//! would once bound.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Once;

use anyhow::Context;

static TRACING: Once = Once::new();

/// Install a test-writer tracing subscriber once per test binary.
///
/// Honors `RUST_LOG`; defaults to `testjars_core=debug`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("testjars_core=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Write an executable `sh` script named `name` into `dir`.
pub fn try_write_script(dir: &Path, name: &str, body: &str) -> anyhow::Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}"))
        .with_context(|| format!("failed to write script {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .with_context(|| format!("failed to make {} executable", path.display()))?;
    }

    Ok(path)
}

/// Panicking variant of [`try_write_script`].
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    try_write_script(dir, name, body).expect("failed to write test script")
}

/// A fake child program that writes a port to its port file.
#[derive(Debug, Clone)]
pub struct FakeApplication {
    port: Option<u16>,
    required: Vec<String>,
    exit_code: i32,
    linger: bool,
}

impl FakeApplication {
    /// Writes `port` and exits 0.
    pub fn new(port: u16) -> Self {
        Self {
            port: Some(port),
            required: Vec::new(),
            exit_code: 0,
            linger: false,
        }
    }

    /// Exits with `code` without ever writing a port.
    pub fn failing(code: i32) -> Self {
        Self {
            port: None,
            required: Vec::new(),
            exit_code: code,
            linger: false,
        }
    }

    /// Exit with status 65 unless `relative` exists under some classpath
    /// element.
    pub fn requiring(mut self, relative: impl Into<String>) -> Self {
        self.required.push(relative.into());
        self
    }

    /// Keep running after writing the port, until killed.
    pub fn linger(mut self) -> Self {
        self.linger = true;
        self
    }

    /// Render the script body.
    pub fn script(&self) -> String {
        let mut script = String::from(
            r#"portfile=""
classpath=""
expect_cp=0
for arg in "$@"; do
  if [ "$expect_cp" = 1 ]; then classpath="$arg"; expect_cp=0; continue; fi
  case "$arg" in
    -classpath) expect_cp=1 ;;
    -DPORTFILE=*) portfile="${arg#-DPORTFILE=}" ;;
  esac
done
[ -n "$portfile" ] || { echo "missing -DPORTFILE argument" >&2; exit 64; }
"#,
        );

        for relative in &self.required {
            let _ = write!(
                script,
                r#"found=0
old_ifs="$IFS"; IFS=:
for entry in $classpath; do
  [ -e "$entry/{relative}" ] && found=1
done
IFS="$old_ifs"
[ "$found" = 1 ] || {{ echo "{relative} not on classpath" >&2; exit 65; }}
"#
            );
        }

        if let Some(port) = self.port {
            let _ = writeln!(script, r#"printf '%s\n' {port} > "$portfile""#);
        }
        if self.linger {
            script.push_str("exec sleep 3600\n");
        } else {
            let _ = writeln!(script, "exit {}", self.exit_code);
        }
        script
    }

    /// Write the script into `dir` and return its path.
    pub fn write(&self, dir: &Path) -> anyhow::Result<PathBuf> {
        try_write_script(dir, "fake-application.sh", &self.script())
    }
}
