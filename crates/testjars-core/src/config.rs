use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::command::DebugConfig;

/// Harness configuration.
///
/// Reads `TESTJARS_*` environment variables, falling back to compile-time
/// defaults when unset or unparseable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Maximum time to wait for the child to write its port. `None` waits
    /// indefinitely.
    pub port_timeout: Option<Duration>,
    /// Time allowed between SIGTERM and SIGKILL when destroying a child.
    pub shutdown_grace: Duration,
    /// Executable override. `None` uses the currently running program.
    pub executable: Option<PathBuf>,
    /// Debug agent configuration applied to every launched child.
    pub debug: Option<DebugConfig>,
}

impl HarnessConfig {
    pub const DEFAULT_PORT_TIMEOUT: Duration = Duration::from_secs(120);
    pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_millis(5000);

    /// Build a config from the environment.
    ///
    /// - `TESTJARS_PORT_TIMEOUT_SECS`: port wait timeout, `0` disables it.
    /// - `TESTJARS_SHUTDOWN_GRACE_MS`: SIGTERM to SIGKILL grace period.
    /// - `TESTJARS_EXECUTABLE`: program used to launch children.
    /// - `TESTJARS_DEBUG`, `TESTJARS_DEBUG_PORT`, `TESTJARS_DEBUG_SUSPEND`:
    ///   attach a debug agent to every child.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup using the same keys and
    /// parsing rules as [`from_env`](Self::from_env).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port_timeout = match lookup("TESTJARS_PORT_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(Self::DEFAULT_PORT_TIMEOUT),
        };

        let shutdown_grace = lookup("TESTJARS_SHUTDOWN_GRACE_MS")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(Self::DEFAULT_SHUTDOWN_GRACE);

        let executable = lookup("TESTJARS_EXECUTABLE")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let debug = lookup("TESTJARS_DEBUG")
            .filter(|v| parse_flag(v))
            .map(|_| {
                let mut debug = DebugConfig::default();
                if let Some(port) = lookup("TESTJARS_DEBUG_PORT").and_then(|v| v.parse().ok()) {
                    debug.port = port;
                }
                if let Some(suspend) = lookup("TESTJARS_DEBUG_SUSPEND") {
                    debug.suspend = parse_flag(&suspend);
                }
                debug
            });

        Self {
            port_timeout,
            shutdown_grace,
            executable,
            debug,
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}
