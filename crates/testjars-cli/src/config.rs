//! Configuration file management for testjars.
//!
//! Provides a TOML-based config file at `~/.config/testjars/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use testjars_core::{DebugConfig, HarnessConfig};

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Program used to launch applications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,
    /// Seconds to wait for the port file; `0` waits forever.
    pub timeout_secs: u64,
    /// Milliseconds between SIGTERM and SIGKILL on shutdown.
    pub shutdown_grace_ms: u64,
    pub debug: DebugSection,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugSection {
    pub enabled: bool,
    pub port: u16,
    pub suspend: bool,
}

impl Default for DebugSection {
    fn default() -> Self {
        let debug = DebugConfig::default();
        Self {
            enabled: false,
            port: debug.port,
            suspend: debug.suspend,
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ConfigFile {
    /// A config file holding the library defaults.
    pub fn with_defaults() -> Self {
        Self {
            executable: None,
            timeout_secs: HarnessConfig::DEFAULT_PORT_TIMEOUT.as_secs(),
            shutdown_grace_ms: HarnessConfig::DEFAULT_SHUTDOWN_GRACE.as_millis() as u64,
            debug: DebugSection::default(),
        }
    }

    /// Answer a `TESTJARS_*` key from the file, so the file can sit behind
    /// the environment in [`HarnessConfig::from_lookup`].
    fn lookup(&self, key: &str) -> Option<String> {
        match key {
            "TESTJARS_EXECUTABLE" => self
                .executable
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            "TESTJARS_PORT_TIMEOUT_SECS" => Some(self.timeout_secs.to_string()),
            "TESTJARS_SHUTDOWN_GRACE_MS" => Some(self.shutdown_grace_ms.to_string()),
            "TESTJARS_DEBUG" => Some(self.debug.enabled.to_string()),
            "TESTJARS_DEBUG_PORT" => Some(self.debug.port.to_string()),
            "TESTJARS_DEBUG_SUSPEND" => Some(self.debug.suspend.to_string()),
            _ => None,
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the testjars config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/testjars` or
/// `~/.config/testjars`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("testjars");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("testjars")
}

/// Return the path to the testjars config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;
    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Values given on the command line. `None` / `false` means "not given".
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub executable: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub debug: bool,
    pub debug_port: Option<u16>,
    pub debug_suspend: bool,
}

/// Resolve the harness configuration using the chain:
/// CLI flag > `TESTJARS_*` env var > config file > default.
pub fn resolve(overrides: &Overrides) -> HarnessConfig {
    let file = match load_config() {
        Ok(file) => Some(file),
        Err(e) => {
            tracing::debug!(error = %format!("{e:#}"), "no usable config file");
            None
        }
    };
    resolve_from(overrides, |key| std::env::var(key).ok(), file.as_ref())
}

fn resolve_from(
    overrides: &Overrides,
    env: impl Fn(&str) -> Option<String>,
    file: Option<&ConfigFile>,
) -> HarnessConfig {
    let mut config =
        HarnessConfig::from_lookup(|key| env(key).or_else(|| file.and_then(|f| f.lookup(key))));

    if let Some(executable) = &overrides.executable {
        config.executable = Some(executable.clone());
    }
    if let Some(secs) = overrides.timeout_secs {
        config.port_timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }
    if overrides.debug || overrides.debug_port.is_some() || overrides.debug_suspend {
        let mut debug = config.debug.unwrap_or_default();
        if let Some(port) = overrides.debug_port {
            debug.port = port;
        }
        if overrides.debug_suspend {
            debug.suspend = true;
        }
        config.debug = Some(debug);
    }
    config
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
