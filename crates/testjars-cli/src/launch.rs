//! `testjars run` and `testjars command`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use testjars_core::{ExecHarness, HarnessBuilder, ProcessRegistry, find_java_executable};

use crate::config::{self, Overrides};

#[derive(Debug, Args)]
pub struct LaunchArgs {
    /// Directory or jar to put on the classpath (repeatable, in order)
    #[arg(long = "classpath", short = 'c', value_name = "PATH")]
    pub classpath: Vec<PathBuf>,
    /// Main class; detected from the classpath when omitted
    #[arg(long)]
    pub main_class: Option<String>,
    /// System property passed as -Dkey=value (repeatable)
    #[arg(short = 'D', value_name = "KEY=VALUE", value_parser = parse_property)]
    pub properties: Vec<(String, String)>,
    /// Program to launch (overrides TESTJARS_EXECUTABLE and the config file)
    #[arg(long, conflicts_with = "java")]
    pub executable: Option<PathBuf>,
    /// Launch with $JAVA_HOME/bin/java, or java from PATH
    #[arg(long)]
    pub java: bool,
    /// Seconds to wait for the port file (0 waits forever)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
    /// Attach a remote debug agent
    #[arg(long)]
    pub debug: bool,
    /// Debug agent port (implies --debug)
    #[arg(long)]
    pub debug_port: Option<u16>,
    /// Suspend until a debugger attaches (implies --debug)
    #[arg(long)]
    pub debug_suspend: bool,
}

fn parse_property(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    if key.trim().is_empty() {
        return Err(format!("empty property name in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

impl LaunchArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            executable: match (&self.executable, self.java) {
                (Some(executable), _) => Some(executable.clone()),
                (None, true) => Some(find_java_executable()),
                (None, false) => None,
            },
            timeout_secs: self.timeout,
            debug: self.debug,
            debug_port: self.debug_port,
            debug_suspend: self.debug_suspend,
        }
    }

    fn build(&self) -> Result<ExecHarness> {
        let config = config::resolve(&self.overrides());
        let registry = Arc::new(ProcessRegistry::with_grace_period(config.shutdown_grace));

        let mut builder = HarnessBuilder::with_config(config)
            .registry(registry)
            .files(&self.classpath)
            .context("invalid classpath entry")?
            .system_properties(self.properties.iter().cloned());
        if let Some(main_class) = &self.main_class {
            builder = builder.main_class(main_class.as_str())?;
        }
        builder.build().context("failed to prepare the application")
    }
}

/// Print the command line that `run` would execute.
pub fn cmd_command(args: &LaunchArgs) -> Result<()> {
    let harness = args.build()?;
    println!("{}", harness.command());
    Ok(())
}

/// Start the application, print its port, then wait for Ctrl-C or for the
/// application to exit.
pub async fn cmd_run(args: &LaunchArgs) -> Result<()> {
    let mut harness = args.build()?;
    info!(command = %harness.command(), "starting application");

    if let Err(e) = harness.start() {
        harness.stop().await;
        return Err(e).context("failed to start application");
    }

    let port = match harness.port().await {
        Ok(port) => port,
        Err(e) => {
            harness.stop().await;
            return Err(e).context("application did not report a port");
        }
    };
    println!("port={port}");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupted, stopping application"),
        state = harness.wait() => info!(?state, "application exited"),
    }

    harness.stop().await;
    Ok(())
}
