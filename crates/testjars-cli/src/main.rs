mod config;
mod launch;

use clap::{Parser, Subcommand};

use launch::LaunchArgs;

#[derive(Parser)]
#[command(
    name = "testjars",
    about = "Run a packaged application as a subprocess and report the port it bound"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an application, print `port=<n>` once it is listening, and
    /// stop it on Ctrl-C
    Run(LaunchArgs),
    /// Print the command line `run` would execute
    Command(LaunchArgs),
    /// Write a testjars config file with the default settings
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => launch::cmd_run(&args).await?,
        Commands::Command(args) => launch::cmd_command(&args)?,
        Commands::Init { force } => cmd_init(force)?,
    }

    Ok(())
}

fn cmd_init(force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile::with_defaults();
    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  timeout_secs = {}", cfg.timeout_secs);
    println!("  shutdown_grace_ms = {}", cfg.shutdown_grace_ms);
    println!("  debug.port = {}", cfg.debug.port);
    Ok(())
}
