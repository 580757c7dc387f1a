mod commands;
mod decider;
mod progress;
mod utils;

use clap::{Parser, Subcommand};
use gpufleet_config::Settings;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gpufleet")]
#[command(
    about = "Conflict-aware GPU provisioning around terraform and the aws CLI",
    long_about = None
)]
struct Cli {
    /// Environment name (overrides the settings file)
    #[arg(short, long, global = true, env = "GPUFLEET_ENV")]
    env: Option<String>,

    /// Region (overrides the settings file)
    #[arg(short, long, global = true, env = "GPUFLEET_REGION")]
    region: Option<String>,

    /// Settings file (default: search the current directory, then ~/.config/gpufleet)
    #[arg(short, long, global = true, env = "GPUFLEET_CONFIG")]
    config: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run quota and conflict checks without applying anything
    Preflight {
        /// Confirm destructive remediation without prompting
        #[arg(short, long)]
        yes: bool,
    },
    /// Provision the environment: preflight, apply, zone failover
    Up {
        /// Accept every prompt (remediation, zone choice, rollback)
        #[arg(short, long)]
        yes: bool,
        /// Apply even when a blocking check did not clear
        #[arg(long)]
        override_blocked: bool,
        /// Keep partially created resources when the apply fails
        #[arg(long)]
        keep_partial: bool,
    },
    /// Destroy everything the engine tracks for this environment
    Rollback {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Delete leftover resources in dependency order
    Cleanup {
        /// List what would be deleted, delete nothing
        #[arg(long)]
        dry_run: bool,
        /// Do not ask for confirmation
        #[arg(short, long)]
        force: bool,
        /// Naming prefix to clean up (default: the environment's prefix)
        #[arg(short, long, conflicts_with = "network")]
        prefix: Option<String>,
        /// Clean up the contents of one network instead of a prefix
        #[arg(short, long)]
        network: Option<String>,
    },
    /// Show the persisted deployment state
    Status {
        /// Print the record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check vCPU quota for the configured instance type
    Quota,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Version needs no settings file
    if matches!(cli.command, Commands::Version) {
        println!("gpufleet {}", env!("CARGO_PKG_VERSION"));
        return Ok(ExitCode::SUCCESS);
    }

    let settings = load_settings(&cli)?;

    match cli.command {
        Commands::Preflight { yes } => commands::preflight::handle(settings, yes).await,
        Commands::Up {
            yes,
            override_blocked,
            keep_partial,
        } => commands::up::handle(settings, yes, override_blocked, keep_partial).await,
        Commands::Rollback { yes } => commands::rollback::handle(settings, yes).await,
        Commands::Cleanup {
            dry_run,
            force,
            prefix,
            network,
        } => commands::cleanup::handle(settings, dry_run, force, prefix, network).await,
        Commands::Status { json } => commands::status::handle(settings, json).await,
        Commands::Quota => commands::quota::handle(settings).await,
        Commands::Version => Ok(ExitCode::SUCCESS),
    }
}

/// stderr only; stdout is the operator channel
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let mut settings = match cli.config {
        Some(ref path) => Settings::load(path)
            .map_err(|e| anyhow::anyhow!("cannot load {}: {}", path.display(), e))?,
        None => gpufleet_config::load_settings()?,
    };

    if let Some(ref environment) = cli.env {
        settings.environment = environment.clone();
    }
    if let Some(ref region) = cli.region {
        settings.region = region.clone();
    }
    Ok(settings)
}
