// src/main.rs

use clap::Parser;

mod config;
mod error;
mod logging;
mod sequencer;
mod sys;

use crate::config::{CleanupConfig, DeployConfig};
use crate::error::DeployError;
use crate::sequencer::{CleanupSequencer, DeploySequencer};

/// Deploys one repository, containerized, to one remote host, with nginx in
/// front of it. Cleanup mode reverses the remote side of a prior deployment.
#[derive(Parser)]
#[command(name = "deckhand", version, about)]
struct Cli {
    /// Tear down a previous deployment instead of deploying.
    #[arg(long)]
    cleanup: bool,

    /// Verbose diagnostics on the terminal and in the log file.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_path = match logging::init(cli.verbose) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("error: failed to initialize logging: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(log = %log_path.display(), "deckhand starting");

    let result = if cli.cleanup {
        run_cleanup().await
    } else {
        run_deploy().await
    };

    if let Err(e) = result {
        tracing::error!(stage = e.stage(), exit_code = e.exit_code(), "{}", e);
        eprintln!("error: {}", e);
        if let Some(hint) = e.remediation() {
            eprintln!("hint: {}", hint);
        }
        eprintln!("full log: {}", log_path.display());
        std::process::exit(e.exit_code());
    }
}

async fn run_deploy() -> Result<(), DeployError> {
    let cfg = DeployConfig::from_prompts()?;
    let summary = serde_json::to_string(&cfg.summary())
        .map_err(|e| DeployError::Unexpected(format!("summary serialization failed: {}", e)))?;
    tracing::info!(config = %summary, "deploy configuration collected");

    let sequencer = DeploySequencer::new(&cfg)?;
    let outcome = sequencer.run(&cfg).await?;

    println!(
        "Deployed ({} mode). http://{}/ -> 127.0.0.1:{} on the target.",
        outcome.mode, cfg.remote_host, cfg.internal_port
    );
    println!("Local working tree kept at {}", outcome.workdir.display());
    Ok(())
}

async fn run_cleanup() -> Result<(), DeployError> {
    let cfg = CleanupConfig::from_prompts()?;
    tracing::info!(
        remote = %format!("{}@{}", cfg.remote_user, cfg.remote_host),
        dir = %cfg.remote_dir,
        "cleanup configuration collected"
    );

    let sequencer = CleanupSequencer::new(&cfg);
    sequencer.run(&cfg).await?;

    println!("Cleanup complete on {}.", cfg.remote_host);
    Ok(())
}
