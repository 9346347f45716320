// CLI module - User-facing command-line interface

mod output;

use crate::config::WatcherSpec;
use crate::error::Result;
use crate::process::Supervisor;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// warden - supervises long-running watcher processes
#[derive(Parser)]
#[command(name = "warden")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Operational log filter (tracing env-filter syntax)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Supervise all watchers from an ecosystem file in the foreground
    Run {
        /// Path to the ecosystem file (.toml or .json)
        config: PathBuf,
    },

    /// Validate an ecosystem file and show the parsed watchers
    Check {
        /// Path to the ecosystem file (.toml or .json)
        config: PathBuf,
    },
}

impl Cli {
    pub async fn run() -> Result<()> {
        let cli = Cli::parse();

        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();

        match cli.command {
            Commands::Run { config } => run_supervisor(&config).await,
            Commands::Check { config } => check_config(&config),
        }
    }
}

/// Load the ecosystem file and supervise its watchers until a shutdown
/// signal arrives
async fn run_supervisor(config: &Path) -> Result<()> {
    let specs = WatcherSpec::from_file(config)?;
    output::print_info(&format!(
        "Supervising {} watcher(s) from {}",
        specs.len(),
        config.display()
    ));

    let (mut supervisor, handle) = Supervisor::with_defaults();
    supervisor.start(specs).await?;
    let loop_task = tokio::spawn(supervisor.run());

    wait_for_shutdown_signal().await?;

    output::print_info("Shutting down watchers...");
    let summary = handle.shutdown().await?;
    output::print_status_table(&summary);

    let _ = loop_task.await;
    Ok(())
}

/// Block until SIGINT or SIGTERM
async fn wait_for_shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = sigterm.recv() => {}
    }
    Ok(())
}

/// Validate the ecosystem file without spawning anything
fn check_config(config: &Path) -> Result<()> {
    let specs = WatcherSpec::from_file(config)?;

    output::print_success_msg(&format!(
        "{} is valid ({} watcher(s))",
        config.display(),
        specs.len()
    ));
    output::print_spec_table(&specs);

    Ok(())
}
