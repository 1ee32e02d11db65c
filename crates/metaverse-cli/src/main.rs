//! `metaverse` command-line entry point.

mod config;

use clap::{Parser, Subcommand};
use metaverse_agent::VersionBumpProvider;
use metaverse_orchestrator::MetaverseOrchestrator;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "metaverse", about = "Metaverse multi-agent simulation")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "metaverse.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the starter world and run the global loop
    Run {
        /// Global ticks to run (overrides config)
        #[arg(short, long)]
        duration: Option<u64>,
    },
    /// Validate the config file and print the resolved settings
    Check,
    /// Initialize the starter world and link environments
    Optimize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout carries only the JSON summary.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let config = config::load(&cli.config).await?;

    match cli.command {
        Commands::Run { duration } => {
            let duration = duration.unwrap_or(config.run.duration);
            info!(duration, config = %cli.config.display(), "Starting Metaverse simulation");

            let mut orchestrator = MetaverseOrchestrator::new(
                config.simulation,
                config.agent,
                Arc::new(VersionBumpProvider),
            )?;
            let init = orchestrator.initialize().await?;
            let run = orchestrator.run_for(duration).await?;
            let environments = orchestrator.snapshots().await?;
            let agents = orchestrator.agents();

            let summary = json!({
                "initialized": init,
                "run": run,
                "environments": environments,
                "agents": agents,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Check => {
            let starters: Vec<_> = config
                .simulation
                .starter_environments
                .iter()
                .map(|s| json!({ "name": s.name, "type": s.env_type, "capacity": s.capacity }))
                .collect();
            let summary = json!({
                "status": "ok",
                "config": cli.config.display().to_string(),
                "tick_interval_ms": config.simulation.tick_interval_ms,
                "run_duration": config.run.duration,
                "seed": config.simulation.seed,
                "max_capacity": config.simulation.max_capacity,
                "merge_strategy": config.simulation.merge_strategy,
                "starter_environments": starters,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Optimize => {
            let mut simulation = config.simulation;
            simulation.environment_run_ticks = 0;

            let mut orchestrator =
                MetaverseOrchestrator::new(simulation, config.agent, Arc::new(VersionBumpProvider))?;
            orchestrator.initialize().await?;
            let links = orchestrator.optimize_connections().await?;

            let environments: Vec<_> = orchestrator
                .snapshots()
                .await?
                .into_iter()
                .map(|e| json!({ "id": e.id, "name": e.name, "connections": e.connections }))
                .collect();
            let summary = json!({
                "links": links,
                "environments": environments,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}
