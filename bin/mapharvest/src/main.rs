mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "mapharvest")]
#[command(about = "Resumable map-listing harvester and lead enricher", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the JSON configuration
    #[arg(short, long, global = true, default_value = "config.json")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect listing links for every keyword × location
    Harvest,

    /// Visit harvested links and write contact records
    Enrich,

    /// Harvest, then enrich
    Run,

    /// Show configuration and progress
    Status,

    /// Check that the config loads and a browser is installed
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Harvest => {
            commands::harvest::run(&cli.config).await?;
        }
        Commands::Enrich => {
            commands::enrich::run(&cli.config).await?;
        }
        Commands::Run => {
            commands::run::run(&cli.config).await?;
        }
        Commands::Status => {
            commands::status::run(&cli.config).await?;
        }
        Commands::Doctor => {
            commands::doctor::run(&cli.config).await?;
        }
    }

    Ok(())
}
