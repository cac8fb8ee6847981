mod cli;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use plantcare::config::PlantcareConfig;

#[derive(Parser)]
#[command(name = "plantcare", version, about = "Plant identification and disease diagnosis from photos")]
struct Cli {
    /// Config file (defaults to ~/.plantcare/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP API
    Serve,
    /// Identify a plant or diagnose a disease from a local image
    Identify {
        #[arg(long, value_enum, default_value = "plant")]
        kind: cli::identify::Kind,
        /// Image path or data: URL
        image: String,
    },
    /// Load plants and diseases from a JSON seed file
    Seed { file: PathBuf },
    /// Show catalog statistics
    Stats,
    /// Check the database, model files and enrichment settings
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => PlantcareConfig::load_from(path)?,
        None => PlantcareConfig::load()?,
    };

    // Log to stderr so `identify` output on stdout stays clean JSON.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => plantcare::server::serve(config).await?,
        Command::Identify { kind, image } => cli::identify::identify(&config, kind, &image).await?,
        Command::Seed { file } => cli::seed::seed(&config, &file)?,
        Command::Stats => cli::stats::stats(&config)?,
        Command::Doctor => cli::doctor::doctor(&config)?,
    }

    Ok(())
}
