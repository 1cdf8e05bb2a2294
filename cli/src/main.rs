//! Memory Bank CLI - inspect and manage the dashboard's local data

use anyhow::Context;
use clap::{Parser, Subcommand};
use memorybank_cli::Workspace;
use memorybank_core::StorageConfig;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "memorybank")]
#[command(about = "Memory Bank - local persistence for the store admin dashboard")]
#[command(version)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory, overrides the configuration
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show backend availability and stored data
    Info,

    /// Store a sample dataset
    Seed,

    /// Export stored data
    Export {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Import an exported document
    Import {
        /// Document to import
        input: PathBuf,
    },

    /// Write a backup with aggregate metadata
    Backup {
        /// Output file (timestamped file in the data dir if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Restore a backup document
    Restore {
        /// Backup to restore
        input: PathBuf,
    },

    /// Delete stored data from every backend
    Clear {
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Report changes made by other processes
    Watch,
}

fn load_config(cli: &Cli) -> anyhow::Result<StorageConfig> {
    let mut config = match &cli.config {
        Some(path) => StorageConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => {
            let data_dir = dirs::data_local_dir()
                .map(|dir| dir.join("memorybank"))
                .unwrap_or_else(|| PathBuf::from("./data"));
            StorageConfig::with_data_dir(data_dir)
        }
    };

    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    debug!("Using data directory {}", config.data_dir.display());
    let workspace = Workspace::open(config);

    match cli.command {
        Commands::Info => workspace.info().await?,
        Commands::Seed => workspace.seed().await?,
        Commands::Export { output } => workspace.export(output.as_deref()).await?,
        Commands::Import { input } => workspace.import(&input).await?,
        Commands::Backup { output } => workspace.backup(output).await?,
        Commands::Restore { input } => workspace.restore(&input).await?,
        Commands::Clear { yes } => workspace.clear(yes).await?,
        Commands::Watch => workspace.watch().await?,
    }

    Ok(())
}
