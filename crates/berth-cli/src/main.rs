use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

mod commands;
mod config;

use config::BerthConfig;

#[derive(Parser)]
#[command(
    name = "berth",
    about = "Berth — inspect the application registry of a container cluster",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Path to berth.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding berth.redb (overrides the config file)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,
    /// Output format: text or json
    #[arg(short, long, global = true, default_value = "text")]
    format: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize the persisted registry
    Show,
    /// List applications
    Apps,
    /// List the containers of one application
    Containers {
        /// Application name
        application: String,
    },
    /// List known hosts and their liveness
    Hosts {
        /// Seconds without a heartbeat before a host counts as dead
        #[arg(long, default_value_t = 30)]
        dead_timeout: u64,
    },
    /// Print the cluster id
    ClusterId,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("berth=info".parse()?)
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => BerthConfig::from_file(path)?,
        None => BerthConfig::default(),
    };
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    tracing::debug!(
        data_dir = %config.data_dir.display(),
        host_id = %config.registry.host_id,
        "configuration loaded"
    );
    let store = config.open_store()?;

    match cli.command {
        Commands::Show => commands::registry::show(&store, &cli.format),
        Commands::Apps => commands::registry::apps(&store, &cli.format),
        Commands::Containers { application } => {
            commands::registry::containers(&store, &application, &cli.format)
        }
        Commands::Hosts { dead_timeout } => {
            commands::hosts::hosts(&store, Duration::from_secs(dead_timeout), &cli.format)
        }
        Commands::ClusterId => commands::registry::cluster_id(&store),
    }
}
