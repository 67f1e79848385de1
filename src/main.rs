pub mod types;
pub mod config;
pub mod data;
pub mod processing;
pub mod inflation;
pub mod render;
pub mod views;
pub mod lookup;
pub mod scrape;
pub mod boundaries;
pub mod kommun_info;
pub mod server;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape relation ids and boundary polygons for kommuner and counties
    Boundaries {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Scrape county membership and introductory texts for every kommun
    Info {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Clean the rent workbooks into long-format tables
    Prepare {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Serve the dashboard API
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Boundaries { config } => {
            info!("Scraping boundaries with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;
            boundaries::run(&app_config).await?;
        }
        Commands::Info { config } => {
            info!("Scraping kommun information with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;
            kommun_info::run(&app_config).await?;
        }
        Commands::Prepare { config } => {
            info!("Preparing rent tables with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;
            processing::prepare_all(&app_config)?;
            info!("Preparation complete!");
        }
        Commands::Serve { config } => {
            info!("Serving dashboard with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;
            let assets = data::Assets::load(&app_config)?;
            server::start_server(app_config, assets).await?;
        }
    }

    Ok(())
}
