pub mod types;
pub mod error;
pub mod config;
pub mod cache;
pub mod ledger;
pub mod info;
pub mod map;
pub mod controller;
pub mod source;
pub mod binding;
pub mod runtime;
pub mod data;
pub mod processing;
pub mod export;
pub mod server;

use clap::{Parser, Subcommand};
use source::ZoneSource;
use std::path::PathBuf;
use std::sync::Arc;
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
    /// Generate the zone API from geometry and attribute tables
    Generate {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Serve the generated API and the point lookup endpoint
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Explore zones interactively in the terminal
    Explore {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// Base URL of the zone API, overriding the configured one
        #[arg(long, value_name = "URL")]
        api: Option<String>,
    },
    /// Print one zone by postal code
    Lookup {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        code: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Generate { config } => {
            info!(config = ?config, "generating zone API");
            let app_config = config::AppConfig::load_from_file(config)?;

            let inputs = data::load_data(&app_config)?;
            let zones = processing::build_zones(inputs);
            export::write_api(&app_config.output.api_dir, &zones)?;

            info!("generation complete");
        }
        Commands::Serve { config } => {
            info!(config = ?config, "serving zone API");
            let app_config = config::AppConfig::load_from_file(config)?;

            let zones = processing::build_shapes(data::load_data(&app_config)?);

            server::start_server(app_config, zones).await?;
        }
        Commands::Explore { config, api } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            let timeout = app_config.explorer.request_timeout();
            let api_url = api.clone().unwrap_or(app_config.explorer.api_url);
            info!(api = %api_url, "starting explorer");

            let source = Arc::new(source::HttpZoneSource::new(api_url, timeout)?);
            let terminal = binding::TerminalBinding::new(std::io::stdout(), app_config.style);
            let mut explorer = runtime::Explorer::new(app_config.map, timeout, source.clone(), terminal);
            explorer.load_catalog(source.as_ref()).await;

            let sender = explorer.sender();
            std::thread::spawn(move || runtime::read_commands(std::io::stdin().lock(), sender));

            explorer.run().await?;
        }
        Commands::Lookup { config, code } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            let timeout = app_config.explorer.request_timeout();
            let source = source::HttpZoneSource::new(app_config.explorer.api_url, timeout)?;
            let zone = source.fetch_zone(code).await?;

            println!("postal code: {}", zone.postal_code);
            println!("place:       {}", zone.place);
            println!("state:       {}", zone.state);
            println!("population:  {}", types::format_population(zone.population));
            println!("manager:     {}", zone.manager.as_deref().unwrap_or(""));
            println!("neighbours:  {}", zone.neighbours.iter().map(|n| n.as_str()).collect::<Vec<_>>().join(" "));
        }
    }

    Ok(())
}
