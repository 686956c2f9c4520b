//! Nankan racing API
//!
//! CLI and SSE API that collect race data from the Nankan sites, build a
//! prediction prompt, query a Dify workflow and annotate the head-to-head
//! table with the returned grades.

mod cli;
mod config;
mod dify;
mod matchup;
mod normalize;
mod prompt;
mod resources;
mod retry;
mod routes;
mod runner;
mod scraper;
mod types;

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::resources::Resources;
use crate::routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so run output on stdout stays copy-pasteable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nankan_api=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Serve { host, port } => run_server(host, port).await,
        Commands::Run {
            date,
            place,
            races,
            all,
            mode,
            save,
        } => cli::run_races(date, place, races, all, mode, save).await,
        Commands::Meeting { date, place } => cli::run_meeting(date, place).await,
        Commands::ClearCache => cli::run_clear_cache(),
    }
}

/// Run the API server.
async fn run_server(host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let mut config = AppConfig::load()?;

    // Override with CLI args
    if let Some(h) = host {
        config.server.host = h;
    }
    if let Some(p) = port {
        config.server.port = p;
    }

    tracing::info!("Configuration loaded");
    if config.dify.api_key.is_empty() {
        tracing::warn!("Dify API key is not set; only raw mode will succeed");
    }

    let resources = Resources::global(&config.resources);

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    let state = Arc::new(AppState { config, resources });
    let app = routes::router(state);

    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
