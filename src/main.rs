// Allow dead code for items exercised only through the library crate
#![allow(dead_code)]

use std::env;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

mod config;
mod db;
mod entity;
mod error;
mod handlers;
mod middleware;
mod policy;
mod promotion;
mod routes;
mod state;

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|arg| arg == "-help" || arg == "--help") {
        println!("Usage: rollbook [OPTIONS]");
        println!("Options:");
        println!("  -config <path>  Path to configuration file (default: ./etc/rollbook.toml)");
        println!("  -help, --help   Print this help message");
        return Ok(());
    }

    let config_path = args
        .iter()
        .skip_while(|arg| arg.as_str() != "-config")
        .nth(1)
        .map(|s| s.to_string())
        .unwrap_or_else(|| "./etc/rollbook.toml".to_string());

    // Load configuration first (before logging init)
    let config = Config::load(&config_path).unwrap_or_else(|e| {
        eprintln!("Could not load config file: {}, using defaults", e);
        Config::default()
    });

    // Initialize logging
    // Priority: RUST_LOG env var > config file > default "info"
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.level));

    fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();

    info!("Starting Rollbook server...");
    info!("Loading configuration from: {}", config_path);

    let db = db::init_database(&config.database).await.map_err(|e| {
        tracing::error!("Database initialization failed: {}", e);
        anyhow::anyhow!("Database initialization failed: {}", e)
    })?;

    db::ensure_admin(&db, &config.admin).await?;

    // Create application state and router
    let state = AppState::new(db, config.clone());
    let app = routes::create_router(state);

    let addr: SocketAddr = config.addr.parse().unwrap_or_else(|_| {
        tracing::warn!("Invalid address '{}', using default 0.0.0.0:8080", config.addr);
        "0.0.0.0:8080".parse().unwrap()
    });

    info!("Server listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
