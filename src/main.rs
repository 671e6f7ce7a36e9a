use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ganabosques_api::auth::AccessGuard;
use ganabosques_api::config;
use ganabosques_api::database::{DocumentStore, MongoStore};
use ganabosques_api::{app, AppState};

#[derive(Parser)]
#[command(name = "ganabosques-api")]
#[command(about = "Ganabosques risk and traceability API")]
#[command(version)]
struct Cli {
    #[arg(long, env = "HOST", help = "Address to bind")]
    host: Option<String>,

    #[arg(long, env = "PORT", help = "Port to listen on")]
    port: Option<u16>,

    #[arg(long, help = "Load variables from this file instead of ./.env")]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path).with_context(|| format!("failed to load {}", path.display()))?;
        }
        None => {
            let _ = dotenvy::dotenv();
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = config::config().clone();
    if let Some(host) = cli.host {
        config.api.host = host;
    }
    if let Some(port) = cli.port {
        config.api.port = port;
    }
    info!("Starting Ganabosques API in {:?} mode", config.environment);

    let store: Arc<dyn DocumentStore> = Arc::new(MongoStore::connect(&config.database).await?);
    let guard = AccessGuard::new(&config.auth)?;

    let bind_addr = format!("{}:{}", config.api.host, config.api.port);
    let state = AppState::new(store.clone(), config, guard);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    info!("listening on http://{}", bind_addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.shutdown().await;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}
