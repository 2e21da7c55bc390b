//! Dewdrop Service - outdoor dew point cache and alerting API.
//!
//! Run with: `cargo run -p dewdrop-service`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use clap::Parser;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use dewdrop_service::weather::{self, NwsClient};
use dewdrop_service::{AppState, Config, WebhookNotifier, api};
use dewdrop_store::Store;

/// Dewdrop Service - outdoor dew point cache and alerting API.
#[derive(Parser, Debug)]
#[command(name = "dewdrop-service")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long)]
    bind: Option<String>,

    /// Database path (overrides config).
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Disable the scheduled outdoor refresh (requests still refresh lazily).
    #[arg(long)]
    no_refresher: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dewdrop_service=info".parse()?)
                .add_directive("dewdrop_core=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(db_path) = args.database {
        config.storage.path = db_path;
    }
    config.validate()?;

    let grid = match (config.weather.grid(), config.weather.coordinates()) {
        (Some(grid), _) => grid,
        (None, Some((lat, lon))) => {
            weather::resolve_grid(&config.weather.base_url, &config.weather.user_agent, lat, lon)
                .await
                .context("failed to resolve weather grid")?
        }
        (None, None) => anyhow::bail!("no weather location configured"),
    };
    info!("Outdoor dew point from grid {}", grid);

    let weather = NwsClient::with_base_url(&config.weather.base_url, &grid, &config.weather.user_agent)?;
    let notifier = WebhookNotifier::new(&config.webhooks)?;

    let store = Store::open(&config.storage.path)?;
    let addr: SocketAddr = config.server.bind.parse()?;
    let state = AppState::new(store, config, Arc::new(weather), Arc::new(notifier));

    let refresher = if args.no_refresher {
        info!("Scheduled outdoor refresh disabled");
        None
    } else {
        Some(state.outdoor.spawn_refresher(state.cancel.clone()))
    };

    let shutdown = state.cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        info!("Shutdown requested");
        shutdown.cancel();
    });

    let app = Router::new()
        .merge(api::router())
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(Arc::clone(&state));

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let cancel = state.cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    state.cancel.cancel();
    if let Some(refresher) = refresher
        && let Err(e) = refresher.await
    {
        warn!("Outdoor refresher ended abnormally: {}", e);
    }
    info!("Server stopped");

    Ok(())
}
