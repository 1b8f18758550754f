//! account-gateway: a local reverse proxy that multiplexes a pool of
//! OAuth-authenticated and static-relay accounts behind the Responses,
//! Chat-Completions and Completions wire dialects (spec.md overview).

mod accounts;
mod app_state;
mod config;
mod dispatch;
mod error;
mod handlers;
mod metrics;
mod oauth_boundary;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::Router;
use pool::{Refresher, Selector, Store};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app_state::AppState;
use crate::config::Config;
use crate::dispatch::DispatchState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting account-gateway");
    metrics::install_recorder();

    let args: Vec<String> = std::env::args().collect();
    let config_path = Config::resolve_path(&args);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.proxy.listen_addr,
        upstream_base_url = %config.proxy.upstream_base_url,
        store_dir = %config.store.dir.display(),
        "configuration loaded"
    );

    let store = Arc::new(
        Store::open(&config.store.dir)
            .await
            .with_context(|| format!("failed to open account store at {}", config.store.dir.display()))?,
    );
    let selector = Arc::new(Selector::new(store.clone()));

    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.proxy.request_timeout_secs))
        .build()
        .context("failed to build upstream HTTP client")?;

    let refresher = Arc::new(Refresher::new(store.clone(), config.oauth.clone(), http.clone()));

    let shutdown = CancellationToken::new();
    let sweep_handle = pool::spawn_sweep(refresher.clone(), store.clone(), shutdown.clone());

    let dispatch_state = Arc::new(DispatchState {
        store: store.clone(),
        selector: selector.clone(),
        refresher: refresher.clone(),
        http: http.clone(),
        upstream_base_url: config.proxy.upstream_base_url.clone(),
    });

    let app_state = AppState {
        dispatch: dispatch_state,
        store,
        selector,
        refresher,
        oauth_config: config.oauth.clone(),
        http,
        pending_auth: Arc::new(Mutex::new(HashMap::new())),
        started_at: Instant::now(),
    };

    let app = Router::new()
        .merge(handlers::router())
        .merge(accounts::router())
        .merge(oauth_boundary::router())
        .with_state(app_state);

    let listener = TcpListener::bind(config.proxy.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.proxy.listen_addr))?;

    info!(addr = %config.proxy.listen_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("server error")?;

    let _ = sweep_handle.await;
    info!("shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or SIGINT, then cancel the sweep task's token so it
/// stops scheduling further refresh sweeps before the process exits.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
    shutdown.cancel();
}
