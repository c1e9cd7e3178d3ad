//! # grc-api: Binary Entry Point
//!
//! Reads configuration, installs tracing and the Prometheus recorder,
//! connects and hydrates from Postgres when configured, and serves the
//! Axum application until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

use grc_api::config::{AppConfig, LogFormat};
use grc_api::db;
use grc_api::db::persist::PgSink;
use grc_api::state::AppState;
use grc_workflow::{InMemoryDirectory, InMemoryRegistry, Ledger};

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::parse();
    init_tracing(config.log_format);
    tracing::info!(?config, "starting grc-api");

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("installing Prometheus recorder")?;

    let ledger = Arc::new(Ledger::new());
    let registry = Arc::new(InMemoryRegistry::new());
    let users = Arc::new(InMemoryDirectory::new());

    let pool = db::init_pool(config.database_url.as_deref())
        .await
        .context("initializing database")?;

    let port = config.port;
    let mut builder = AppState::builder(config).metrics(metrics);
    let mut writer = None;
    if let Some(pool) = pool {
        db::reference::load(&pool, &registry, &users)
            .await
            .context("loading policy hierarchy and users")?;
        db::persist::hydrate(&pool, &ledger)
            .await
            .context("hydrating ledger")?;
        let (sink, handle) = PgSink::spawn(pool.clone());
        writer = Some(handle);
        builder = builder.sink(Arc::new(sink)).db_pool(pool);
    }
    let state = builder
        .ledger(ledger)
        .registry(registry)
        .users(users)
        .build();

    let app = grc_api::app(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "grc-api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            tracing::info!("shutdown signal received");
        })
        .await
        .context("serving HTTP")?;

    // The router owned the last sink handle; the writer drains and stops.
    if let Some(handle) = writer {
        if tokio::time::timeout(std::time::Duration::from_secs(10), handle)
            .await
            .is_err()
        {
            tracing::warn!("persistence writer did not drain within 10s");
        }
    }
    Ok(())
}
