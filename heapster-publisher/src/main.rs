/**
 * HEAPSTER PUBLISHER - Standalone host for the publisher
 *
 * ROLE : Accepts encoded measurement batches over HTTP and hands them to the
 * publisher, which serves the resulting container documents on its own port.
 *
 * BOOT : .env, tracing, publisher.yaml, optional eager setup, ingest router.
 * A failed setup stops the process.
 */

use anyhow::{Context, Result};
use heapster_publisher::config::load_config;
use heapster_publisher::http::{build_ingest_router, IngestState};
use heapster_publisher::Publisher;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = load_config().await;
    let publisher = Arc::new(Publisher::with_http_exposure());

    if cfg.eager_start {
        if let Err(e) = publisher.start(&cfg.options) {
            error!(error = %e, "couldn't start publisher");
            std::process::exit(1);
        }
    }

    let fatal = Arc::new(Notify::new());
    let app = build_ingest_router(IngestState {
        publisher,
        options: Arc::new(cfg.options),
        fatal: fatal.clone(),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.ingest_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("couldn't bind ingest port {}", cfg.ingest_port))?;
    info!(%addr, "ingest endpoint listening");

    let shutdown = fatal.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.notified().await })
        .await
        .context("ingest server failed")?;

    // graceful shutdown only happens after a fatal setup error
    error!("publisher setup failed, exiting");
    std::process::exit(1);
}
