/**
 * HTTP SURFACES - Exposure server for consumers + ingest endpoint for hosts
 *
 * ROLE :
 * The exposure server publishes the built container documents to the
 * downstream telemetry consumer. The ingest router lets a host push encoded
 * batches over HTTP when the publisher runs as a standalone process.
 *
 * HOW IT WORKS :
 * - Axum routers, JSON responses, 404 for unknown containers
 * - the exposure server binds synchronously (bind errors surface as setup
 *   errors) then serves on the current Tokio runtime, or on its own thread
 *   when called outside of one
 * - reads go through store snapshots taken under the store lock
 * - ingest work runs on the blocking pool since ingestion is synchronous
 *
 * ROUTES :
 * - exposure : /health, /stats, /containers, /containers/{id}
 * - ingest   : POST /publish, /plugin, /health
 */

use crate::config::ConfigMap;
use crate::error::{PublishError, SetupError};
use crate::health::{HealthTracker, PublisherHealth};
use crate::models::Node;
use crate::pipeline::ROOT_CONTAINER;
use crate::plugins::{plugin_info, PluginInfo};
use crate::publisher::Publisher;
use crate::state::EntityStore;
use crate::walker;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header::CONTENT_TYPE, HeaderMap, StatusCode};
use axum::{
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{error, info, warn};

/// Serves container documents to consumers. Started once by the initializer.
pub trait ExposureServer: Send + Sync {
    fn ensure_started(&self, store: Arc<EntityStore>, health: HealthTracker, port: u16) -> Result<(), SetupError>;
}

#[derive(Clone)]
pub struct ExposureState {
    pub store: Arc<EntityStore>,
    pub health: HealthTracker,
}

pub fn build_router(state: ExposureState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/stats", get(get_stats))
        .route("/containers", get(list_containers))
        .route("/containers/{id}", get(get_container))
        .with_state(state)
}

async fn get_stats(State(app): State<ExposureState>) -> Json<PublisherHealth> {
    Json(app.health.get_health(&app.store))
}

async fn list_containers(State(app): State<ExposureState>) -> Result<Json<BTreeMap<String, Node>>, StatusCode> {
    app.store.snapshot().map(Json).map_err(|e| {
        error!(error = %e, "couldn't render container documents");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

async fn get_container(
    State(app): State<ExposureState>,
    Path(id): Path<String>,
) -> Result<Json<Node>, StatusCode> {
    let key = if id == ROOT_CONTAINER {
        walker::ROOT.to_string()
    } else {
        walker::join(walker::ROOT, &id)
    };
    match app.store.document(&key) {
        Ok(Some(doc)) => Ok(Json(doc)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!(error = %e, key = %key, "couldn't render container document");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Axum-backed [`ExposureServer`] on `0.0.0.0:<port>`.
#[derive(Debug, Default)]
pub struct HttpExposure {
    bound: Mutex<Option<SocketAddr>>,
}

impl HttpExposure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.bound.lock()
    }
}

impl ExposureServer for HttpExposure {
    fn ensure_started(&self, store: Arc<EntityStore>, health: HealthTracker, port: u16) -> Result<(), SetupError> {
        let mut bound = self.bound.lock();
        if bound.is_some() {
            return Ok(());
        }
        let server_err = |source| SetupError::Server { port, source };
        let listener = std::net::TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).map_err(server_err)?;
        listener.set_nonblocking(true).map_err(server_err)?;
        let addr = listener.local_addr().map_err(server_err)?;

        spawn_server(listener, build_router(ExposureState { store, health }));
        info!(%addr, "exposure server listening");
        *bound = Some(addr);
        Ok(())
    }
}

fn spawn_server(listener: std::net::TcpListener, app: Router) {
    let serve = async move {
        let listener = match tokio::net::TcpListener::from_std(listener) {
            Ok(listener) => listener,
            Err(e) => {
                error!(error = %e, "couldn't register exposure listener");
                return;
            }
        };
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "exposure server stopped");
        }
    };
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(serve);
        }
        Err(_) => {
            std::thread::spawn(move || {
                match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime.block_on(serve),
                    Err(e) => error!(error = %e, "couldn't build exposure runtime"),
                }
            });
        }
    }
}

/// State of the standalone ingest router. `fatal` fires once setup failed;
/// the binary then stops serving and exits.
#[derive(Clone)]
pub struct IngestState {
    pub publisher: Arc<Publisher>,
    pub options: Arc<ConfigMap>,
    pub fatal: Arc<Notify>,
}

pub fn build_ingest_router(state: IngestState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/plugin", get(get_plugin))
        .route("/publish", post(publish))
        .with_state(state)
}

async fn get_plugin() -> Json<PluginInfo> {
    Json(plugin_info())
}

fn status_for(err: &PublishError) -> StatusCode {
    match err {
        PublishError::UnsupportedContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        PublishError::Decode(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn publish(
    State(app): State<IngestState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<serde_json::Value>) {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let publisher = app.publisher.clone();
    let options = app.options.clone();
    let result = tokio::task::spawn_blocking(move || publisher.publish(&content_type, &body, &options)).await;

    match result {
        Ok(Ok(report)) => (
            StatusCode::OK,
            Json(serde_json::json!({ "ok": true, "report": report })),
        ),
        Ok(Err(e)) => {
            if e.is_fatal() {
                error!(error = %e, "publisher setup failed");
                app.fatal.notify_one();
            } else {
                warn!(error = %e, "batch rejected");
            }
            (
                status_for(&e),
                Json(serde_json::json!({ "ok": false, "error": e.to_string() })),
            )
        }
        Err(e) => {
            error!(error = %e, "publish task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "ok": false, "error": "publish task failed" })),
            )
        }
    }
}
