//! # HTTP Server
//!
//! HTTP server for the manual trigger, metrics, and health checks.
//!
//! Provides endpoints:
//! - `POST /api/initialize` - Run an invocation now, optionally against `{"vaultIp": "..."}`
//! - `/metrics` - Prometheus metrics in text format
//! - `/healthz` - Liveness probe (always returns 200)
//! - `/readyz` - Readiness probe (returns 200 once startup has completed)
//!
//! The server runs on port 8080 by default (configurable via `HTTP_PORT`).

use crate::controller::invocation::{Initializer, InvocationError, InvocationOutcome, TriggerSource};
use crate::observability::metrics;
use crate::provider::StoreConnector;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub struct ServerState<C> {
    pub initializer: Arc<Initializer<C>>,
    /// Set once the listener is bound
    pub is_listening: AtomicBool,
    /// Set once the startup invocation has finished
    pub is_ready: AtomicBool,
    /// Process shutdown; cancels invocations started over HTTP
    pub shutdown: CancellationToken,
}

impl<C> ServerState<C> {
    #[must_use]
    pub fn new(initializer: Arc<Initializer<C>>, shutdown: CancellationToken) -> Self {
        Self {
            initializer,
            is_listening: AtomicBool::new(false),
            is_ready: AtomicBool::new(false),
            shutdown,
        }
    }
}

impl<C> std::fmt::Debug for ServerState<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("is_listening", &self.is_listening.load(Ordering::Relaxed))
            .field("is_ready", &self.is_ready.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeRequest {
    #[serde(default, alias = "vaultAddr")]
    vault_ip: Option<String>,
}

pub fn build_router<C>(state: Arc<ServerState<C>>) -> Router
where
    C: StoreConnector + 'static,
{
    Router::new()
        .route("/api/initialize", post(initialize_handler::<C>))
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler::<C>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` is cancelled
///
/// # Errors
/// Returns an error if the port cannot be bound or the server fails.
pub async fn start_server<C>(
    port: u16,
    state: Arc<ServerState<C>>,
    shutdown: CancellationToken,
) -> Result<(), anyhow::Error>
where
    C: StoreConnector + 'static,
{
    let app = build_router(Arc::clone(&state));

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;

    info!("HTTP server listening on {}", addr);
    state.is_listening.store(true, Ordering::Relaxed);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

async fn initialize_handler<C>(State(state): State<Arc<ServerState<C>>>, body: Bytes) -> Response
where
    C: StoreConnector + 'static,
{
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        InitializeRequest::default()
    } else {
        match serde_json::from_slice::<InitializeRequest>(&body) {
            Ok(request) => request,
            Err(e) => {
                warn!("Rejected initialize request with invalid body: {}", e);
                return error_response(
                    StatusCode::BAD_REQUEST,
                    &format!("Invalid request body: {e}"),
                );
            }
        }
    };

    let address_override = request
        .vault_ip
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty());

    if address_override.is_none() && !state.initializer.config().endpoint.has_address() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Please provide 'vaultIp' in the request body.",
        );
    }

    match state
        .initializer
        .run(TriggerSource::Http, address_override, &state.shutdown)
        .await
    {
        Ok(report) => {
            let status = match &report.outcome {
                InvocationOutcome::AlreadyPresent | InvocationOutcome::Created { .. } => {
                    StatusCode::OK
                }
                InvocationOutcome::Failed { timed_out: true, .. } => StatusCode::GATEWAY_TIMEOUT,
                InvocationOutcome::Failed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(report)).into_response()
        }
        Err(e @ InvocationError::Busy) => error_response(StatusCode::CONFLICT, &e.to_string()),
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = metrics::gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        buffer,
    )
}

async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn readyz_handler<C>(State(state): State<Arc<ServerState<C>>>) -> impl IntoResponse
where
    C: StoreConnector + 'static,
{
    if state.is_ready.load(Ordering::Relaxed) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
