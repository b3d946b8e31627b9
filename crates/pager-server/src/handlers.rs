//! HTTP handlers for the Pager server.
//!
//! Three endpoints carry the relay: publish, read-latest and the event
//! stream. `/health` reports liveness and the current subscriber count.

use crate::config::Config;
use crate::metrics::{self, StreamMetricsGuard};
use anyhow::Result;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::StreamExt;
use pager_core::{BroadcastHub, PublishError, Relay, Topic, Validator};
use pager_protocol::ApiResponse;
use pager_transport::StreamConnection;
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Validation, storage and broadcast.
    pub relay: Relay,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state from configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let relay = Relay::new(
            Validator::new(config.validation_limits()),
            config.message_store(),
            BroadcastHub::with_config(config.hub_config()),
        );
        Self::with_relay(relay, config)
    }

    /// Create app state around an existing relay.
    #[must_use]
    pub fn with_relay(relay: Relay, config: Config) -> Self {
        Self { relay, config }
    }
}

/// Build the HTTP router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let stream_path = state.config.stream.path.clone();

    Router::new()
        .route("/api/message", get(read_handler).post(publish_handler))
        .route(&stream_path, get(stream_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Run the HTTP server until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone()));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let hub = state.relay.hub().clone();
    let app = build_router(state);

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Pager server listening on {}", addr);
    info!("Event stream endpoint: http://{}{}", addr, config.stream.path);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(hub))
        .await?;

    info!("Pager server stopped");
    Ok(())
}

/// Wait for Ctrl-C, then end every open stream.
async fn shutdown_signal(hub: BroadcastHub) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }

    let closed = hub.close();
    info!(streams = closed, "Shutting down");
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "subscribers": state.relay.hub().subscriber_count(Topic::MessageNew),
    }))
}

/// `POST /api/message`: validate, store and broadcast.
async fn publish_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let start = Instant::now();

    // Unparseable bodies are treated like an absent body.
    let parsed: Option<Value> = serde_json::from_slice(&body).ok();

    match state.relay.publish(parsed.as_ref()).await {
        Ok(published) => {
            metrics::record_published(&published.report, start.elapsed().as_secs_f64());
            if published.report.lagged > 0 {
                warn!(lagged = published.report.lagged, "Subscribers lagging");
            }
            respond(StatusCode::OK, ApiResponse::ok(published.event.message))
        }
        Err(PublishError::Invalid(e)) => {
            metrics::record_rejection(e.kind());
            respond(StatusCode::BAD_REQUEST, ApiResponse::bad_request(e.to_string()))
        }
        Err(e @ PublishError::StoreUnavailable(_)) => {
            metrics::record_store_error("set");
            respond(
                StatusCode::SERVICE_UNAVAILABLE,
                ApiResponse::unavailable(e.to_string()),
            )
        }
    }
}

/// `GET /api/message`: the latest stored message, or empty.
async fn read_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.relay.latest().await {
        Ok(latest) => respond(StatusCode::OK, ApiResponse::ok(latest.unwrap_or_default())),
        Err(e) => {
            error!(error = %e, "Failed to read latest message");
            metrics::record_store_error("get");
            respond(
                StatusCode::SERVICE_UNAVAILABLE,
                ApiResponse::unavailable(format!("Store unavailable: {e}")),
            )
        }
    }
}

/// `GET /api/sse`: a long-lived event stream.
async fn stream_handler(State(state): State<Arc<AppState>>) -> Response {
    let conn = match StreamConnection::open(state.relay.hub(), &state.config.stream_config()) {
        Ok(conn) => conn,
        Err(e) => {
            warn!(error = %e, "Refused event stream");
            return respond(
                StatusCode::SERVICE_UNAVAILABLE,
                ApiResponse::unavailable(e.to_string()),
            );
        }
    };

    debug!(connection = %conn.id(), "Event stream connected");

    // The guard lives as long as the body stream.
    let guard = StreamMetricsGuard::new();
    let frames = conn.map(move |bytes| {
        let _ = &guard;
        Ok::<_, Infallible>(bytes)
    });

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(frames),
    )
        .into_response()
}

fn respond(status: StatusCode, body: ApiResponse) -> Response {
    (status, Json(body)).into_response()
}
