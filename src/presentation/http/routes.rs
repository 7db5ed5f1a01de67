//! Route Configuration
//!
//! Builds the routers of the two HTTP-serving processes.

use axum::{
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Router,
};

use super::handlers;
use crate::infrastructure::archive_client::GET_RECENT_MESSAGES_PATH;
use crate::infrastructure::metrics;
use crate::presentation::middleware::{create_cors_layer, create_trace_layer, track_http_metrics};
use crate::presentation::websocket::ws_handler;
use crate::startup::{AppState, ArchiverState};

/// Gateway router: WebSocket endpoint, channel API, health and metrics.
pub fn gateway_router(state: AppState) -> Router {
    let cors = create_cors_layer(&state.settings.cors);

    Router::new()
        .route("/ws/{channel}", get(ws_handler))
        .nest("/api", api_routes())
        .route("/health", get(handlers::health::gateway_health))
        .route("/metrics", get(metrics_handler))
        .route_layer(middleware::from_fn(track_http_metrics))
        .layer(create_trace_layer())
        .layer(cors)
        .with_state(state)
}

/// Archiver router: history RPC, health and metrics.
pub fn archiver_router(state: ArchiverState) -> Router {
    Router::new()
        .route(
            GET_RECENT_MESSAGES_PATH,
            post(handlers::archive::get_recent_messages),
        )
        .route("/health", get(handlers::health::archiver_health))
        .route("/metrics", get(metrics_handler))
        .route_layer(middleware::from_fn(track_http_metrics))
        .layer(create_trace_layer())
        .with_state(state)
}

/// Channel routes (authenticated through the `AuthUser` extractor)
fn api_routes() -> Router<AppState> {
    Router::new().route(
        "/channels",
        get(handlers::channel::list_channels).post(handlers::channel::create_channel),
    )
}

/// Prometheus metrics endpoint handler
async fn metrics_handler() -> impl IntoResponse {
    let metrics = metrics::gather_metrics();
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        metrics,
    )
}
