//! HTTP JSON API server for the data mirror.
//!
//! Exposes the local store and the sync trigger as an async HTTP
//! service using `axum` + `tokio`. Requests are handled concurrently.
//!
//! Security:
//! - Optional bearer authentication via `LOCAL_API_TOKEN`; `/health`
//!   and CORS preflight are exempt
//! - CORS headers on all responses (permissive, for the local
//!   front-end)
//!
//! Endpoints:
//! - GET  /health                      - liveness (exempt from auth)
//! - GET  /api/subjects                - subjects, filter by type/level
//! - GET  /api/assignments             - assignments joined with subjects
//! - GET  /api/assignments/snapshots   - daily distribution, nested by stage
//! - GET  /api/reviews                 - reviews with assignment & subject
//! - GET  /api/statistics              - statistics captures, newest first
//! - GET  /api/statistics/latest       - newest capture or 404
//! - POST /api/sync                    - trigger a full sync (409 if running)
//! - GET  /api/sync/status             - single-flight flag
//!
//! All responses use Content-Type: application/json; failures use the
//! `{"error": {...}}` envelope.

mod error;
mod handlers;
mod middleware;
mod params;
mod state;

pub use state::AppState;

use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Router};
use tower_http::cors::{Any, CorsLayer};
use wanimirror_storage::MirrorStore;
use wanimirror_sync::Upstream;

/// How long graceful shutdown waits for in-flight requests before the
/// listener is force-closed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Assemble the router. Exposed separately from [`start_server`] so
/// tests can mount it on an ephemeral listener.
pub fn router<S: MirrorStore, U: Upstream>(state: Arc<AppState<S, U>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::handle_health))
        .route("/api/subjects", get(handlers::handle_subjects::<S, U>))
        .route(
            "/api/assignments",
            get(handlers::handle_assignments::<S, U>),
        )
        .route(
            "/api/assignments/snapshots",
            get(handlers::handle_assignment_snapshots::<S, U>),
        )
        .route("/api/reviews", get(handlers::handle_reviews::<S, U>))
        .route("/api/statistics", get(handlers::handle_statistics::<S, U>))
        .route(
            "/api/statistics/latest",
            get(handlers::handle_latest_statistics::<S, U>),
        )
        .route("/api/sync", post(handlers::handle_sync::<S, U>))
        .route(
            "/api/sync/status",
            get(handlers::handle_sync_status::<S, U>),
        )
        .fallback(handlers::handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware::<S, U>,
        ))
        .layer(cors)
        .with_state(state)
}

/// Serve the API until Ctrl-C, then drain in-flight requests for up to
/// [`SHUTDOWN_GRACE`] before force-closing the listener.
pub async fn start_server<S: MirrorStore, U: Upstream>(
    state: Arc<AppState<S, U>>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tracing::info!(port, "read API listening");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    tracing::info!("shutdown signal received, draining in-flight requests");
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
        Ok(joined) => joined??,
        Err(_) => {
            tracing::warn!(
                grace_secs = SHUTDOWN_GRACE.as_secs(),
                "drain timed out, forcing close"
            );
            server.abort();
        }
    }
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %error, "failed to install Ctrl+C handler");
    }
}
