//! HTTP middleware: bearer-token authentication.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{Method, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use wanimirror_storage::MirrorStore;
use wanimirror_sync::Upstream;

use super::error::ApiFailure;
use super::state::AppState;

/// Bearer authentication.
///
/// When a local API token is configured, every request must carry
/// `Authorization: Bearer <token>` — a missing, malformed, or
/// mismatched header is rejected with 401. Two exemptions:
/// `/health` (load-balancer probes) and CORS preflight (`OPTIONS`
/// never carries credentials).
pub(crate) async fn auth_middleware<S: MirrorStore, U: Upstream>(
    State(state): State<Arc<AppState<S, U>>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(expected) = state.local_api_token.as_deref() else {
        return next.run(request).await;
    };

    if request.uri().path() == "/health" || request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    let bearer = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match bearer {
        Some(token) if token == expected => next.run(request).await,
        Some(_) => ApiFailure::unauthorized("invalid API token").into_response(),
        None => ApiFailure::unauthorized("authentication required").into_response(),
    }
}
