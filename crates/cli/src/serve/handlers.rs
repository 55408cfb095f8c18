//! Core HTTP route handlers.
//!
//! Handlers validate parameters, delegate to the store or the query
//! service, and shape JSON. No sync or storage logic lives here.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use wanimirror_core::{srs, timestamp, AssignmentFilter, DateRange, SubjectFilter, TimeRange};
use wanimirror_storage::MirrorStore;
use wanimirror_sync::Upstream;

use super::error::ApiFailure;
use super::params::Validator;
use super::state::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct SubjectsQuery {
    #[serde(rename = "type")]
    kind: Option<String>,
    level: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AssignmentsQuery {
    srs_stage: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RangeQuery {
    from: Option<String>,
    to: Option<String>,
}

impl RangeQuery {
    /// Validate both bounds as ordered `YYYY-MM-DD` dates.
    fn dates(
        &self,
        validator: &mut Validator,
    ) -> (Option<time::Date>, Option<time::Date>) {
        let from = validator.date("from", self.from.as_deref());
        let to = validator.date("to", self.to.as_deref());
        validator.ordered(from, to);
        (from, to)
    }
}

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> ApiFailure {
    ApiFailure::not_found("not found")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// GET /api/subjects
pub(crate) async fn handle_subjects<S: MirrorStore, U: Upstream>(
    State(state): State<Arc<AppState<S, U>>>,
    Query(query): Query<SubjectsQuery>,
) -> Result<impl IntoResponse, ApiFailure> {
    let mut validator = Validator::new();
    let kind = validator.subject_kind("type", query.kind.as_deref());
    let level = validator.int_in_range("level", query.level.as_deref(), 1, 60);
    validator.finish()?;

    let subjects = state
        .store
        .get_subjects(&SubjectFilter { kind, level })
        .await?;
    Ok(Json(subjects))
}

/// GET /api/assignments
pub(crate) async fn handle_assignments<S: MirrorStore, U: Upstream>(
    State(state): State<Arc<AppState<S, U>>>,
    Query(query): Query<AssignmentsQuery>,
) -> Result<impl IntoResponse, ApiFailure> {
    let mut validator = Validator::new();
    let srs_stage = validator.int_in_range(
        "srs_stage",
        query.srs_stage.as_deref(),
        srs::UNSTARTED,
        srs::BURNED,
    );
    validator.finish()?;

    let views = state
        .query
        .assignments_with_subjects(&AssignmentFilter { srs_stage })
        .await?;
    Ok(Json(views))
}

/// GET /api/assignments/snapshots
pub(crate) async fn handle_assignment_snapshots<S: MirrorStore, U: Upstream>(
    State(state): State<Arc<AppState<S, U>>>,
    Query(query): Query<RangeQuery>,
) -> Result<impl IntoResponse, ApiFailure> {
    let mut validator = Validator::new();
    let (from, to) = query.dates(&mut validator);
    validator.finish()?;

    let projection = state
        .query
        .snapshot_projection(&DateRange { from, to })
        .await?;
    Ok(Json(projection))
}

/// GET /api/reviews
pub(crate) async fn handle_reviews<S: MirrorStore, U: Upstream>(
    State(state): State<Arc<AppState<S, U>>>,
    Query(query): Query<RangeQuery>,
) -> Result<impl IntoResponse, ApiFailure> {
    let mut validator = Validator::new();
    let (from, to) = query.dates(&mut validator);
    validator.finish()?;

    let range = TimeRange {
        from: from.map(timestamp::day_start),
        to: to.map(timestamp::day_end),
    };
    let views = state.query.reviews_with_context(&range).await?;
    Ok(Json(views))
}

/// GET /api/statistics
pub(crate) async fn handle_statistics<S: MirrorStore, U: Upstream>(
    State(state): State<Arc<AppState<S, U>>>,
    Query(query): Query<RangeQuery>,
) -> Result<impl IntoResponse, ApiFailure> {
    let mut validator = Validator::new();
    let (from, to) = query.dates(&mut validator);
    validator.finish()?;

    let range = TimeRange {
        from: from.map(timestamp::day_start),
        to: to.map(timestamp::day_end),
    };
    let snapshots = state.store.get_statistics(&range).await?;
    Ok(Json(snapshots))
}

/// GET /api/statistics/latest
pub(crate) async fn handle_latest_statistics<S: MirrorStore, U: Upstream>(
    State(state): State<Arc<AppState<S, U>>>,
) -> Result<impl IntoResponse, ApiFailure> {
    match state.store.get_latest_statistics().await? {
        Some(snapshot) => Ok(Json(snapshot)),
        None => Err(ApiFailure::not_found("no statistics captured yet")),
    }
}

/// POST /api/sync
pub(crate) async fn handle_sync<S: MirrorStore, U: Upstream>(
    State(state): State<Arc<AppState<S, U>>>,
) -> Result<impl IntoResponse, ApiFailure> {
    let run = state
        .sync
        .sync_all()
        .await
        .map_err(|error| ApiFailure::from_sync_error(&error))?;

    match run.error {
        Some(error) => Err(ApiFailure::from_sync_error(&error)),
        None => Ok(Json(serde_json::json!({
            "message": "sync completed",
            "results": run.results,
        }))),
    }
}

/// GET /api/sync/status
pub(crate) async fn handle_sync_status<S: MirrorStore, U: Upstream>(
    State(state): State<Arc<AppState<S, U>>>,
) -> impl IntoResponse {
    Json(serde_json::json!({"syncing": state.sync.is_syncing()}))
}
