//! The upstream fetch seam.

use async_trait::async_trait;
use time::OffsetDateTime;
use wanimirror_client::{ApiError, WaniKaniClient};
use wanimirror_core::{Assignment, Review, Subject};

/// The fetch surface the orchestrator depends on.
///
/// The production implementation is [`WaniKaniClient`]; tests plug in
/// a scripted implementation to exercise failure paths without a
/// network.
#[async_trait]
pub trait Upstream: Send + Sync + 'static {
    async fn fetch_subjects(
        &self,
        updated_after: Option<OffsetDateTime>,
    ) -> Result<Vec<Subject>, ApiError>;

    async fn fetch_assignments(
        &self,
        updated_after: Option<OffsetDateTime>,
    ) -> Result<Vec<Assignment>, ApiError>;

    async fn fetch_reviews(
        &self,
        updated_after: Option<OffsetDateTime>,
    ) -> Result<Vec<Review>, ApiError>;

    async fn fetch_statistics(&self) -> Result<serde_json::Value, ApiError>;
}

#[async_trait]
impl Upstream for WaniKaniClient {
    async fn fetch_subjects(
        &self,
        updated_after: Option<OffsetDateTime>,
    ) -> Result<Vec<Subject>, ApiError> {
        WaniKaniClient::fetch_subjects(self, updated_after).await
    }

    async fn fetch_assignments(
        &self,
        updated_after: Option<OffsetDateTime>,
    ) -> Result<Vec<Assignment>, ApiError> {
        WaniKaniClient::fetch_assignments(self, updated_after).await
    }

    async fn fetch_reviews(
        &self,
        updated_after: Option<OffsetDateTime>,
    ) -> Result<Vec<Review>, ApiError> {
        WaniKaniClient::fetch_reviews(self, updated_after).await
    }

    async fn fetch_statistics(&self) -> Result<serde_json::Value, ApiError> {
        WaniKaniClient::fetch_statistics(self).await
    }
}
