//! Wire shapes of the upstream REST API.
//!
//! Collection endpoints wrap each record in a resource envelope with
//! the identity and modification time at the top level and the typed
//! payload under `data`. These structs mirror that shape; conversion
//! into the flat domain types truncates every timestamp to whole
//! seconds.

use serde::Deserialize;
use time::OffsetDateTime;
use wanimirror_core::{timestamp, Assignment, Review, SubjectKind};

/// One page of a collection endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct Collection<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub pages: Option<Pages>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Pages {
    #[serde(default)]
    pub next_url: Option<String>,
}

/// The `/summary` envelope. Only the inner report is retained.
#[derive(Debug, Deserialize)]
pub(crate) struct Report {
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AssignmentResource {
    pub id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub data_updated_at: OffsetDateTime,
    pub data: AssignmentData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AssignmentData {
    pub subject_id: i64,
    pub subject_type: SubjectKind,
    pub srs_stage: i64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub unlocked_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub passed_at: Option<OffsetDateTime>,
}

impl From<AssignmentResource> for Assignment {
    fn from(resource: AssignmentResource) -> Self {
        Assignment {
            id: resource.id,
            subject_id: resource.data.subject_id,
            subject_type: resource.data.subject_type,
            srs_stage: resource.data.srs_stage,
            unlocked_at: resource.data.unlocked_at.map(timestamp::truncate_to_second),
            started_at: resource.data.started_at.map(timestamp::truncate_to_second),
            passed_at: resource.data.passed_at.map(timestamp::truncate_to_second),
            data_updated_at: timestamp::truncate_to_second(resource.data_updated_at),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReviewResource {
    pub id: i64,
    pub data: ReviewData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReviewData {
    pub assignment_id: i64,
    pub subject_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub incorrect_meaning_answers: i64,
    pub incorrect_reading_answers: i64,
}

impl From<ReviewResource> for Review {
    fn from(resource: ReviewResource) -> Self {
        Review {
            id: resource.id,
            assignment_id: resource.data.assignment_id,
            subject_id: resource.data.subject_id,
            created_at: timestamp::truncate_to_second(resource.data.created_at),
            incorrect_meaning_answers: resource.data.incorrect_meaning_answers,
            incorrect_reading_answers: resource.data.incorrect_reading_answers,
        }
    }
}
