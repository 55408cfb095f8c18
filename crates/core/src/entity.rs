use std::fmt;

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

/// The three classes of learning item the upstream service teaches.
///
/// The lowercase string form (`radical` / `kanji` / `vocabulary`) is
/// the canonical representation everywhere: upstream JSON, SQL columns,
/// query parameters, and API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    Radical,
    Kanji,
    Vocabulary,
}

impl SubjectKind {
    pub const ALL: [SubjectKind; 3] = [
        SubjectKind::Radical,
        SubjectKind::Kanji,
        SubjectKind::Vocabulary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectKind::Radical => "radical",
            SubjectKind::Kanji => "kanji",
            SubjectKind::Vocabulary => "vocabulary",
        }
    }

    /// Parse the canonical lowercase form. Returns `None` for anything else.
    pub fn parse(s: &str) -> Option<SubjectKind> {
        match s {
            "radical" => Some(SubjectKind::Radical),
            "kanji" => Some(SubjectKind::Kanji),
            "vocabulary" => Some(SubjectKind::Vocabulary),
            _ => None,
        }
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One meaning attached to a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meaning {
    pub meaning: String,
    #[serde(default)]
    pub primary: bool,
}

/// One reading attached to a subject (absent for radicals).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    pub reading: String,
    #[serde(default)]
    pub primary: bool,
}

/// The nested payload of a subject: level placement plus the study
/// content itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectData {
    /// Level placement, 1..=60.
    pub level: i64,
    /// The characters being studied. Absent for image-only radicals.
    #[serde(default)]
    pub characters: Option<String>,
    #[serde(default)]
    pub meanings: Vec<Meaning>,
    #[serde(default)]
    pub readings: Vec<Reading>,
}

/// An atomic learning item. Created and updated only by the sync
/// pipeline; never deleted.
///
/// `id` is the upstream-assigned identity, stable and globally unique
/// across all three kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: i64,
    #[serde(rename = "object")]
    pub kind: SubjectKind,
    pub url: String,
    /// Upstream-side modification time, truncated to whole seconds.
    #[serde(with = "time::serde::rfc3339")]
    pub data_updated_at: OffsetDateTime,
    pub data: SubjectData,
}

/// A learner's state-bearing link to a subject.
///
/// `subject_id` must reference an existing [`Subject`] row at commit
/// time; `subject_type` is denormalized from that subject's kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: i64,
    pub subject_id: i64,
    pub subject_type: SubjectKind,
    /// SRS progress tier, 0..=9. 0 is unstarted, 9 is retired.
    pub srs_stage: i64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub unlocked_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub passed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub data_updated_at: OffsetDateTime,
}

/// A single answer event. Both foreign keys must resolve at commit time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    pub assignment_id: i64,
    pub subject_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub incorrect_meaning_answers: i64,
    pub incorrect_reading_answers: i64,
}

/// A point-in-time capture of the upstream summary report.
///
/// Append-only: rows are never updated or deleted, so the full time
/// series is preserved. `id` is store-assigned and insertion-ordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub captured_at: OffsetDateTime,
    /// The opaque report payload, stored verbatim.
    pub data: serde_json::Value,
}

/// One row of the derived daily distribution: how many assignments sat
/// at (`srs_stage`, `subject_type`) on `date`.
///
/// Composite identity (date, srs_stage, subject_type). Stage 0 rows are
/// excluded by construction; (stage, type) pairs with zero assignments
/// are simply absent.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AssignmentSnapshot {
    pub date: Date,
    pub srs_stage: i64,
    pub subject_type: SubjectKind,
    pub count: i64,
}
