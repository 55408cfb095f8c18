//! Conformance test suite for `MirrorStore` implementations.
//!
//! A backend-agnostic suite any `MirrorStore` implementation can run to
//! verify the storage contract. The suite covers:
//!
//! - **Upserts**: idempotence by primary key, last-write-wins refresh,
//!   round-trip integrity at second precision
//! - **Foreign keys**: dangling references rejected atomically, aborted
//!   transactions leave no trace
//! - **Filters**: soundness and completeness against the in-model
//!   predicates, inclusive range bounds
//! - **Daily snapshots**: stage-zero exclusion, grouping, same-date
//!   overwrite, date isolation
//! - **Statistics**: append-only time series, descending reads, latest
//! - **Watermarks**: absence semantics, per-type independence
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory that
//! creates a fresh, empty store for each test:
//!
//! ```ignore
//! use wanimirror_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn sqlite_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         SqliteStore::in_memory().await.expect("fresh store")
//!     })
//!     .await;
//!     assert_eq!(report.failed, 0, "{report}");
//! }
//! ```

mod filter;
mod fk;
mod snapshot;
mod statistics;
mod upsert;
mod watermark;

use std::fmt;
use std::future::Future;

use time::macros::datetime;
use time::OffsetDateTime;
use wanimirror_core::{
    Assignment, Meaning, Reading, Review, Subject, SubjectData, SubjectKind,
};

use crate::MirrorStore;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "upsert", "fk", "filter").
    pub category: String,
    /// Test name (e.g. "upsert_subject_twice_yields_single_row").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        let (passed, message) = match result {
            Ok(()) => (true, None),
            Err(msg) => (false, Some(msg)),
        };
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed,
            message,
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh,
/// empty store, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(upsert::run_upsert_tests(&factory).await);
    results.extend(fk::run_fk_tests(&factory).await);
    results.extend(filter::run_filter_tests(&factory).await);
    results.extend(snapshot::run_snapshot_tests(&factory).await);
    results.extend(statistics::run_statistics_tests(&factory).await);
    results.extend(watermark::run_watermark_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: record constructors with sensible defaults ──────────────────────

fn base_time() -> OffsetDateTime {
    datetime!(2024-01-10 08:00:00 UTC)
}

fn make_subject(id: i64, kind: SubjectKind, level: i64) -> Subject {
    Subject {
        id,
        kind,
        url: format!("https://api.example.test/v2/subjects/{id}"),
        data_updated_at: base_time(),
        data: SubjectData {
            level,
            characters: Some(format!("字{id}")),
            meanings: vec![Meaning {
                meaning: format!("meaning-{id}"),
                primary: true,
            }],
            readings: vec![Reading {
                reading: format!("reading-{id}"),
                primary: true,
            }],
        },
    }
}

fn make_assignment(id: i64, subject_id: i64, subject_type: SubjectKind, srs_stage: i64) -> Assignment {
    Assignment {
        id,
        subject_id,
        subject_type,
        srs_stage,
        unlocked_at: Some(datetime!(2024-01-01 00:00:00 UTC)),
        started_at: Some(datetime!(2024-01-02 00:00:00 UTC)),
        passed_at: None,
        data_updated_at: base_time(),
    }
}

fn make_review(id: i64, assignment_id: i64, subject_id: i64, created_at: OffsetDateTime) -> Review {
    Review {
        id,
        assignment_id,
        subject_id,
        created_at,
        incorrect_meaning_answers: 1,
        incorrect_reading_answers: 0,
    }
}

/// Commit subjects, assignments, and reviews in one transaction.
async fn seed<S: MirrorStore>(
    store: &S,
    subjects: &[Subject],
    assignments: &[Assignment],
    reviews: &[Review],
) -> Result<(), String> {
    let mut tx = store.begin_tx().await.map_err(err_str)?;
    store
        .upsert_subjects(&mut tx, subjects)
        .await
        .map_err(err_str)?;
    store
        .upsert_assignments(&mut tx, assignments)
        .await
        .map_err(err_str)?;
    store
        .upsert_reviews(&mut tx, reviews)
        .await
        .map_err(err_str)?;
    store.commit_tx(tx).await.map_err(err_str)
}

fn err_str<E: fmt::Display>(e: E) -> String {
    e.to_string()
}
