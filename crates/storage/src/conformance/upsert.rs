use std::future::Future;

use time::macros::datetime;
use wanimirror_core::{AssignmentFilter, SubjectFilter, SubjectKind, TimeRange};

use super::{err_str, make_assignment, make_review, make_subject, seed, TestResult};
use crate::MirrorStore;

pub(super) async fn run_upsert_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "upsert",
        "upsert_subject_twice_yields_single_matching_row",
        upsert_subject_twice_yields_single_matching_row(factory).await,
    ));
    results.push(TestResult::from_result(
        "upsert",
        "upsert_refreshes_scalar_columns",
        upsert_refreshes_scalar_columns(factory).await,
    ));
    results.push(TestResult::from_result(
        "upsert",
        "subject_round_trip_preserves_payload",
        subject_round_trip_preserves_payload(factory).await,
    ));
    results.push(TestResult::from_result(
        "upsert",
        "assignment_round_trip_preserves_all_fields",
        assignment_round_trip_preserves_all_fields(factory).await,
    ));
    results.push(TestResult::from_result(
        "upsert",
        "assignment_upsert_twice_is_idempotent",
        assignment_upsert_twice_is_idempotent(factory).await,
    ));
    results.push(TestResult::from_result(
        "upsert",
        "review_round_trip_preserves_counts",
        review_round_trip_preserves_counts(factory).await,
    ));
    results.push(TestResult::from_result(
        "upsert",
        "empty_batches_commit_cleanly",
        empty_batches_commit_cleanly(factory).await,
    ));

    results
}

// ── Test implementations ──────────────────────────────────────────────────────

/// `upsert(x); upsert(x)` leaves exactly one row with key `x.id`.
async fn upsert_subject_twice_yields_single_matching_row<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let subject = make_subject(1, SubjectKind::Kanji, 5);
    seed(&s, &[subject.clone()], &[], &[]).await?;
    seed(&s, &[subject.clone()], &[], &[]).await?;

    let stored = s
        .get_subjects(&SubjectFilter::default())
        .await
        .map_err(err_str)?;
    if stored.len() != 1 {
        return Err(format!("expected 1 row, got {}", stored.len()));
    }
    if stored[0] != subject {
        return Err(format!("stored row diverged: {:?}", stored[0]));
    }
    Ok(())
}

/// Re-upserting a changed record refreshes every scalar column and the
/// payload, still leaving a single row.
async fn upsert_refreshes_scalar_columns<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut subject = make_subject(1, SubjectKind::Kanji, 5);
    seed(&s, &[subject.clone()], &[], &[]).await?;

    subject.data.level = 6;
    subject.data.characters = Some("改".to_string());
    subject.data_updated_at = datetime!(2024-02-01 00:00:00 UTC);
    seed(&s, &[subject.clone()], &[], &[]).await?;

    let stored = s
        .get_subjects(&SubjectFilter::default())
        .await
        .map_err(err_str)?;
    if stored.len() != 1 {
        return Err(format!("expected 1 row, got {}", stored.len()));
    }
    if stored[0].data.level != 6 || stored[0].data.characters.as_deref() != Some("改") {
        return Err(format!("refresh did not take: {:?}", stored[0].data));
    }
    if stored[0].data_updated_at != datetime!(2024-02-01 00:00:00 UTC) {
        return Err(format!(
            "data_updated_at not refreshed: {}",
            stored[0].data_updated_at
        ));
    }
    Ok(())
}

/// A subject with meanings and readings reads back equal.
async fn subject_round_trip_preserves_payload<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let subject = make_subject(7, SubjectKind::Vocabulary, 12);
    seed(&s, &[subject.clone()], &[], &[]).await?;

    let stored = s
        .get_subjects(&SubjectFilter::default())
        .await
        .map_err(err_str)?;
    if stored != [subject.clone()] {
        return Err(format!("round trip diverged: {stored:?}"));
    }
    Ok(())
}

/// Optional timestamps (set and unset) survive the round trip at
/// second precision.
async fn assignment_round_trip_preserves_all_fields<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let subject = make_subject(1, SubjectKind::Radical, 2);
    let mut assignment = make_assignment(100, 1, SubjectKind::Radical, 4);
    assignment.passed_at = Some(datetime!(2024-01-05 12:34:56 UTC));
    seed(&s, &[subject], &[assignment.clone()], &[]).await?;

    let stored = s
        .get_assignments(&AssignmentFilter::default())
        .await
        .map_err(err_str)?;
    if stored != [assignment.clone()] {
        return Err(format!("round trip diverged: {stored:?}"));
    }
    Ok(())
}

async fn assignment_upsert_twice_is_idempotent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let subject = make_subject(1, SubjectKind::Kanji, 5);
    let assignment = make_assignment(100, 1, SubjectKind::Kanji, 3);
    seed(&s, &[subject], &[assignment.clone()], &[]).await?;
    seed(&s, &[], &[assignment.clone()], &[]).await?;

    let stored = s
        .get_assignments(&AssignmentFilter::default())
        .await
        .map_err(err_str)?;
    if stored.len() != 1 {
        return Err(format!("expected 1 row, got {}", stored.len()));
    }
    Ok(())
}

async fn review_round_trip_preserves_counts<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let subject = make_subject(1, SubjectKind::Kanji, 5);
    let assignment = make_assignment(100, 1, SubjectKind::Kanji, 3);
    let mut review = make_review(200, 100, 1, datetime!(2024-01-10 00:00:00 UTC));
    review.incorrect_meaning_answers = 3;
    review.incorrect_reading_answers = 2;
    seed(&s, &[subject], &[assignment], &[review.clone()]).await?;

    let stored = s
        .get_reviews(&TimeRange::default())
        .await
        .map_err(err_str)?;
    if stored != [review.clone()] {
        return Err(format!("round trip diverged: {stored:?}"));
    }
    Ok(())
}

/// Committing a transaction with empty batches is a clean no-op.
async fn empty_batches_commit_cleanly<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &[], &[], &[]).await?;

    let stored = s
        .get_subjects(&SubjectFilter::default())
        .await
        .map_err(err_str)?;
    if !stored.is_empty() {
        return Err(format!("expected empty store, got {} rows", stored.len()));
    }
    Ok(())
}
