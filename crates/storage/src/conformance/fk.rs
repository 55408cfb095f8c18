use std::future::Future;

use time::macros::datetime;
use wanimirror_core::{AssignmentFilter, SubjectFilter, SubjectKind, TimeRange};

use super::{err_str, make_assignment, make_review, make_subject, seed, TestResult};
use crate::{MirrorStore, StorageError};

pub(super) async fn run_fk_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "fk",
        "assignment_with_missing_subject_rejected",
        assignment_with_missing_subject_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "fk",
        "one_dangling_reference_fails_the_whole_batch",
        one_dangling_reference_fails_the_whole_batch(factory).await,
    ));
    results.push(TestResult::from_result(
        "fk",
        "review_with_missing_assignment_rejected",
        review_with_missing_assignment_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "fk",
        "review_with_missing_subject_rejected",
        review_with_missing_subject_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "fk",
        "references_resolve_within_the_same_transaction",
        references_resolve_within_the_same_transaction(factory).await,
    ));
    results.push(TestResult::from_result(
        "fk",
        "aborted_transaction_leaves_store_unchanged",
        aborted_transaction_leaves_store_unchanged(factory).await,
    ));

    results
}

// ── Test implementations ──────────────────────────────────────────────────────

async fn assignment_with_missing_subject_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let dangling = make_assignment(100, 999, SubjectKind::Kanji, 3);

    let mut tx = s.begin_tx().await.map_err(err_str)?;
    let outcome = s.upsert_assignments(&mut tx, &[dangling]).await;
    s.abort_tx(tx).await.map_err(err_str)?;

    match outcome {
        Err(StorageError::MissingReference {
            referenced_id: 999, ..
        }) => Ok(()),
        Err(other) => Err(format!("expected MissingReference, got {other}")),
        Ok(()) => Err("dangling assignment was accepted".to_string()),
    }
}

/// A batch mixing one valid and one dangling assignment must write
/// nothing at all.
async fn one_dangling_reference_fails_the_whole_batch<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &[make_subject(1, SubjectKind::Kanji, 5)], &[], &[]).await?;

    let valid = make_assignment(100, 1, SubjectKind::Kanji, 3);
    let dangling = make_assignment(101, 999, SubjectKind::Kanji, 3);

    let mut tx = s.begin_tx().await.map_err(err_str)?;
    let outcome = s.upsert_assignments(&mut tx, &[valid, dangling]).await;
    s.abort_tx(tx).await.map_err(err_str)?;

    if outcome.is_ok() {
        return Err("batch with dangling reference was accepted".to_string());
    }
    let stored = s
        .get_assignments(&AssignmentFilter::default())
        .await
        .map_err(err_str)?;
    if !stored.is_empty() {
        return Err(format!("partial write survived: {} rows", stored.len()));
    }
    Ok(())
}

async fn review_with_missing_assignment_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &[make_subject(1, SubjectKind::Kanji, 5)], &[], &[]).await?;
    let review = make_review(200, 999, 1, datetime!(2024-01-10 00:00:00 UTC));

    let mut tx = s.begin_tx().await.map_err(err_str)?;
    let outcome = s.upsert_reviews(&mut tx, &[review]).await;
    s.abort_tx(tx).await.map_err(err_str)?;

    match outcome {
        Err(StorageError::MissingReference {
            referenced: "assignment",
            ..
        }) => Ok(()),
        Err(other) => Err(format!("expected MissingReference, got {other}")),
        Ok(()) => Err("dangling review was accepted".to_string()),
    }
}

async fn review_with_missing_subject_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(
        &s,
        &[make_subject(1, SubjectKind::Kanji, 5)],
        &[make_assignment(100, 1, SubjectKind::Kanji, 3)],
        &[],
    )
    .await?;
    let review = make_review(200, 100, 999, datetime!(2024-01-10 00:00:00 UTC));

    let mut tx = s.begin_tx().await.map_err(err_str)?;
    let outcome = s.upsert_reviews(&mut tx, &[review]).await;
    s.abort_tx(tx).await.map_err(err_str)?;

    match outcome {
        Err(StorageError::MissingReference {
            referenced: "subject",
            ..
        }) => Ok(()),
        Err(other) => Err(format!("expected MissingReference, got {other}")),
        Ok(()) => Err("dangling review was accepted".to_string()),
    }
}

/// A subject, its assignment, and a review inserted in one transaction
/// must validate against each other before the commit.
async fn references_resolve_within_the_same_transaction<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(
        &s,
        &[make_subject(1, SubjectKind::Kanji, 5)],
        &[make_assignment(100, 1, SubjectKind::Kanji, 3)],
        &[make_review(200, 100, 1, datetime!(2024-01-10 00:00:00 UTC))],
    )
    .await?;

    let reviews = s
        .get_reviews(&TimeRange::default())
        .await
        .map_err(err_str)?;
    if reviews.len() != 1 {
        return Err(format!("expected 1 review, got {}", reviews.len()));
    }
    Ok(())
}

async fn aborted_transaction_leaves_store_unchanged<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut tx = s.begin_tx().await.map_err(err_str)?;
    s.upsert_subjects(&mut tx, &[make_subject(1, SubjectKind::Kanji, 5)])
        .await
        .map_err(err_str)?;
    s.abort_tx(tx).await.map_err(err_str)?;

    let stored = s
        .get_subjects(&SubjectFilter::default())
        .await
        .map_err(err_str)?;
    if !stored.is_empty() {
        return Err(format!("aborted write visible: {} rows", stored.len()));
    }
    Ok(())
}
