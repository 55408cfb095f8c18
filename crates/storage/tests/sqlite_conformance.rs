//! Conformance and backend-specific tests for `SqliteStore`.

use wanimirror_storage::conformance::run_conformance_suite;
use wanimirror_storage::{migrations, SqliteStore};

#[tokio::test]
async fn sqlite_passes_the_conformance_suite() {
    let report = run_conformance_suite(|| async {
        SqliteStore::in_memory().await.expect("fresh in-memory store")
    })
    .await;
    assert_eq!(report.failed, 0, "{report}");
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let store = SqliteStore::in_memory().await.expect("fresh store");
    let first = migrations::current_version(store.pool())
        .await
        .expect("version query");
    assert!(first > 0, "open() should have applied migrations");

    let second = migrations::run(store.pool()).await.expect("re-run");
    assert_eq!(first, second, "re-run must be a no-op at the same version");
}

#[tokio::test]
async fn revert_last_steps_back_one_version_and_rerun_restores_it() {
    let store = SqliteStore::in_memory().await.expect("fresh store");
    let applied = migrations::current_version(store.pool())
        .await
        .expect("version query");

    let reverted = migrations::revert_last(store.pool()).await.expect("revert");
    assert_eq!(reverted, applied - 1);

    let restored = migrations::run(store.pool()).await.expect("re-apply");
    assert_eq!(restored, applied);
}

#[tokio::test]
async fn foreign_keys_are_enforced_on_pooled_connections() {
    let store = SqliteStore::in_memory().await.expect("fresh store");

    // Bypass the store's own validation: the session pragma alone must
    // reject a dangling reference.
    let result = sqlx::query(
        "INSERT INTO assignments (id, subject_id, subject_type, srs_stage, data_updated_at) \
         VALUES (1, 999, 'kanji', 3, '2024-01-10T00:00:00Z')",
    )
    .execute(store.pool())
    .await;
    assert!(result.is_err(), "FK pragma must be active on the session");
}

#[tokio::test]
async fn on_disk_store_persists_across_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("mirror.db");
    let path = path.to_str().expect("utf-8 path");

    {
        let store = SqliteStore::open(path).await.expect("open");
        sqlx::query("INSERT INTO statistics (captured_at, data) VALUES ('2024-01-10T00:00:00Z', '{}')")
            .execute(store.pool())
            .await
            .expect("insert");
        store.close().await;
    }

    let store = SqliteStore::open(path).await.expect("reopen");
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM statistics")
        .fetch_one(store.pool())
        .await
        .expect("count");
    assert_eq!(count, 1);
    store.close().await;
}
