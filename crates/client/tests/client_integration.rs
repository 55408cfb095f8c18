//! Integration tests for `WaniKaniClient` against an in-process stub
//! upstream.
//!
//! Each test binds a throwaway axum server on an ephemeral port and
//! points the client at it, verifying pagination, retry behavior, the
//! error taxonomy, and rate-limit tracking without touching the real
//! service.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use time::macros::datetime;
use wanimirror_client::{ApiError, RetryPolicy, WaniKaniClient};

/// Bind an ephemeral port, build the app (which may need its own base
/// URL for next_url chains), and serve it in the background.
async fn spawn_stub(make_app: impl FnOnce(String) -> Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub listener");
    let base = format!("http://{}", listener.local_addr().expect("stub addr"));
    let app = make_app(base.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("stub server");
    });
    base
}

/// Retry policy with delays shrunk to keep tests fast.
fn fast_retries() -> RetryPolicy {
    RetryPolicy {
        initial_backoff: Duration::from_millis(5),
        max_attempts: 3,
        rate_limit_fallback: Duration::from_millis(10),
    }
}

fn subject_json(id: i64, level: i64) -> serde_json::Value {
    json!({
        "id": id,
        "object": "kanji",
        "url": format!("https://api.example.test/v2/subjects/{id}"),
        "data_updated_at": "2024-01-10T08:30:00.000000Z",
        "data": {
            "level": level,
            "characters": "一",
            "meanings": [{"meaning": "One", "primary": true}],
            "readings": [{"reading": "いち", "primary": true}]
        }
    })
}

#[tokio::test]
async fn follows_next_url_chain_and_concatenates_in_order() {
    let base = spawn_stub(|base| {
        Router::new().route(
            "/subjects",
            get(move |Query(params): Query<HashMap<String, String>>| {
                let base = base.clone();
                async move {
                    match params.get("page").map(String::as_str) {
                        None => Json(json!({
                            "data": [subject_json(1, 1)],
                            "pages": {"next_url": format!("{base}/subjects?page=2")}
                        })),
                        Some("2") => Json(json!({
                            "data": [subject_json(2, 2)],
                            "pages": {"next_url": format!("{base}/subjects?page=3")}
                        })),
                        Some(_) => Json(json!({
                            "data": [subject_json(3, 3)],
                            "pages": {"next_url": null}
                        })),
                    }
                }
            }),
        )
    })
    .await;

    let client = WaniKaniClient::with_base_url(base, "token").with_retry_policy(fast_retries());
    let subjects = client.fetch_subjects(None).await.expect("fetch");
    let ids: Vec<i64> = subjects.iter().map(|s| s.id).collect();
    assert_eq!(ids, [1, 2, 3]);
    // Sub-second precision from the wire must be gone.
    assert_eq!(
        subjects[0].data_updated_at,
        datetime!(2024-01-10 08:30:00 UTC)
    );
}

#[tokio::test]
async fn propagates_updated_after_and_omits_it_when_absent() {
    let captured = Arc::new(Mutex::new(Vec::<Option<String>>::new()));
    let captured_handler = captured.clone();
    let base = spawn_stub(move |_| {
        Router::new().route(
            "/assignments",
            get(move |Query(params): Query<HashMap<String, String>>| {
                let captured = captured_handler.clone();
                async move {
                    captured
                        .lock()
                        .expect("capture lock")
                        .push(params.get("updated_after").cloned());
                    Json(json!({"data": [], "pages": {"next_url": null}}))
                }
            }),
        )
    })
    .await;

    let client = WaniKaniClient::with_base_url(base, "token").with_retry_policy(fast_retries());
    client.fetch_assignments(None).await.expect("plain fetch");
    client
        .fetch_assignments(Some(datetime!(2024-01-10 08:30:15 UTC)))
        .await
        .expect("incremental fetch");

    let seen = captured.lock().expect("capture lock");
    assert_eq!(seen[0], None);
    let incremental = seen[1].as_deref().expect("updated_after should be sent");
    let parsed = wanimirror_core::timestamp::parse_rfc3339(incremental).expect("valid rfc3339");
    assert_eq!(parsed, datetime!(2024-01-10 08:30:15 UTC));
}

#[tokio::test]
async fn empty_token_fails_without_touching_the_network() {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_handler = hits.clone();
    let base = spawn_stub(move |_| {
        Router::new().route(
            "/subjects",
            get(move || {
                let hits = hits_handler.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Json(json!({"data": [], "pages": null}))
                }
            }),
        )
    })
    .await;

    let client = WaniKaniClient::with_base_url(base, "").with_retry_policy(fast_retries());
    let err = client.fetch_subjects(None).await.expect_err("must fail");
    assert!(matches!(err, ApiError::Authentication), "got {err:?}");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn http_401_is_terminal_on_the_first_attempt() {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_handler = hits.clone();
    let base = spawn_stub(move |_| {
        Router::new().route(
            "/subjects",
            get(move || {
                let hits = hits_handler.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::UNAUTHORIZED, Json(json!({"error": "nope"})))
                }
            }),
        )
    })
    .await;

    let client = WaniKaniClient::with_base_url(base, "token").with_retry_policy(fast_retries());
    let err = client.fetch_subjects(None).await.expect_err("must fail");
    assert!(matches!(err, ApiError::Authentication), "got {err:?}");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn server_errors_retry_up_to_three_attempts() {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_handler = hits.clone();
    let base = spawn_stub(move |_| {
        Router::new().route(
            "/reviews",
            get(move || {
                let hits = hits_handler.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({})))
                }
            }),
        )
    })
    .await;

    let client = WaniKaniClient::with_base_url(base, "token").with_retry_policy(fast_retries());
    let err = client.fetch_reviews(None).await.expect_err("must fail");
    assert!(matches!(err, ApiError::Server { status: 500 }), "got {err:?}");
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn rate_limited_request_recovers_after_retry_after() {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_handler = hits.clone();
    let base = spawn_stub(move |_| {
        Router::new().route(
            "/subjects",
            get(move || {
                let hits = hits_handler.clone();
                async move {
                    if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                        (
                            StatusCode::TOO_MANY_REQUESTS,
                            [("Retry-After", "0")],
                            Json(json!({"error": "slow down"})),
                        )
                            .into_response()
                    } else {
                        Json(json!({"data": [subject_json(1, 1)], "pages": {"next_url": null}}))
                            .into_response()
                    }
                }
            }),
        )
    })
    .await;

    let client = WaniKaniClient::with_base_url(base, "token").with_retry_policy(fast_retries());
    let subjects = client.fetch_subjects(None).await.expect("should recover");
    assert_eq!(subjects.len(), 1);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn rate_limit_headers_are_tracked_even_on_errors() {
    let base = spawn_stub(move |_| {
        Router::new().route(
            "/subjects",
            get(|| async {
                (
                    StatusCode::BAD_GATEWAY,
                    [
                        ("RateLimit-Remaining", "59"),
                        ("RateLimit-Reset", "1704880800"),
                    ],
                    Json(json!({})),
                )
            }),
        )
    })
    .await;

    let client = WaniKaniClient::with_base_url(base, "token").with_retry_policy(RetryPolicy {
        max_attempts: 1,
        ..fast_retries()
    });
    assert!(client.get_rate_limit_status().await.is_none());

    let err = client.fetch_subjects(None).await.expect_err("must fail");
    assert!(matches!(err, ApiError::Server { status: 502 }), "got {err:?}");

    let status = client
        .get_rate_limit_status()
        .await
        .expect("status recorded");
    assert_eq!(status.remaining, 59);
    assert_eq!(
        status.reset_at,
        time::OffsetDateTime::from_unix_timestamp(1_704_880_800).expect("valid ts")
    );
}

#[tokio::test]
async fn set_api_token_switches_subsequent_requests() {
    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let seen_handler = seen.clone();
    let base = spawn_stub(move |_| {
        Router::new().route(
            "/subjects",
            get(move |headers: HeaderMap| {
                let seen = seen_handler.clone();
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    seen.lock().expect("seen lock").push(auth);
                    Json(json!({"data": [], "pages": null}))
                }
            }),
        )
    })
    .await;

    let client = WaniKaniClient::with_base_url(base, "first").with_retry_policy(fast_retries());
    client.fetch_subjects(None).await.expect("first fetch");
    client.set_api_token("second").await;
    client.fetch_subjects(None).await.expect("second fetch");

    let seen = seen.lock().expect("seen lock");
    assert_eq!(seen.as_slice(), ["Bearer first", "Bearer second"]);
}

#[tokio::test]
async fn malformed_collection_body_is_a_terminal_protocol_error() {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_handler = hits.clone();
    let base = spawn_stub(move |_| {
        Router::new().route(
            "/subjects",
            get(move || {
                let hits = hits_handler.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Json(json!({"data": "not-an-array"}))
                }
            }),
        )
    })
    .await;

    let client = WaniKaniClient::with_base_url(base, "token").with_retry_policy(fast_retries());
    let err = client.fetch_subjects(None).await.expect_err("must fail");
    assert!(matches!(err, ApiError::Protocol(_)), "got {err:?}");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fetch_statistics_unwraps_the_report_envelope() {
    let base = spawn_stub(move |_| {
        Router::new().route(
            "/summary",
            get(|| async {
                Json(json!({
                    "object": "report",
                    "url": "https://api.example.test/v2/summary",
                    "data_updated_at": "2024-01-10T08:30:00Z",
                    "data": {"lessons": [{"subject_ids": [1, 2]}]}
                }))
            }),
        )
    })
    .await;

    let client = WaniKaniClient::with_base_url(base, "token").with_retry_policy(fast_retries());
    let report = client.fetch_statistics().await.expect("fetch");
    assert_eq!(report, json!({"lessons": [{"subject_ids": [1, 2]}]}));
}
