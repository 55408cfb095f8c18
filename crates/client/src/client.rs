use std::cmp;
use std::time::Duration;

use reqwest::header::{HeaderMap, AUTHORIZATION, RETRY_AFTER};
use serde::de::DeserializeOwned;
use time::format_description::well_known::Rfc2822;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use wanimirror_core::{timestamp, Assignment, Review, Subject};

use crate::error::ApiError;
use crate::wire::{AssignmentResource, Collection, Report, ReviewResource};

/// Default upstream endpoint used when no base URL override is given.
pub const DEFAULT_BASE_URL: &str = "https://api.wanikani.com/v2";

/// The upstream's version-pinning revision header.
const REVISION_HEADER: &str = "Wanikani-Revision";
const REVISION: &str = "20170710";

/// Retry parameters. The defaults implement the production policy;
/// tests shrink the delays.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Delay before the second attempt; doubles each further attempt.
    pub initial_backoff: Duration,
    /// Total attempts per request, first one included.
    pub max_attempts: u32,
    /// Rate-limit delay when the 429 carried no usable `Retry-After`.
    pub rate_limit_fallback: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_attempts: 3,
            rate_limit_fallback: Duration::from_secs(60),
        }
    }
}

/// The rate-limit window observed on the most recent upstream response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Requests left in the current window.
    pub remaining: u64,
    /// When the window resets.
    pub reset_at: OffsetDateTime,
}

/// HTTP client for the upstream API.
///
/// Cheap to share behind an `Arc`; the token and rate-limit status are
/// interior-mutable under read/write locks so `set_api_token` replaces
/// the token atomically and status reads never observe a torn pair.
pub struct WaniKaniClient {
    http: reqwest::Client,
    base_url: String,
    token: RwLock<String>,
    rate_limit: RwLock<Option<RateLimitStatus>>,
    retry: RetryPolicy,
}

impl WaniKaniClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    pub fn with_base_url(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
            token: RwLock::new(token.into()),
            rate_limit: RwLock::new(None),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the API token. Requests issued after this call use the
    /// new token; an in-flight request keeps the token it started with.
    pub async fn set_api_token(&self, token: impl Into<String>) {
        *self.token.write().await = token.into();
    }

    /// The `{remaining, reset_at}` pair from the most recent response,
    /// or `None` before the first response carrying the headers.
    pub async fn get_rate_limit_status(&self) -> Option<RateLimitStatus> {
        *self.rate_limit.read().await
    }

    /// All subjects, spanning every page. `updated_after`, when set, is
    /// propagated as the incremental-fetch query parameter.
    pub async fn fetch_subjects(
        &self,
        updated_after: Option<OffsetDateTime>,
    ) -> Result<Vec<Subject>, ApiError> {
        let subjects: Vec<Subject> = self.fetch_collection("subjects", updated_after).await?;
        Ok(subjects.into_iter().map(normalize_subject).collect())
    }

    pub async fn fetch_assignments(
        &self,
        updated_after: Option<OffsetDateTime>,
    ) -> Result<Vec<Assignment>, ApiError> {
        let resources: Vec<AssignmentResource> =
            self.fetch_collection("assignments", updated_after).await?;
        Ok(resources.into_iter().map(Assignment::from).collect())
    }

    pub async fn fetch_reviews(
        &self,
        updated_after: Option<OffsetDateTime>,
    ) -> Result<Vec<Review>, ApiError> {
        let resources: Vec<ReviewResource> =
            self.fetch_collection("reviews", updated_after).await?;
        Ok(resources.into_iter().map(Review::from).collect())
    }

    /// The single current summary report (the payload under `data`).
    pub async fn fetch_statistics(&self) -> Result<serde_json::Value, ApiError> {
        let url = format!("{}/summary", self.base_url);
        let body = self.get_json(&url).await?;
        let report: Report = serde_json::from_value(body)
            .map_err(|e| ApiError::Protocol(format!("unexpected summary shape: {e}")))?;
        Ok(report.data)
    }

    /// Fetch every page of a collection endpoint, concatenating `data`
    /// in page order. Any failure mid-chain fails the whole call; a
    /// partial list is never returned.
    async fn fetch_collection<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        updated_after: Option<OffsetDateTime>,
    ) -> Result<Vec<T>, ApiError> {
        let mut url = format!("{}/{endpoint}", self.base_url);
        if let Some(after) = updated_after {
            let after = timestamp::format_rfc3339(after)
                .map_err(|e| ApiError::Protocol(format!("unformattable updated_after: {e}")))?;
            url.push_str("?updated_after=");
            url.push_str(&urlencoded(&after));
        }

        let mut out = Vec::new();
        loop {
            let body = self.get_json(&url).await?;
            let page: Collection<T> = serde_json::from_value(body)
                .map_err(|e| ApiError::Protocol(format!("unexpected collection shape: {e}")))?;
            out.extend(page.data);
            match page.pages.and_then(|p| p.next_url) {
                Some(next) => url = next,
                None => break,
            }
        }
        Ok(out)
    }

    /// One authenticated GET with the retry policy applied.
    async fn get_json(&self, url: &str) -> Result<serde_json::Value, ApiError> {
        let mut backoff = self.retry.initial_backoff;
        let mut attempt = 1;
        loop {
            match self.get_json_once(url).await {
                Ok(body) => return Ok(body),
                Err(err) if err.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = match &err {
                        ApiError::RateLimited { retry_after } => cmp::max(
                            backoff,
                            retry_after.unwrap_or(self.retry.rate_limit_fallback),
                        ),
                        _ => backoff,
                    };
                    tokio::time::sleep(delay).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn get_json_once(&self, url: &str) -> Result<serde_json::Value, ApiError> {
        let token = self.token.read().await.clone();
        if token.is_empty() {
            return Err(ApiError::Authentication);
        }

        let response = self
            .http
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(REVISION_HEADER, REVISION)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        // Error responses carry rate-limit headers too.
        self.record_rate_limit(response.headers()).await;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| ApiError::Protocol(format!("unparseable body: {e}")));
        }

        let retry_after = parse_retry_after(response.headers());
        Err(match status.as_u16() {
            401 => ApiError::Authentication,
            429 => ApiError::RateLimited { retry_after },
            code @ 500..=599 => ApiError::Server { status: code },
            code => ApiError::Unexpected { status: code },
        })
    }

    async fn record_rate_limit(&self, headers: &HeaderMap) {
        let remaining = header_u64(headers, "RateLimit-Remaining");
        let reset = header_u64(headers, "RateLimit-Reset");
        if let (Some(remaining), Some(reset)) = (remaining, reset) {
            if let Ok(reset_at) = OffsetDateTime::from_unix_timestamp(reset as i64) {
                *self.rate_limit.write().await = Some(RateLimitStatus {
                    remaining,
                    reset_at,
                });
            }
        }
    }
}

fn normalize_subject(mut subject: Subject) -> Subject {
    subject.data_updated_at = timestamp::truncate_to_second(subject.data_updated_at);
    subject
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
}

/// Parse `Retry-After` as integer seconds or an HTTP-date. Returns
/// `None` for an absent or unparseable header, which falls back to the
/// policy's fixed rate-limit delay.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let when = OffsetDateTime::parse(raw, &Rfc2822).ok()?;
    let delta = when - OffsetDateTime::now_utc();
    if delta.is_positive() {
        Some(Duration::from_secs(delta.whole_seconds() as u64))
    } else {
        Some(Duration::ZERO)
    }
}

/// Percent-encode a query parameter value (RFC 3339 timestamps carry
/// `:` and sometimes `+`, which must not reach the wire bare).
fn urlencoded(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' | '~' => out.push(ch),
            _ => {
                for byte in ch.to_string().as_bytes() {
                    out.push_str(&format!("%{byte:02X}"));
                }
            }
        }
    }
    out
}
