//! HTTP client for the upstream WaniKani REST API.
//!
//! Provides [`WaniKaniClient`], which encapsulates all HTTP
//! interactions with the upstream service. The sync orchestrator
//! delegates to this client rather than constructing requests itself.
//!
//! Contract highlights:
//! - Every request carries `Authorization: Bearer <token>` and the
//!   upstream's revision-pinning header; an empty token fails with an
//!   authentication error before any network attempt.
//! - Collection fetches follow the `pages.next_url` chain to the end
//!   and concatenate `data` in order; a failure mid-chain fails the
//!   whole fetch rather than returning a partial list.
//! - Retryable failures (network, 429, 5xx) back off exponentially
//!   from 1 s, doubling, capped at 3 attempts. A 429 waits at least
//!   `Retry-After` (60 s when the header is absent or unparseable).
//! - `RateLimit-Remaining` / `RateLimit-Reset` headers are tracked
//!   after every response, error responses included.
//!
//! All waits are `tokio::time::sleep`, so dropping a fetch future
//! (request disconnect, shutdown) preempts any pending backoff delay.

mod client;
mod error;
mod wire;

pub use client::{RateLimitStatus, RetryPolicy, WaniKaniClient, DEFAULT_BASE_URL};
pub use error::ApiError;
