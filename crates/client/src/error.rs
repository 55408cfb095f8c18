use std::time::Duration;

/// Classified upstream failure, as seen by the sync orchestrator after
/// the client's own retry policy is exhausted.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Transport failure: connection refused or reset, DNS, timeout.
    #[error("network error: {0}")]
    Network(String),

    /// HTTP 401, or an empty API token (rejected before the network).
    #[error("upstream authentication failed")]
    Authentication,

    /// HTTP 429. `retry_after` is the parsed `Retry-After` header, if
    /// the response carried a usable one.
    #[error("upstream rate limit exceeded")]
    RateLimited { retry_after: Option<Duration> },

    /// HTTP 5xx.
    #[error("upstream server error (HTTP {status})")]
    Server { status: u16 },

    /// Unparseable body or a response missing required fields.
    #[error("upstream protocol error: {0}")]
    Protocol(String),

    /// Any other non-2xx status.
    #[error("unexpected upstream status {status}")]
    Unexpected { status: u16 },
}

impl ApiError {
    /// Whether another attempt could plausibly succeed. Authentication
    /// and protocol failures fail on the first attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Network(_) | ApiError::RateLimited { .. } | ApiError::Server { .. }
        )
    }
}
