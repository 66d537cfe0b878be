//! Error kinds for the fetch pipeline.
//!
//! Adapter-level errors are logged and counted against their source; a caller
//! only ever observes `AllSourcesFailed` (carrying the last underlying error)
//! or `InvalidSymbol` for malformed per-symbol queries.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection-level failure (DNS, TCP, TLS).
    #[error("network error: {0}")]
    Network(String),

    /// Deadline expired while connecting or reading.
    #[error("request timed out")]
    Timeout,

    /// HTTP status >= 400; the body is kept as context.
    #[error("http status {code}: {body}")]
    Status { code: u16, body: String },

    /// Response bytes could not be decoded into records.
    #[error("decode error: {0}")]
    Decode(String),

    /// The source answered but produced no usable rows.
    #[error("empty result")]
    EmptyResult,

    /// Only reachable through the non-blocking limiter variant.
    #[error("rate limit exhausted for {host}, retry in {wait_ms}ms")]
    RateExhausted { host: String, wait_ms: u64 },

    /// The registry has this source in its disable window.
    #[error("source {0} is disabled")]
    SourceDisabled(String),

    /// Every available source for the area failed; the last error is kept.
    #[error("all sources failed: {last}")]
    AllSourcesFailed { last: Box<FetchError> },

    /// Unknown symbol format.
    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),
}

impl FetchError {
    /// Wrap the terminal error of a source sweep.
    pub fn all_failed(last: FetchError) -> Self {
        // Avoid nesting AllSourcesFailed inside itself when re-raised.
        match last {
            FetchError::AllSourcesFailed { .. } => last,
            other => FetchError::AllSourcesFailed { last: Box::new(other) },
        }
    }

    /// True for failures worth a transport-level retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Network(_) | FetchError::Timeout | FetchError::Status { code: 500..=599, .. }
        )
    }
}

pub type FetchResult<T> = Result<T, FetchError>;

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_decode() {
            FetchError::Decode(e.to_string())
        } else {
            FetchError::Network(e.to_string())
        }
    }
}
