use std::io;
use thiserror::Error;

/// Shared error taxonomy for the sync engine. Every component that can fail
/// resolves its failure into one of these variants before it crosses a crate
/// boundary.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Upstream answered with a non-200, non-429 status.
    #[error("upstream {url} returned {status}")]
    ResponseCode {
        status: u16,
        url: String,
        body: String,
    },

    /// Upstream answered 429; the host is named so callers can back off.
    #[error("rate limited by {host}")]
    TooManyRequests { host: String },

    /// Network/transport failure (timeout, connection reset, DNS, ...).
    #[error("transport error calling {url}: {source}")]
    TransportError { url: String, source: String },

    /// A project's file/version single-shot listing didn't agree with its
    /// own pagination header after exhausting the shrink-and-retry budget.
    #[error("inconsistent upstream listing for project {project_id}")]
    InconsistentUpstream { project_id: String },

    /// Upstream reported zero versions for a project that previously had
    /// versions; treated as suspect rather than pruned.
    #[error("project {project_id} returned an empty version list, suspect")]
    EmptyVersionsSuspect { project_id: String },

    /// 404 at a leaf call; non-fatal, handled by the caller.
    #[error("not found: {0}")]
    NotFound(String),

    /// Rate-limit acquisition exceeded its caller-supplied timeout.
    #[error("rate limit acquire timed out for host {host}")]
    RateLimitTimeout { host: String },

    /// Any other upstream failure that survived HttpClient's retry policy.
    #[error("upstream error: {0}")]
    UpstreamError(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("object store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("mongodb error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<String> for SyncError {
    fn from(s: String) -> Self {
        SyncError::Other(s)
    }
}

impl From<&str> for SyncError {
    fn from(s: &str) -> Self {
        SyncError::Other(s.to_string())
    }
}

impl SyncError {
    /// Whether HttpClient's retry policy should retry this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::TooManyRequests { .. }
                | SyncError::TransportError { .. }
                | SyncError::RateLimitTimeout { .. }
        ) || matches!(self, SyncError::ResponseCode { status, .. } if *status >= 500)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound(_))
            || matches!(self, SyncError::ResponseCode { status, .. } if *status == 404)
    }
}
