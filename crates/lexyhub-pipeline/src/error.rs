use lexyhub_core::CoreError;
use lexyhub_db::DbError;
use thiserror::Error;

/// Errors raised by a [`crate::store::KeywordStore`] or
/// [`crate::store::SignalFeed`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] DbError),

    /// The backing store could not serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("keyword {0} not found")]
    KeywordNotFound(i64),

    #[error("job run {0} is not running")]
    RunNotRunning(i64),

    #[error(transparent)]
    Invalid(#[from] CoreError),

    #[error("extras encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors raised while fetching one data source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid feed URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SourceError {
    /// Whether a retry after back-off may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
            }
            Self::Status { status, .. } => *status == 429 || (500..600).contains(status),
            Self::Deserialize { .. } | Self::InvalidUrl { .. } | Self::Store(_) => false,
        }
    }
}

/// Errors that stop a job as a whole.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Misconfiguration detected before any write.
    #[error("configuration error: {0}")]
    Config(String),

    /// A gate flag could not be read; the job must not run blind.
    #[error("feature flag '{flag}' could not be read: {source}")]
    FlagUnreadable {
        flag: &'static str,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Source(#[from] SourceError),
}
