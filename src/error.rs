use thiserror::Error;

/// Failures from the embedding provider. Always record-scoped: callers log
/// them and move on to the next episode.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("provider returned no embedding")]
    Empty,
}

impl EmbedError {
    /// Rate limits, server errors and dropped connections are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            EmbedError::Http(e) => e.is_timeout() || e.is_connect(),
            EmbedError::Api { status, .. } => *status == 429 || *status >= 500,
            EmbedError::Empty => false,
        }
    }
}
