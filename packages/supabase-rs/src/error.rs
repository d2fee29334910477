use thiserror::Error;

/// Errors surfaced by the Supabase clients.
///
/// Upstream failures are passed through with their status and message so the
/// caller can decide what they mean; nothing is retried here.
#[derive(Debug, Error)]
pub enum SupabaseError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{service} returned {status}: {message}")]
    Api {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("unexpected response shape: {0}")]
    Decode(String),

    #[error("realtime channel error: {0}")]
    Realtime(String),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl SupabaseError {
    /// HTTP status of the upstream failure, when there is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            SupabaseError::Api { status, .. } => Some(*status),
            SupabaseError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
