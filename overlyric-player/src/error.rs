use thiserror::Error;

/// Errors talking to the external playback source.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// Configured player URL could not be parsed or joined.
    #[error("Invalid player URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The request itself failed (connect, timeout, body).
    #[error("Player request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// The player answered with a non-success status.
    #[error("Player returned status {status}")]
    Status { status: u16 },

    /// The now-playing payload was not valid JSON for the expected shape.
    #[error("Invalid now-playing payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience type alias for Results with `PlayerError`.
pub type Result<T> = std::result::Result<T, PlayerError>;
