use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use overlyric_core::CoreError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind control server to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Control server stopped: {0}")]
    Serve(#[source] std::io::Error),

    #[error("Command {action} failed: {source}")]
    Command {
        action: &'static str,
        #[source]
        source: CoreError,
    },

    #[error("No lyrics available for the current song")]
    LyricNotFound,

    #[error("No cover image available")]
    CoverNotFound,
}

impl ServerError {
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::LyricNotFound | Self::CoverNotFound => StatusCode::NOT_FOUND,
            Self::Command { .. } => StatusCode::BAD_GATEWAY,
            Self::Bind { .. } | Self::Serve(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// `{"status":"error","message":...}`
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub status: &'static str,
    pub message: String,
}

impl ErrorEnvelope {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: message.into(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(ErrorEnvelope::new(self.to_string()))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
