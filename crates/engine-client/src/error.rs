//! Engine client errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Hyper error: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Engine API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Unsupported endpoint URL: {0}")]
    UnsupportedEndpoint(String),

    #[error("Socket not found: {0}")]
    SocketNotFound(String),
}

impl EngineError {
    /// True when the engine answered 404 for the requested object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::Api { status: 404, .. })
    }
}
