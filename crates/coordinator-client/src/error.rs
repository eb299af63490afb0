//! Coordinator client errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid root certificate: {0}")]
    InvalidRootCertificate(String),

    #[error("Invalid client identity: {0}")]
    InvalidIdentity(String),

    #[error("Coordinator rejected request: {status} - {body}")]
    Rejected { status: u16, body: String },
}
