//! Error types for the policy intake advisor

use thiserror::Error;

/// Result type alias for advisor operations
pub type Result<T> = std::result::Result<T, AdvisorError>;

#[derive(Error, Debug)]
pub enum AdvisorError {

    // =============================
    // Core Pipeline Errors
    // =============================

    #[error("Document extraction failure: {0}")]
    Extraction(String),

    #[error("Narrative generation error: {0}")]
    Narrative(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Session state error: {0}")]
    SessionState(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
