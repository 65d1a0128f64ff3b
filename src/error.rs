//! Error types for Montage.

use thiserror::Error;

/// Library-level error type for Montage operations.
#[derive(Error, Debug)]
pub enum MontageError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Session store error: {0}")]
    SessionStore(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("No capability registered under the name '{0}'")]
    UnknownCapability(String),

    #[error("Capability error: {0}")]
    Capability(String),

    #[error("Media library error: {0}")]
    Library(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for Montage operations.
pub type Result<T> = std::result::Result<T, MontageError>;
