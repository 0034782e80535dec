//! Error types for RAGent.
//!
//! A single error enum covers every failure category in the workspace:
//! configuration, I/O, the two external capabilities (retrieval and
//! completion), prompt rendering, timeouts and cancellation.

use thiserror::Error;

/// Unified error type for RAGent.
///
/// Library functions return `Result<T, AppError>`. The orchestrator is the
/// only place where these errors are turned into a user-facing verdict, so
/// variants carry enough context for logs but are never shown raw.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Completion provider errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Retrieval backend errors (connectivity, malformed responses)
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Grounded generation errors
    #[error("Generation error: {0}")]
    Generation(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// An external call exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The caller abandoned the request
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
