//! Error taxonomy shared by the pipeline and both front-ends.
//!
//! The HTTP layer maps each variant onto a status code (see
//! [`server`](crate::server)); the CLI wraps them in `anyhow` with context.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QaError {
    /// Rejected input: empty file list, non-PDF name, blank question, ...
    #[error("{0}")]
    Validation(String),

    /// An index was requested over zero chunks.
    #[error("cannot build an index from an empty chunk set")]
    EmptyInput,

    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// A single document could not be parsed. Batch extraction records these
    /// in its report instead of returning them.
    #[error("PDF extraction failed: {0}")]
    Extraction(String),

    #[error("embedding request failed: {0}")]
    Embedding(String),

    #[error("LLM request failed: {0}")]
    Llm(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl QaError {
    pub fn validation(message: impl Into<String>) -> Self {
        QaError::Validation(message.into())
    }

    /// True for failures of an external service (embedding or LLM API).
    pub fn is_upstream(&self) -> bool {
        matches!(self, QaError::Embedding(_) | QaError::Llm(_))
    }
}

impl From<tokio::task::JoinError> for QaError {
    fn from(err: tokio::task::JoinError) -> Self {
        QaError::Internal(format!("background task failed: {}", err))
    }
}

pub type Result<T, E = QaError> = std::result::Result<T, E>;
