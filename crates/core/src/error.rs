//! Error types for the GameFi orchestrator.
//!
//! A single enum covers the orchestration taxonomy (malformed model replies,
//! unsafe generated queries, retrieval failures, transport failures, timeouts)
//! plus the ambient configuration, I/O and serialization errors.

use thiserror::Error;

/// Unified error type.
///
/// All fallible functions in the workspace return `Result<T, AppError>`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Model endpoint unreachable or returned a non-success status
    #[error("LLM error: {0}")]
    Llm(String),

    /// Relational/vector store unreachable or a statement failed
    #[error("Store error: {0}")]
    Store(String),

    /// A decomposer/classifier/verdict reply that does not match its micro-grammar
    #[error("Malformed model reply: {0}")]
    MalformedReply(String),

    /// A generated query rejected by the query gate
    #[error("Unsafe generated query: {0}")]
    UnsafeQuery(String),

    /// A retrieval step produced no usable context
    #[error("Retrieval failure: {0}")]
    Retrieval(String),

    /// A model or store call exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The enclosing run was cancelled
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Prompt registry errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

/// Coarse classification of an [`AppError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    MalformedModelReply,
    UnsafeGeneratedQuery,
    RetrievalFailure,
    TransportFailure,
    Timeout,
    Cancelled,
    Internal,
}

impl AppError {
    /// Map this error onto the orchestration taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Config(_) | AppError::Prompt(_) => ErrorKind::Config,
            AppError::MalformedReply(_) => ErrorKind::MalformedModelReply,
            AppError::UnsafeQuery(_) => ErrorKind::UnsafeGeneratedQuery,
            AppError::Retrieval(_) => ErrorKind::RetrievalFailure,
            AppError::Llm(_) | AppError::Store(_) => ErrorKind::TransportFailure,
            AppError::Timeout(_) => ErrorKind::Timeout,
            AppError::Cancelled(_) => ErrorKind::Cancelled,
            AppError::Io(_) | AppError::Serialization(_) | AppError::Other(_) => {
                ErrorKind::Internal
            }
        }
    }
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
