use chirp_types::ModelError;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage-layer errors, shared by every engine.
///
/// Transport and codec failures of the distributed engine are folded into
/// `Unavailable` and `Serialization`; nothing client-specific leaks out.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage is closed")]
    Closed,
}

impl StorageError {
    pub fn user_not_found(username: &str) -> Self {
        Self::NotFound(format!("user {username}"))
    }

    pub fn post_not_found(post_id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("post {post_id}"))
    }

    /// Transient failures a caller may reasonably retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<ModelError> for StorageError {
    fn from(err: ModelError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

impl From<prost::DecodeError> for StorageError {
    fn from(err: prost::DecodeError) -> Self {
        Self::Serialization(err.to_string())
    }
}
