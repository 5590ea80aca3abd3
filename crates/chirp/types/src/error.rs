use thiserror::Error;

/// Validation failures for entity values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("invalid username {0:?}: {1}")]
    InvalidUsername(String, &'static str),

    #[error("invalid post id {0:?}: {1}")]
    InvalidPostId(String, &'static str),
}
