use thiserror::Error;

/// Failures reported by an [`Auth`] implementation.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("credential hashing failed: {0}")]
    Hashing(String),

    #[error("token issuance failed: {0}")]
    Issuance(String),
}

/// Credential hashing and session tokens.
///
/// Concrete schemes (password hashing cost, token signing, expiry) live
/// outside this crate; services only see this interface.
pub trait Auth: Send + Sync {
    /// Secure a plaintext secret for storage.
    fn hash(&self, secret: &str) -> Result<String, AuthError>;

    /// Whether `secret` matches a digest produced by [`Auth::hash`].
    fn verify(&self, digest: &str, secret: &str) -> bool;

    fn issue_token(&self, username: &str) -> Result<String, AuthError>;

    /// Resolve a token back to the username it was issued for.
    fn verify_token(&self, token: &str) -> Result<String, AuthError>;
}
