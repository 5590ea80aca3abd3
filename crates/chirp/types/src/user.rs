use crate::ModelError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Longest accepted username, in bytes.
pub const MAX_USERNAME_LEN: usize = 64;

/// Check that a username can be used as an identity key.
///
/// Usernames end up inside composite storage keys (`follows/{a}/{b}`), so
/// the key separator is forbidden along with whitespace and control bytes.
pub fn validate_username(username: &str) -> Result<(), ModelError> {
    let reject = |reason| Err(ModelError::InvalidUsername(username.to_string(), reason));
    if username.is_empty() {
        return reject("must not be empty");
    }
    if username.len() > MAX_USERNAME_LEN {
        return reject("too long");
    }
    if username.contains('/') {
        return reject("must not contain '/'");
    }
    if username
        .chars()
        .any(|c| c.is_whitespace() || c.is_control())
    {
        return reject("must not contain whitespace or control characters");
    }
    Ok(())
}

/// A registered account.
///
/// `follows` and `followers` are two halves of the same edge set: `b` in
/// `a.follows` iff `a` in `b.followers`. Engines keep them in step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    /// Opaque secured credential produced by the auth collaborator.
    pub password_digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub follows: BTreeSet<String>,
    #[serde(default)]
    pub followers: BTreeSet<String>,
}

impl User {
    /// New account with an empty follow graph.
    pub fn new(username: impl Into<String>, password_digest: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password_digest: password_digest.into(),
            email: None,
            follows: BTreeSet::new(),
            followers: BTreeSet::new(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into()).filter(|e: &String| !e.is_empty());
        self
    }

    pub fn follows_user(&self, username: &str) -> bool {
        self.follows.contains(username)
    }

    pub fn is_followed_by(&self, username: &str) -> bool {
        self.followers.contains(username)
    }

    /// Copy of this user with the edge sets cleared.
    pub fn without_edges(&self) -> Self {
        Self {
            follows: BTreeSet::new(),
            followers: BTreeSet::new(),
            ..self.clone()
        }
    }

    /// Overwrite the fields an update carries; everything else is kept.
    pub fn apply(&mut self, update: &UserUpdate) {
        if let Some(email) = update.email() {
            self.email = Some(email.to_string());
        }
        if let Some(digest) = update.password_digest() {
            self.password_digest = digest.to_string();
        }
    }
}

/// Sparse profile update. Absent or empty fields leave the stored value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUpdate {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password_digest: Option<String>,
}

impl UserUpdate {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref().filter(|e| !e.is_empty())
    }

    pub fn password_digest(&self) -> Option<&str> {
        self.password_digest.as_deref().filter(|d| !d.is_empty())
    }

    pub fn set_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn set_password_digest(mut self, digest: impl Into<String>) -> Self {
        self.password_digest = Some(digest.into());
        self
    }

    /// True when applying this update would not change anything.
    pub fn is_empty(&self) -> bool {
        self.email().is_none() && self.password_digest().is_none()
    }
}
