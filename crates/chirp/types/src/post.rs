use crate::{validate_username, ModelError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator between the author and the engine-assigned part of a post id.
pub const POST_ID_SEPARATOR: char = '/';

/// Post identifier, always of the form `{author}/{local}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PostId(String);

impl PostId {
    /// Compose an id from its author and the engine-local suffix.
    ///
    /// `author` must already be a valid username; a `/` in it would place
    /// the id under another author.
    pub fn new(author: &str, local: impl fmt::Display) -> Self {
        debug_assert!(
            validate_username(author).is_ok(),
            "post id author {author:?} is not a valid username"
        );
        Self(format!("{author}{POST_ID_SEPARATOR}{local}"))
    }

    /// Parse and validate an id received from a caller.
    pub fn parse(raw: &str) -> Result<Self, ModelError> {
        let Some((author, local)) = raw.split_once(POST_ID_SEPARATOR) else {
            return Err(ModelError::InvalidPostId(
                raw.to_string(),
                "missing author separator",
            ));
        };
        if validate_username(author).is_err() {
            return Err(ModelError::InvalidPostId(raw.to_string(), "invalid author"));
        }
        if local.is_empty() || local.contains(POST_ID_SEPARATOR) {
            return Err(ModelError::InvalidPostId(raw.to_string(), "invalid local part"));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The owning author.
    pub fn author(&self) -> &str {
        self.split().0
    }

    /// The engine-assigned part after the author.
    pub fn local_part(&self) -> &str {
        self.split().1
    }

    fn split(&self) -> (&str, &str) {
        self.0
            .split_once(POST_ID_SEPARATOR)
            .unwrap_or((self.0.as_str(), ""))
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PostId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PostId {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PostId> for String {
    fn from(id: PostId) -> Self {
        id.0
    }
}

/// Creation draft. Authorship and timestamp are stamped by the post service;
/// the id is assigned by the storage engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPost {
    pub author: String,
    pub content: String,
    pub posted_at: DateTime<Utc>,
}

impl NewPost {
    pub fn new(author: impl Into<String>, content: impl Into<String>, posted_at: DateTime<Utc>) -> Self {
        Self {
            author: author.into(),
            content: content.into(),
            posted_at,
        }
    }

    pub fn into_post(self, id: PostId) -> Post {
        Post {
            id,
            author: self.author,
            content: self.content,
            posted_at: self.posted_at,
        }
    }
}

/// A stored post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub author: String,
    pub content: String,
    pub posted_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn post_id_exposes_author() {
        let id = PostId::new("alice", 42);
        assert_eq!(id.as_str(), "alice/42");
        assert_eq!(id.author(), "alice");
        assert_eq!(id.local_part(), "42");
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "not a valid username")]
    fn new_rejects_author_with_separator() {
        let _ = PostId::new("a/b", 1);
    }

    #[test]
    fn malformed_ids_are_rejected() {
        assert!(PostId::parse("alice").is_err());
        assert!(PostId::parse("/42").is_err());
        assert!(PostId::parse("alice/").is_err());
        assert!(PostId::parse("alice/4/2").is_err());
        assert!(PostId::parse("alice/0b4c").is_ok());
    }

    #[test]
    fn post_id_serializes_as_plain_string() {
        let id = PostId::new("bob", "abc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"bob/abc\"");
        let back: PostId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<PostId>("\"nope\"").is_err());
    }

    proptest! {
        #[test]
        fn composed_ids_parse_back(author in "[a-z0-9_.-]{1,32}", local in "[a-f0-9-]{1,36}") {
            let id = PostId::new(&author, &local);
            let parsed = PostId::parse(id.as_str()).unwrap();
            prop_assert_eq!(parsed.author(), author.as_str());
            prop_assert_eq!(parsed.local_part(), local.as_str());
        }
    }
}
