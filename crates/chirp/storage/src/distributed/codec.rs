//! Protobuf records stored as values. Edge sets are not part of the user
//! record; they live in their own keys.

use crate::{StorageError, StorageResult};
use chirp_types::{Post, PostId, User};
use chrono::DateTime;
use prost::Message;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UserRecord {
    #[prost(string, tag = "1")]
    pub username: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub password_digest: ::prost::alloc::string::String,
    #[prost(string, optional, tag = "3")]
    pub email: ::core::option::Option<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PostRecord {
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub author: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub content: ::prost::alloc::string::String,
    #[prost(int64, tag = "4")]
    pub posted_at_micros: i64,
}

pub fn encode_user(user: &User) -> Vec<u8> {
    UserRecord {
        username: user.username.clone(),
        password_digest: user.password_digest.clone(),
        email: user.email.clone(),
    }
    .encode_to_vec()
}

/// Decoded user with empty edge sets.
pub fn decode_user(bytes: &[u8]) -> StorageResult<User> {
    let record = UserRecord::decode(bytes)?;
    let mut user = User::new(record.username, record.password_digest);
    user.email = record.email;
    Ok(user)
}

pub fn encode_post(post: &Post) -> Vec<u8> {
    PostRecord {
        id: post.id.to_string(),
        author: post.author.clone(),
        content: post.content.clone(),
        posted_at_micros: post.posted_at.timestamp_micros(),
    }
    .encode_to_vec()
}

pub fn decode_post(bytes: &[u8]) -> StorageResult<Post> {
    let record = PostRecord::decode(bytes)?;
    let id = PostId::parse(&record.id)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    let posted_at = DateTime::from_timestamp_micros(record.posted_at_micros).ok_or_else(|| {
        StorageError::Serialization(format!(
            "post {} has out-of-range timestamp {}",
            record.id, record.posted_at_micros
        ))
    })?;
    Ok(Post {
        id,
        author: record.author,
        content: record.content,
        posted_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn user_record_drops_edges() {
        let mut user = User::new("alice", "digest").with_email("a@example.com");
        user.follows.insert("bob".to_string());

        let decoded = decode_user(&encode_user(&user)).unwrap();
        assert_eq!(decoded, user.without_edges());
    }

    #[test]
    fn post_timestamp_keeps_microseconds() {
        let posted_at = Utc.timestamp_opt(1_700_000_000, 123_456_000).unwrap();
        let post = Post {
            id: PostId::new("alice", "abc"),
            author: "alice".to_string(),
            content: "hello".to_string(),
            posted_at,
        };
        assert_eq!(decode_post(&encode_post(&post)).unwrap(), post);
    }

    #[test]
    fn garbage_is_a_serialization_error() {
        let err = decode_post(&[0xff, 0xff, 0xff]).unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));

        let bad_id = PostRecord {
            id: "no-separator".to_string(),
            ..PostRecord::default()
        }
        .encode_to_vec();
        assert!(matches!(
            decode_post(&bad_id),
            Err(StorageError::Serialization(_))
        ));
    }
}
