use crate::StorageResult;
use async_trait::async_trait;
use chirp_types::{NewPost, Post, PostId, User, UserUpdate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which engine satisfies the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Memory,
    Distributed,
}

impl BackendKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Distributed => "distributed",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Storage interface for accounts and the follow graph.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Register a new account. Any edge sets on the input are ignored; a new
    /// account starts with an empty follow graph.
    async fn add(&self, user: User) -> StorageResult<User>;

    /// Fetch an account with `follows` and `followers` fully populated.
    async fn get(&self, username: &str) -> StorageResult<User>;

    /// Apply a sparse update and return the resulting account.
    async fn update(&self, update: UserUpdate) -> StorageResult<User>;

    /// Record that `follower` follows `followee`, in both directions.
    async fn follow(&self, follower: &str, followee: &str) -> StorageResult<()>;

    /// Remove the edge `follower -> followee`. Removing a missing edge succeeds.
    async fn unfollow(&self, follower: &str, followee: &str) -> StorageResult<()>;
}

/// Storage interface for authored posts.
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Persist a draft and return it with its assigned id.
    async fn create(&self, post: NewPost) -> StorageResult<Post>;

    async fn delete(&self, id: &PostId) -> StorageResult<()>;

    /// Every post by `author`, in no particular order. Empty if none.
    async fn list_by_author(&self, author: &str) -> StorageResult<Vec<Post>>;

    async fn get_by_id(&self, id: &PostId) -> StorageResult<Post>;
}

/// A configured engine: both repositories plus resource release.
#[async_trait]
pub trait Storage: Send + Sync {
    fn users(&self) -> &dyn UserRepository;

    fn posts(&self) -> &dyn PostRepository;

    fn backend(&self) -> BackendKind;

    /// Release engine resources. Safe to call more than once and while
    /// requests are in flight; those requests fail with `Closed`.
    async fn close(&self) -> StorageResult<()>;
}
