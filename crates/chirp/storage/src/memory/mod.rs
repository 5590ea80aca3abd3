//! Process-local engine.
//!
//! Every collection is a [`LockedMap`](locked_map::LockedMap): a short-lived
//! lock over the key set, then one lock per user (or per author's post
//! bucket) for the actual read or write. Operations spanning two users lock
//! them in username order. Callers always receive clones.

mod locked_map;
mod posts;
mod users;

use crate::latch::CloseLatch;
use crate::traits::{BackendKind, PostRepository, Storage, UserRepository};
use crate::StorageResult;
use async_trait::async_trait;
use posts::MemoryPosts;
use std::sync::Arc;
use tracing::info;
use users::MemoryUsers;

/// In-memory storage engine.
pub struct InMemoryStorage {
    users: MemoryUsers,
    posts: MemoryPosts,
    latch: Arc<CloseLatch>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        let latch = Arc::new(CloseLatch::new());
        Self {
            users: MemoryUsers::new(Arc::clone(&latch)),
            posts: MemoryPosts::new(Arc::clone(&latch)),
            latch,
        }
    }

    /// Number of registered users.
    pub fn user_count(&self) -> StorageResult<usize> {
        self.users.len()
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    fn users(&self) -> &dyn UserRepository {
        &self.users
    }

    fn posts(&self) -> &dyn PostRepository {
        &self.posts
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn close(&self) -> StorageResult<()> {
        if self.latch.close() {
            info!("in-memory storage closed");
        }
        Ok(())
    }
}
