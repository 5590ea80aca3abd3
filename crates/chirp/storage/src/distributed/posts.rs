use super::codec::{decode_post, encode_post};
use super::keys::KeySpace;
use super::kv::KvStore;
use crate::traits::PostRepository;
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chirp_types::{validate_username, NewPost, Post, PostId};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::debug;
use uuid::Uuid;

pub(crate) struct DistributedPosts {
    kv: Arc<dyn KvStore>,
    keys: KeySpace,
}

impl DistributedPosts {
    pub(crate) fn new(kv: Arc<dyn KvStore>, keys: KeySpace) -> Self {
        Self { kv, keys }
    }
}

#[async_trait]
impl PostRepository for DistributedPosts {
    async fn create(&self, post: NewPost) -> StorageResult<Post> {
        validate_username(&post.author)?;

        // A random suffix keeps ids unique across authors and engine
        // instances without any coordination.
        let id = PostId::new(&post.author, Uuid::new_v4());
        let stored = post.into_post(id);
        self.kv
            .put(&self.keys.post(&stored.id), encode_post(&stored))
            .await?;
        debug!(post_id = %stored.id, "post created");
        Ok(stored)
    }

    async fn delete(&self, id: &PostId) -> StorageResult<()> {
        if self.kv.delete(&self.keys.post(id)).await? == 0 {
            return Err(StorageError::post_not_found(id));
        }
        debug!(post_id = %id, "post deleted");
        Ok(())
    }

    async fn list_by_author(&self, author: &str) -> StorageResult<Vec<Post>> {
        validate_username(author)?;

        let pairs = self.kv.scan_prefix(&self.keys.posts_prefix(author)).await?;
        let expected = pairs.len();

        let mut decoders = JoinSet::new();
        for pair in pairs {
            decoders.spawn(async move { decode_post(&pair.value) });
        }

        let mut posts = Vec::with_capacity(expected);
        while let Some(joined) = decoders.join_next().await {
            let post = joined
                .map_err(|e| StorageError::Unavailable(format!("post decode task failed: {e}")))??;
            posts.push(post);
        }
        debug_assert_eq!(posts.len(), expected);
        Ok(posts)
    }

    async fn get_by_id(&self, id: &PostId) -> StorageResult<Post> {
        let raw = self
            .kv
            .get(&self.keys.post(id))
            .await?
            .ok_or_else(|| StorageError::post_not_found(id))?;
        decode_post(&raw)
    }
}
