use super::locked_map::{read_entry, write_entry, Entry, LockedMap};
use crate::latch::CloseLatch;
use crate::traits::PostRepository;
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chirp_types::{validate_username, NewPost, Post, PostId};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

const BUCKET_LOCK: &str = "post bucket";

/// One author's posts, keyed by the engine sequence number.
type Bucket = BTreeMap<u64, Post>;

pub(crate) struct MemoryPosts {
    buckets: LockedMap<String, Bucket>,
    last_seq: AtomicU64,
    latch: Arc<CloseLatch>,
}

impl MemoryPosts {
    pub(crate) fn new(latch: Arc<CloseLatch>) -> Self {
        Self {
            buckets: LockedMap::new("posts"),
            last_seq: AtomicU64::new(0),
            latch,
        }
    }

    /// Locate the bucket and sequence an id points at. Ids this engine could
    /// not have issued are reported as missing.
    fn locate(&self, id: &PostId) -> StorageResult<(Entry<Bucket>, u64)> {
        self.latch.ensure_open()?;
        // Only the canonical spelling is an issued id: `01` or `+1` are not `1`.
        let seq = id
            .local_part()
            .parse::<u64>()
            .ok()
            .filter(|seq| seq.to_string() == id.local_part())
            .ok_or_else(|| StorageError::post_not_found(id))?;
        let bucket = self
            .buckets
            .get(id.author())?
            .ok_or_else(|| StorageError::post_not_found(id))?;
        Ok((bucket, seq))
    }
}

#[async_trait]
impl PostRepository for MemoryPosts {
    async fn create(&self, post: NewPost) -> StorageResult<Post> {
        self.latch.ensure_open()?;
        validate_username(&post.author)?;

        let seq = self.last_seq.fetch_add(1, Ordering::AcqRel) + 1;
        let bucket = self
            .buckets
            .get_or_insert_with(post.author.clone(), Bucket::new)?;

        let id = PostId::new(&post.author, seq);
        let stored = post.into_post(id);
        write_entry(&bucket, BUCKET_LOCK)?.insert(seq, stored.clone());
        debug!(post_id = %stored.id, "post created");
        Ok(stored)
    }

    async fn delete(&self, id: &PostId) -> StorageResult<()> {
        let (bucket, seq) = self.locate(id)?;
        let removed = write_entry(&bucket, BUCKET_LOCK)?.remove(&seq);
        match removed {
            Some(_) => {
                debug!(post_id = %id, "post deleted");
                Ok(())
            }
            None => Err(StorageError::post_not_found(id)),
        }
    }

    async fn list_by_author(&self, author: &str) -> StorageResult<Vec<Post>> {
        self.latch.ensure_open()?;
        validate_username(author)?;

        let Some(bucket) = self.buckets.get(author)? else {
            return Ok(Vec::new());
        };
        let guard = read_entry(&bucket, BUCKET_LOCK)?;
        Ok(guard.values().cloned().collect())
    }

    async fn get_by_id(&self, id: &PostId) -> StorageResult<Post> {
        let (bucket, seq) = self.locate(id)?;
        let guard = read_entry(&bucket, BUCKET_LOCK)?;
        guard
            .get(&seq)
            .cloned()
            .ok_or_else(|| StorageError::post_not_found(id))
    }
}
