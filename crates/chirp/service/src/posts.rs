use crate::clock::MonotonicClock;
use crate::error::ServiceResult;
use crate::feed::{FeedAggregator, FeedConfig, FeedReport};
use chirp_storage::Storage;
use chirp_types::{NewPost, Post, PostId};
use std::sync::Arc;
use tracing::{debug, info};

/// Post operations. Authorship and timestamps are stamped here; the engine
/// only assigns ids.
pub struct PostService {
    storage: Arc<dyn Storage>,
    feed: FeedAggregator,
    clock: MonotonicClock,
}

impl PostService {
    pub fn new(storage: Arc<dyn Storage>, feed_config: FeedConfig) -> Self {
        Self {
            feed: FeedAggregator::new(Arc::clone(&storage), feed_config),
            storage,
            clock: MonotonicClock::new(),
        }
    }

    pub async fn create(&self, author: &str, content: impl Into<String>) -> ServiceResult<Post> {
        let draft = NewPost::new(author, content, self.clock.now());
        let post = self.storage.posts().create(draft).await?;
        info!(post_id = %post.id, author = %post.author, "post published");
        Ok(post)
    }

    pub async fn get(&self, id: &PostId) -> ServiceResult<Post> {
        Ok(self.storage.posts().get_by_id(id).await?)
    }

    pub async fn delete(&self, id: &PostId) -> ServiceResult<()> {
        self.storage.posts().delete(id).await?;
        info!(post_id = %id, "post deleted");
        Ok(())
    }

    /// All of `author`'s posts, oldest first.
    pub async fn list_by_author(&self, author: &str) -> ServiceResult<Vec<Post>> {
        let mut posts = self.storage.posts().list_by_author(author).await?;
        posts.sort_by_key(|post| post.posted_at);
        Ok(posts)
    }

    /// Merged feed of the given authors.
    pub async fn feed<I, S>(&self, following: I) -> FeedReport
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.feed.aggregate(following).await
    }

    /// Feed of everyone `username` currently follows.
    pub async fn feed_for(&self, username: &str) -> ServiceResult<FeedReport> {
        let user = self.storage.users().get(username).await?;
        debug!(username = %username, following = user.follows.len(), "building feed");
        Ok(self.feed.aggregate(user.follows).await)
    }
}
