use async_trait::async_trait;
use chirp_service::{
    Auth, AuthError, ContributorOutcome, FeedConfig, PostService, ServiceError, UserService,
};
use chirp_storage::{
    open_storage_with_kv, BackendKind, DistributedConfig, InMemoryStorage, InProcessKv,
    PostRepository, Storage, StorageError, StorageResult, UserRepository,
};
use chirp_types::{NewPost, Post, PostId};
use chrono::{TimeZone, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Reversible stand-in for a real hashing/token scheme.
struct FakeAuth;

impl Auth for FakeAuth {
    fn hash(&self, secret: &str) -> Result<String, AuthError> {
        Ok(format!("hashed:{secret}"))
    }

    fn verify(&self, digest: &str, secret: &str) -> bool {
        digest.strip_prefix("hashed:") == Some(secret)
    }

    fn issue_token(&self, username: &str) -> Result<String, AuthError> {
        Ok(format!("token:{username}"))
    }

    fn verify_token(&self, token: &str) -> Result<String, AuthError> {
        token
            .strip_prefix("token:")
            .map(str::to_string)
            .ok_or_else(|| AuthError::InvalidToken(token.to_string()))
    }
}

/// Post repository that fails or stalls `list_by_author` for chosen authors.
struct FaultyPosts {
    inner: Arc<dyn Storage>,
    failing: BTreeSet<String>,
    slow: BTreeMap<String, Duration>,
}

#[async_trait]
impl PostRepository for FaultyPosts {
    async fn create(&self, post: NewPost) -> StorageResult<Post> {
        self.inner.posts().create(post).await
    }

    async fn delete(&self, id: &PostId) -> StorageResult<()> {
        self.inner.posts().delete(id).await
    }

    async fn list_by_author(&self, author: &str) -> StorageResult<Vec<Post>> {
        if self.failing.contains(author) {
            return Err(StorageError::Unavailable(format!("injected fault for {author}")));
        }
        if let Some(delay) = self.slow.get(author) {
            tokio::time::sleep(*delay).await;
        }
        self.inner.posts().list_by_author(author).await
    }

    async fn get_by_id(&self, id: &PostId) -> StorageResult<Post> {
        self.inner.posts().get_by_id(id).await
    }
}

struct FaultyStorage {
    inner: Arc<dyn Storage>,
    posts: FaultyPosts,
}

impl FaultyStorage {
    fn new(inner: Arc<dyn Storage>) -> Self {
        Self {
            posts: FaultyPosts {
                inner: Arc::clone(&inner),
                failing: BTreeSet::new(),
                slow: BTreeMap::new(),
            },
            inner,
        }
    }

    fn failing(mut self, author: &str) -> Self {
        self.posts.failing.insert(author.to_string());
        self
    }

    fn slow(mut self, author: &str, delay: Duration) -> Self {
        self.posts.slow.insert(author.to_string(), delay);
        self
    }
}

#[async_trait]
impl Storage for FaultyStorage {
    fn users(&self) -> &dyn UserRepository {
        self.inner.users()
    }

    fn posts(&self) -> &dyn PostRepository {
        &self.posts
    }

    fn backend(&self) -> BackendKind {
        self.inner.backend()
    }

    async fn close(&self) -> StorageResult<()> {
        self.inner.close().await
    }
}

fn engines() -> Vec<Arc<dyn Storage>> {
    let config = DistributedConfig {
        install_shutdown_hook: false,
        ..DistributedConfig::default()
    };
    vec![
        Arc::new(InMemoryStorage::new()) as Arc<dyn Storage>,
        open_storage_with_kv(&config, Arc::new(InProcessKv::new())),
    ]
}

/// u1 posted at t=2 and t=5, u2 at t=1 and t=3.
async fn seed_timeline(storage: &dyn Storage) {
    for (author, secs) in [("u1", 2), ("u1", 5), ("u2", 1), ("u2", 3)] {
        let posted_at = Utc.timestamp_opt(secs, 0).unwrap();
        storage
            .posts()
            .create(NewPost::new(author, format!("{author} at {secs}"), posted_at))
            .await
            .expect("seed post");
    }
}

fn seconds(posts: &[Post]) -> Vec<i64> {
    posts.iter().map(|post| post.posted_at.timestamp()).collect()
}

#[tokio::test]
async fn feed_merges_authors_in_time_order() {
    init_tracing();
    for storage in engines() {
        seed_timeline(storage.as_ref()).await;
        let posts = PostService::new(Arc::clone(&storage), FeedConfig::default());

        let report = posts.feed(["u1", "u2"]).await;
        assert_eq!(seconds(&report.posts), vec![1, 2, 3, 5], "{}", storage.backend());
        assert!(report.is_complete());
    }
}

#[tokio::test]
async fn failed_contributor_is_dropped_and_reported() {
    init_tracing();
    for inner in engines() {
        seed_timeline(inner.as_ref()).await;
        let storage: Arc<dyn Storage> = Arc::new(FaultyStorage::new(inner).failing("u2"));
        let posts = PostService::new(storage, FeedConfig::default());

        let report = posts.feed(["u1", "u2"]).await;
        assert_eq!(seconds(&report.posts), vec![2, 5]);
        assert_eq!(report.dropped_authors(), vec!["u2"]);
        assert!(matches!(
            &report.dropped[0],
            ContributorOutcome::Failed { error, .. } if error.is_retryable()
        ));
    }
}

#[tokio::test]
async fn deadline_returns_completed_subset() {
    init_tracing();
    let inner: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    seed_timeline(inner.as_ref()).await;
    let storage: Arc<dyn Storage> =
        Arc::new(FaultyStorage::new(inner).slow("u2", Duration::from_secs(30)));
    let posts = PostService::new(
        storage,
        FeedConfig::with_deadline(Duration::from_millis(200)),
    );

    let started = tokio::time::Instant::now();
    let report = posts.feed(["u1", "u2"]).await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(seconds(&report.posts), vec![2, 5]);
    assert!(matches!(
        &report.dropped[..],
        [ContributorOutcome::TimedOut { author }] if author == "u2"
    ));
}

#[tokio::test]
async fn every_contributor_failing_still_yields_empty_feed() {
    let inner: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    seed_timeline(inner.as_ref()).await;
    let storage: Arc<dyn Storage> =
        Arc::new(FaultyStorage::new(inner).failing("u1").failing("u2"));
    let posts = PostService::new(storage, FeedConfig::default());

    let report = posts.feed(["u1", "u2"]).await;
    assert!(report.posts.is_empty());
    assert_eq!(report.dropped.len(), 2);
}

#[tokio::test]
async fn feed_for_follows_the_users_graph() {
    init_tracing();
    for storage in engines() {
        let users = UserService::new(Arc::clone(&storage), Arc::new(FakeAuth));
        let posts = PostService::new(Arc::clone(&storage), FeedConfig::default());
        for name in ["alice", "bob", "carol", "dave"] {
            users.register(name, "pw", None).await.expect("register");
        }
        users.follow("alice", "bob").await.expect("follow");
        users.follow("alice", "carol").await.expect("follow");

        let first = posts.create("carol", "one").await.expect("post");
        let second = posts.create("bob", "two").await.expect("post");
        posts.create("dave", "not followed").await.expect("post");
        let third = posts.create("carol", "three").await.expect("post");

        let report = posts.feed_for("alice").await.expect("feed");
        assert_eq!(report.posts, vec![first, second, third], "{}", storage.backend());

        users.unfollow("alice", "carol").await.expect("unfollow");
        let report = posts.feed_for("alice").await.expect("feed");
        assert_eq!(report.posts.len(), 1);
        assert_eq!(report.posts[0].author, "bob");

        let empty = posts.feed_for("dave").await.expect("feed");
        assert!(empty.posts.is_empty());
        assert!(posts.feed_for("nobody").await.expect_err("unknown").is_not_found());
    }
}

#[tokio::test]
async fn post_service_stamps_and_deletes() {
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let posts = PostService::new(storage, FeedConfig::default());

    let a = posts.create("alice", "first").await.expect("post");
    let b = posts.create("alice", "second").await.expect("post");
    assert_eq!(a.author, "alice");
    assert!(b.posted_at > a.posted_at);

    assert_eq!(posts.get(&a.id).await.expect("get"), a);
    assert_eq!(posts.list_by_author("alice").await.expect("list"), vec![a.clone(), b.clone()]);

    posts.delete(&a.id).await.expect("delete");
    assert!(posts.get(&a.id).await.expect_err("deleted").is_not_found());
    assert_eq!(posts.list_by_author("alice").await.expect("list"), vec![b]);
}

#[tokio::test]
async fn register_login_and_authenticate() {
    for storage in engines() {
        let users = UserService::new(storage, Arc::new(FakeAuth));

        let alice = users
            .register("alice", "s3cret", Some("alice@example.com".to_string()))
            .await
            .expect("register");
        assert_eq!(alice.password_digest, "hashed:s3cret");

        let err = users
            .register("alice", "other", None)
            .await
            .expect_err("duplicate");
        assert!(matches!(err, ServiceError::Storage(StorageError::AlreadyExists(_))));

        let token = users.login("alice", "s3cret").await.expect("login");
        let current = users.authenticate(&token).await.expect("authenticate");
        assert_eq!(current.username, "alice");
        assert_eq!(current.email.as_deref(), Some("alice@example.com"));

        for (name, password) in [("alice", "wrong"), ("nobody", "s3cret")] {
            let err = users.login(name, password).await.expect_err("rejected");
            assert!(matches!(err, ServiceError::Auth(AuthError::InvalidCredentials)));
        }

        let err = users.authenticate("garbage").await.expect_err("bad token");
        assert!(matches!(err, ServiceError::Unauthenticated(_)));
        let err = users
            .authenticate("token:ghost")
            .await
            .expect_err("unknown subject");
        assert!(matches!(err, ServiceError::Unauthenticated(_)));
    }
}

#[tokio::test]
async fn profile_update_rehashes_password_only_when_given() {
    for storage in engines() {
        let users = UserService::new(storage, Arc::new(FakeAuth));
        users
            .register("alice", "old", Some("a@example.com".to_string()))
            .await
            .expect("register");

        let updated = users
            .update_profile("alice", Some("new@example.com"), None)
            .await
            .expect("update email");
        assert_eq!(updated.email.as_deref(), Some("new@example.com"));
        assert_eq!(updated.password_digest, "hashed:old");

        let updated = users
            .update_profile("alice", Some(""), Some("new"))
            .await
            .expect("update password");
        assert_eq!(updated.email.as_deref(), Some("new@example.com"));
        assert_eq!(updated.password_digest, "hashed:new");

        users.login("alice", "new").await.expect("new password works");
        assert!(users.login("alice", "old").await.is_err());

        let err = users
            .update_profile("ghost", Some("x@example.com"), None)
            .await
            .expect_err("missing user");
        assert!(err.is_not_found());
    }
}
