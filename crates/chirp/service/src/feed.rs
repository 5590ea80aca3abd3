//! Feed aggregation: fan out one `list_by_author` per followed author,
//! drop the contributors that fail or miss the deadline, and merge the rest
//! into one feed ordered by `posted_at`.

use chirp_storage::{Storage, StorageError};
use chirp_types::Post;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Aggregator settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Overall budget for one aggregation. Contributors still running when
    /// it expires are dropped. `None` waits for every contributor.
    #[serde(rename = "deadline_ms", default, with = "duration_ms")]
    pub deadline: Option<Duration>,
}

impl FeedConfig {
    pub fn with_deadline(deadline: Duration) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        value
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

/// What happened to one followed author's contribution.
#[derive(Debug)]
pub enum ContributorOutcome {
    Fetched { author: String, posts: Vec<Post> },
    Failed { author: String, error: StorageError },
    TimedOut { author: String },
}

impl ContributorOutcome {
    pub fn author(&self) -> &str {
        match self {
            Self::Fetched { author, .. } | Self::Failed { author, .. } | Self::TimedOut { author } => {
                author
            }
        }
    }

    pub fn is_dropped(&self) -> bool {
        !matches!(self, Self::Fetched { .. })
    }
}

/// Aggregated feed plus the contributors left out of it.
#[derive(Debug, Default)]
pub struct FeedReport {
    /// Ascending by `posted_at`.
    pub posts: Vec<Post>,
    /// Only `Failed` and `TimedOut` outcomes.
    pub dropped: Vec<ContributorOutcome>,
}

impl FeedReport {
    pub fn is_complete(&self) -> bool {
        self.dropped.is_empty()
    }

    pub fn dropped_authors(&self) -> Vec<&str> {
        self.dropped.iter().map(ContributorOutcome::author).collect()
    }
}

pub struct FeedAggregator {
    storage: Arc<dyn Storage>,
    config: FeedConfig,
}

impl FeedAggregator {
    pub fn new(storage: Arc<dyn Storage>, config: FeedConfig) -> Self {
        Self { storage, config }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Fetch every author's posts concurrently and merge them.
    ///
    /// Never fails as a whole: a contributor that errors or is still running
    /// at the deadline is logged and reported in [`FeedReport::dropped`].
    /// Duplicate authors are fetched once.
    pub async fn aggregate<I, S>(&self, authors: I) -> FeedReport
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut outstanding: BTreeSet<String> = authors.into_iter().map(Into::into).collect();
        if outstanding.is_empty() {
            return FeedReport::default();
        }

        let mut tasks = JoinSet::new();
        for author in &outstanding {
            let storage = Arc::clone(&self.storage);
            let author = author.clone();
            tasks.spawn(async move {
                match storage.posts().list_by_author(&author).await {
                    Ok(posts) => ContributorOutcome::Fetched { author, posts },
                    Err(error) => ContributorOutcome::Failed { author, error },
                }
            });
        }
        debug!(contributors = outstanding.len(), "feed fan-out started");

        let deadline = self.config.deadline.map(|budget| Instant::now() + budget);
        let mut fetched: BTreeMap<String, Vec<Post>> = BTreeMap::new();
        let mut dropped = Vec::new();
        let mut timed_out = false;

        loop {
            let next = match deadline {
                Some(at) => match tokio::time::timeout_at(at, tasks.join_next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        timed_out = true;
                        break;
                    }
                },
                None => tasks.join_next().await,
            };
            let Some(joined) = next else {
                break;
            };
            match joined {
                Ok(outcome) => {
                    outstanding.remove(outcome.author());
                    match outcome {
                        ContributorOutcome::Fetched { author, posts } => {
                            fetched.insert(author, posts);
                        }
                        other => dropped.push(other),
                    }
                }
                // Attributed below: its author stays in `outstanding`.
                Err(err) => warn!(error = %err, "feed contributor task did not complete"),
            }
        }

        if timed_out {
            tasks.abort_all();
        }
        for author in outstanding {
            dropped.push(if timed_out {
                ContributorOutcome::TimedOut { author }
            } else {
                ContributorOutcome::Failed {
                    author,
                    error: StorageError::Unavailable("feed fetch task aborted".to_string()),
                }
            });
        }

        for outcome in &dropped {
            match outcome {
                ContributorOutcome::Failed { author, error } => {
                    warn!(author = %author, error = %error, "dropping feed contributor")
                }
                ContributorOutcome::TimedOut { author } => {
                    warn!(author = %author, "dropping feed contributor past deadline")
                }
                ContributorOutcome::Fetched { .. } => {}
            }
        }

        let mut posts: Vec<Post> = fetched.into_values().flatten().collect();
        posts.sort_by_key(|post| post.posted_at);
        debug!(posts = posts.len(), dropped = dropped.len(), "feed aggregated");
        FeedReport { posts, dropped }
    }
}
