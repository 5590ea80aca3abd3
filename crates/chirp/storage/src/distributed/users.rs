use super::codec::{decode_user, encode_user};
use super::keys::{peer_from_key, KeySpace};
use super::kv::{KvCompare, KvOp, KvStore, KvTxn};
use crate::traits::UserRepository;
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chirp_types::{validate_username, User, UserUpdate};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Attempts at a guarded write before giving up with `Conflict`.
const MAX_TXN_ATTEMPTS: usize = 8;

pub(crate) struct DistributedUsers {
    kv: Arc<dyn KvStore>,
    keys: KeySpace,
}

impl DistributedUsers {
    pub(crate) fn new(kv: Arc<dyn KvStore>, keys: KeySpace) -> Self {
        Self { kv, keys }
    }

    async fn scan_peers(&self, prefix: String) -> StorageResult<BTreeSet<String>> {
        let keys = self.kv.scan_keys(&prefix).await?;
        Ok(keys
            .iter()
            .filter_map(|key| peer_from_key(&prefix, key))
            .map(str::to_string)
            .collect())
    }

    /// Fill both edge sets from their prefix scans.
    async fn load_edges(&self, user: &mut User) -> StorageResult<()> {
        let (follows, followers) = tokio::try_join!(
            self.scan_peers(self.keys.follows_prefix(&user.username)),
            self.scan_peers(self.keys.followers_prefix(&user.username)),
        )?;
        user.follows = follows;
        user.followers = followers;
        Ok(())
    }

    fn check_edge(follower: &str, followee: &str) -> StorageResult<()> {
        validate_username(follower)?;
        validate_username(followee)?;
        if follower == followee {
            return Err(StorageError::InvalidInput(format!(
                "user {follower} cannot follow themselves"
            )));
        }
        Ok(())
    }

    /// Commit an edge mutation guarded by both user records existing. Both
    /// edge keys change together or not at all.
    async fn commit_edge(
        &self,
        follower: &str,
        followee: &str,
        ops: Vec<KvOp>,
    ) -> StorageResult<()> {
        let follower_key = self.keys.user(follower);
        let followee_key = self.keys.user(followee);

        for _ in 0..MAX_TXN_ATTEMPTS {
            let txn = KvTxn {
                when: vec![
                    KvCompare::Exists(follower_key.clone()),
                    KvCompare::Exists(followee_key.clone()),
                ],
                then: ops.clone(),
            };
            if self.kv.commit(txn).await? {
                return Ok(());
            }
            // Accounts are never deleted, so a failed guard means one of them
            // was missing; unless it registered in the meantime, report it.
            if self.kv.get(&follower_key).await?.is_none() {
                return Err(StorageError::user_not_found(follower));
            }
            if self.kv.get(&followee_key).await?.is_none() {
                return Err(StorageError::user_not_found(followee));
            }
        }
        Err(StorageError::Conflict(format!(
            "edge {follower} -> {followee} kept losing its guard"
        )))
    }
}

#[async_trait]
impl UserRepository for DistributedUsers {
    async fn add(&self, user: User) -> StorageResult<User> {
        validate_username(&user.username)?;

        let user = user.without_edges();
        let key = self.keys.user(&user.username);
        let txn = KvTxn::new()
            .when(KvCompare::Missing(key.clone()))
            .then(KvOp::put(key, encode_user(&user)));
        if !self.kv.commit(txn).await? {
            return Err(StorageError::AlreadyExists(format!("user {}", user.username)));
        }
        debug!(username = %user.username, "user added");
        Ok(user)
    }

    async fn get(&self, username: &str) -> StorageResult<User> {
        validate_username(username)?;

        let raw = self
            .kv
            .get(&self.keys.user(username))
            .await?
            .ok_or_else(|| StorageError::user_not_found(username))?;
        let mut user = decode_user(&raw)?;
        self.load_edges(&mut user).await?;
        Ok(user)
    }

    async fn update(&self, update: UserUpdate) -> StorageResult<User> {
        validate_username(&update.username)?;
        let key = self.keys.user(&update.username);

        for attempt in 1..=MAX_TXN_ATTEMPTS {
            let raw = self
                .kv
                .get(&key)
                .await?
                .ok_or_else(|| StorageError::user_not_found(&update.username))?;
            let mut user = decode_user(&raw)?;
            user.apply(&update);

            let txn = KvTxn::new()
                .when(KvCompare::ValueEquals(key.clone(), raw))
                .then(KvOp::put(key.clone(), encode_user(&user)));
            if self.kv.commit(txn).await? {
                self.load_edges(&mut user).await?;
                return Ok(user);
            }
            warn!(
                username = %update.username,
                attempt,
                "user record changed during update, retrying"
            );
        }
        Err(StorageError::Conflict(format!(
            "user {} changed concurrently on every attempt",
            update.username
        )))
    }

    async fn follow(&self, follower: &str, followee: &str) -> StorageResult<()> {
        Self::check_edge(follower, followee)?;
        let ops = vec![
            KvOp::put(self.keys.follow_edge(follower, followee), Vec::new()),
            KvOp::put(self.keys.follower_edge(followee, follower), Vec::new()),
        ];
        self.commit_edge(follower, followee, ops).await?;
        debug!(follower, followee, "follow edge added");
        Ok(())
    }

    async fn unfollow(&self, follower: &str, followee: &str) -> StorageResult<()> {
        Self::check_edge(follower, followee)?;
        let ops = vec![
            KvOp::delete(self.keys.follow_edge(follower, followee)),
            KvOp::delete(self.keys.follower_edge(followee, follower)),
        ];
        self.commit_edge(follower, followee, ops).await?;
        debug!(follower, followee, "follow edge removed");
        Ok(())
    }
}
