use super::locked_map::{read_entry, write_entry, Entry, LockedMap};
use crate::latch::CloseLatch;
use crate::traits::UserRepository;
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chirp_types::{validate_username, User, UserUpdate};
use std::sync::{Arc, RwLockWriteGuard};
use tracing::debug;

const USER_LOCK: &str = "user";

pub(crate) struct MemoryUsers {
    users: LockedMap<String, User>,
    latch: Arc<CloseLatch>,
}

impl MemoryUsers {
    pub(crate) fn new(latch: Arc<CloseLatch>) -> Self {
        Self {
            users: LockedMap::new("users"),
            latch,
        }
    }

    pub(crate) fn len(&self) -> StorageResult<usize> {
        self.users.len()
    }

    fn entry(&self, username: &str) -> StorageResult<Entry<User>> {
        self.users
            .get(username)?
            .ok_or_else(|| StorageError::user_not_found(username))
    }

    /// Resolve both endpoints of an edge, collection lock released on return.
    fn edge_entries(
        &self,
        follower: &str,
        followee: &str,
    ) -> StorageResult<(Entry<User>, Entry<User>)> {
        self.latch.ensure_open()?;
        validate_username(follower)?;
        validate_username(followee)?;
        if follower == followee {
            return Err(StorageError::InvalidInput(format!(
                "user {follower} cannot follow themselves"
            )));
        }
        Ok((self.entry(follower)?, self.entry(followee)?))
    }
}

/// Write-lock two distinct users, always in lexicographic username order so
/// concurrent cross-updates (a->b while b->a) cannot deadlock. Guards come
/// back in argument order.
fn lock_pair<'a>(
    a: &str,
    a_entry: &'a Entry<User>,
    b: &str,
    b_entry: &'a Entry<User>,
) -> StorageResult<(RwLockWriteGuard<'a, User>, RwLockWriteGuard<'a, User>)> {
    if a < b {
        let a_guard = write_entry(a_entry, USER_LOCK)?;
        let b_guard = write_entry(b_entry, USER_LOCK)?;
        Ok((a_guard, b_guard))
    } else {
        let b_guard = write_entry(b_entry, USER_LOCK)?;
        let a_guard = write_entry(a_entry, USER_LOCK)?;
        Ok((a_guard, b_guard))
    }
}

#[async_trait]
impl UserRepository for MemoryUsers {
    async fn add(&self, user: User) -> StorageResult<User> {
        self.latch.ensure_open()?;
        validate_username(&user.username)?;

        let user = user.without_edges();
        match self.users.insert_new(user.username.clone(), user.clone())? {
            Some(_) => {
                debug!(username = %user.username, "user added");
                Ok(user)
            }
            None => Err(StorageError::AlreadyExists(format!("user {}", user.username))),
        }
    }

    async fn get(&self, username: &str) -> StorageResult<User> {
        self.latch.ensure_open()?;
        validate_username(username)?;

        let entry = self.entry(username)?;
        let guard = read_entry(&entry, USER_LOCK)?;
        Ok(guard.clone())
    }

    async fn update(&self, update: UserUpdate) -> StorageResult<User> {
        self.latch.ensure_open()?;
        validate_username(&update.username)?;

        let entry = self.entry(&update.username)?;
        let mut guard = write_entry(&entry, USER_LOCK)?;
        guard.apply(&update);
        Ok(guard.clone())
    }

    async fn follow(&self, follower: &str, followee: &str) -> StorageResult<()> {
        let (follower_entry, followee_entry) = self.edge_entries(follower, followee)?;
        let (mut from, mut to) = lock_pair(follower, &follower_entry, followee, &followee_entry)?;

        from.follows.insert(followee.to_string());
        to.followers.insert(follower.to_string());
        debug!(follower, followee, "follow edge added");
        Ok(())
    }

    async fn unfollow(&self, follower: &str, followee: &str) -> StorageResult<()> {
        let (follower_entry, followee_entry) = self.edge_entries(follower, followee)?;
        let (mut from, mut to) = lock_pair(follower, &follower_entry, followee, &followee_entry)?;

        let removed = from.follows.remove(followee);
        to.followers.remove(follower);
        debug!(follower, followee, removed, "follow edge removed");
        Ok(())
    }
}
