//! Two-level locked map.
//!
//! The outer lock guards the key set only. Each value sits behind its own
//! lock, handed out as an `Arc` so callers take it after the outer lock is
//! gone. Unrelated keys never contend beyond the brief outer lookup.

use crate::{StorageError, StorageResult};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Shared handle to one entity and its lock.
pub(crate) type Entry<V> = Arc<RwLock<V>>;

pub(crate) struct LockedMap<K, V> {
    name: &'static str,
    entries: RwLock<HashMap<K, Entry<V>>>,
}

impl<K, V> LockedMap<K, V>
where
    K: Eq + Hash,
{
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn get<Q>(&self, key: &Q) -> StorageResult<Option<Entry<V>>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let guard = self.entries.read().map_err(|_| poisoned(self.name))?;
        Ok(guard.get(key).cloned())
    }

    /// Insert only if the key is absent. `None` means it was already there.
    pub(crate) fn insert_new(&self, key: K, value: V) -> StorageResult<Option<Entry<V>>> {
        let mut guard = self.entries.write().map_err(|_| poisoned(self.name))?;
        if guard.contains_key(&key) {
            return Ok(None);
        }
        let entry = Arc::new(RwLock::new(value));
        guard.insert(key, Arc::clone(&entry));
        Ok(Some(entry))
    }

    pub(crate) fn get_or_insert_with(
        &self,
        key: K,
        make: impl FnOnce() -> V,
    ) -> StorageResult<Entry<V>> {
        if let Some(entry) = self.get(&key)? {
            return Ok(entry);
        }
        let mut guard = self.entries.write().map_err(|_| poisoned(self.name))?;
        let entry = guard
            .entry(key)
            .or_insert_with(|| Arc::new(RwLock::new(make())));
        Ok(Arc::clone(entry))
    }

    pub(crate) fn len(&self) -> StorageResult<usize> {
        let guard = self.entries.read().map_err(|_| poisoned(self.name))?;
        Ok(guard.len())
    }
}

pub(crate) fn read_entry<'a, V>(
    entry: &'a Entry<V>,
    name: &'static str,
) -> StorageResult<RwLockReadGuard<'a, V>> {
    entry.read().map_err(|_| poisoned(name))
}

pub(crate) fn write_entry<'a, V>(
    entry: &'a Entry<V>,
    name: &'static str,
) -> StorageResult<RwLockWriteGuard<'a, V>> {
    entry.write().map_err(|_| poisoned(name))
}

fn poisoned(name: &str) -> StorageError {
    StorageError::Unavailable(format!("{name} lock poisoned"))
}
