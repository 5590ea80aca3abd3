//! Ordered in-process key-value store with the coordination-service
//! semantics the distributed engine relies on. Backs tests and single-node
//! development runs.

use super::kv::{KvCompare, KvOp, KvPair, KvStore, KvTxn};
use crate::latch::CloseLatch;
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::info;

#[derive(Default)]
pub struct InProcessKv {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
    unavailable: AtomicBool,
    latch: CloseLatch,
}

impl InProcessKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails with `Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Release);
    }

    /// Raw view of the stored keys, for inspecting the persisted layout.
    pub fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    pub fn is_closed(&self) -> bool {
        self.latch.is_closed()
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.latch.ensure_open()?;
        if self.unavailable.load(Ordering::Acquire) {
            return Err(StorageError::Unavailable(
                "in-process kv marked unavailable".to_string(),
            ));
        }
        self.entries
            .lock()
            .map_err(|_| StorageError::Unavailable("in-process kv lock poisoned".to_string()))
    }
}

fn under_prefix<'a>(
    entries: &'a BTreeMap<String, Vec<u8>>,
    prefix: &'a str,
) -> impl Iterator<Item = (&'a String, &'a Vec<u8>)> + 'a {
    entries
        .range(prefix.to_string()..)
        .take_while(move |(key, _)| key.starts_with(prefix))
}

fn holds(entries: &BTreeMap<String, Vec<u8>>, compare: &KvCompare) -> bool {
    match compare {
        KvCompare::Exists(key) => entries.contains_key(key),
        KvCompare::Missing(key) => !entries.contains_key(key),
        KvCompare::ValueEquals(key, expected) => entries.get(key) == Some(expected),
    }
}

#[async_trait]
impl KvStore for InProcessKv {
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        self.lock()?.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<u64> {
        Ok(u64::from(self.lock()?.remove(key).is_some()))
    }

    async fn scan_prefix(&self, prefix: &str) -> StorageResult<Vec<KvPair>> {
        let entries = self.lock()?;
        Ok(under_prefix(&entries, prefix)
            .map(|(key, value)| KvPair {
                key: key.clone(),
                value: value.clone(),
            })
            .collect())
    }

    async fn scan_keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let entries = self.lock()?;
        Ok(under_prefix(&entries, prefix)
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn commit(&self, txn: KvTxn) -> StorageResult<bool> {
        let mut entries = self.lock()?;
        if !txn.when.iter().all(|compare| holds(&entries, compare)) {
            return Ok(false);
        }
        for op in txn.then {
            match op {
                KvOp::Put { key, value } => {
                    entries.insert(key, value);
                }
                KvOp::Delete { key } => {
                    entries.remove(&key);
                }
            }
        }
        Ok(true)
    }

    async fn close(&self) -> StorageResult<()> {
        if self.latch.close() {
            info!("in-process kv closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn prefix_scan_stops_at_prefix_boundary() {
        let kv = InProcessKv::new();
        kv.put("posts/al/1", b"a".to_vec()).await.unwrap();
        kv.put("posts/alice/1", b"b".to_vec()).await.unwrap();
        kv.put("posts/alice/2", b"c".to_vec()).await.unwrap();
        kv.put("posts/bob/1", b"d".to_vec()).await.unwrap();

        let keys = kv.scan_keys("posts/alice/").await.unwrap();
        assert_eq!(keys, vec!["posts/alice/1", "posts/alice/2"]);
    }

    #[tokio::test]
    async fn failed_guard_writes_nothing() {
        let kv = InProcessKv::new();
        kv.put("users/a", vec![1]).await.unwrap();

        let applied = kv
            .commit(
                KvTxn::new()
                    .when(KvCompare::Exists("users/a".into()))
                    .when(KvCompare::Exists("users/b".into()))
                    .then(KvOp::put("follows/a/b", Vec::new()))
                    .then(KvOp::put("followers/b/a", Vec::new())),
            )
            .await
            .unwrap();
        assert!(!applied);
        assert_eq!(kv.keys().unwrap(), vec!["users/a"]);
    }

    #[tokio::test]
    async fn value_guard_detects_concurrent_change() {
        let kv = InProcessKv::new();
        kv.put("k", vec![1]).await.unwrap();
        let stale = KvTxn::new()
            .when(KvCompare::ValueEquals("k".into(), vec![0]))
            .then(KvOp::put("k", vec![2]));
        assert!(!kv.commit(stale).await.unwrap());
        assert_eq!(kv.get("k").await.unwrap(), Some(vec![1]));
    }

    #[tokio::test]
    async fn outage_and_close_surface_as_errors() {
        let kv = InProcessKv::new();
        kv.set_unavailable(true);
        assert!(matches!(kv.get("k").await, Err(StorageError::Unavailable(_))));
        kv.set_unavailable(false);
        kv.close().await.unwrap();
        assert!(kv.is_closed());
        assert!(matches!(kv.get("k").await, Err(StorageError::Closed)));
    }
}
