//! Client surface of the coordination service.
//!
//! The distributed engine only needs point reads and writes, prefix scans,
//! and guarded multi-key transactions. Implementations translate their own
//! transport errors into [`StorageError`](crate::StorageError).

use crate::StorageResult;
use async_trait::async_trait;

/// One key/value pair returned by a prefix scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvPair {
    pub key: String,
    pub value: Vec<u8>,
}

/// Guard evaluated atomically before a transaction's operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvCompare {
    Exists(String),
    Missing(String),
    ValueEquals(String, Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvOp {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
}

impl KvOp {
    pub fn put(key: impl Into<String>, value: Vec<u8>) -> Self {
        Self::Put {
            key: key.into(),
            value,
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self::Delete { key: key.into() }
    }
}

/// All-or-nothing write: `then` runs only if every `when` guard holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KvTxn {
    pub when: Vec<KvCompare>,
    pub then: Vec<KvOp>,
}

impl KvTxn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn when(mut self, compare: KvCompare) -> Self {
        self.when.push(compare);
        self
    }

    pub fn then(mut self, op: KvOp) -> Self {
        self.then.push(op);
        self
    }
}

/// Strongly consistent, prefix-scannable key-value store.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    async fn put(&self, key: &str, value: Vec<u8>) -> StorageResult<()>;

    /// Returns how many keys were removed (0 or 1).
    async fn delete(&self, key: &str) -> StorageResult<u64>;

    /// Keys and values under `prefix`, in key order.
    async fn scan_prefix(&self, prefix: &str) -> StorageResult<Vec<KvPair>>;

    /// Keys only under `prefix`, in key order.
    async fn scan_keys(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Apply `txn` atomically. `Ok(false)` means a guard failed and nothing
    /// was written.
    async fn commit(&self, txn: KvTxn) -> StorageResult<bool>;

    /// Release the connection. Later calls fail with `Closed`.
    async fn close(&self) -> StorageResult<()>;
}
