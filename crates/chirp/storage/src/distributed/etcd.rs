//! etcd v3 adapter for [`KvStore`].

use super::kv::{KvCompare, KvOp, KvPair, KvStore, KvTxn};
use crate::config::DistributedConfig;
use crate::latch::CloseLatch;
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use etcd_client::{
    Client, Compare, CompareOp, ConnectOptions, GetOptions, KvClient, Txn, TxnOp,
};
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

/// etcd-backed coordination client.
pub struct EtcdKv {
    client: Mutex<Option<Client>>,
    latch: CloseLatch,
}

impl EtcdKv {
    /// Dial the configured endpoints.
    pub async fn connect(config: &DistributedConfig) -> StorageResult<Self> {
        let options = ConnectOptions::new()
            .with_connect_timeout(Duration::from_millis(config.dial_timeout_ms))
            .with_timeout(Duration::from_millis(config.request_timeout_ms));
        let client = Client::connect(&config.endpoints, Some(options))
            .await
            .map_err(|e| unavailable("failed to connect etcd", e))?;
        info!(endpoints = ?config.endpoints, "connected to etcd");
        Ok(Self {
            client: Mutex::new(Some(client)),
            latch: CloseLatch::new(),
        })
    }

    fn kv(&self) -> StorageResult<KvClient> {
        self.latch.ensure_open()?;
        let guard = self
            .client
            .lock()
            .map_err(|_| StorageError::Unavailable("etcd client lock poisoned".to_string()))?;
        guard
            .as_ref()
            .map(Client::kv_client)
            .ok_or(StorageError::Closed)
    }
}

fn unavailable(context: &str, err: etcd_client::Error) -> StorageError {
    StorageError::Unavailable(format!("{context}: {err}"))
}

fn utf8_key(raw: &[u8]) -> StorageResult<String> {
    String::from_utf8(raw.to_vec())
        .map_err(|e| StorageError::Serialization(format!("non-utf8 key: {e}")))
}

fn to_compare(compare: KvCompare) -> Compare {
    match compare {
        KvCompare::Exists(key) => Compare::version(key, CompareOp::Greater, 0),
        KvCompare::Missing(key) => Compare::version(key, CompareOp::Equal, 0),
        KvCompare::ValueEquals(key, value) => Compare::value(key, CompareOp::Equal, value),
    }
}

fn to_txn_op(op: KvOp) -> TxnOp {
    match op {
        KvOp::Put { key, value } => TxnOp::put(key, value, None),
        KvOp::Delete { key } => TxnOp::delete(key, None),
    }
}

#[async_trait]
impl KvStore for EtcdKv {
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let resp = self
            .kv()?
            .get(key, None)
            .await
            .map_err(|e| unavailable("etcd get failed", e))?;
        Ok(resp.kvs().first().map(|kv| kv.value().to_vec()))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        self.kv()?
            .put(key, value, None)
            .await
            .map_err(|e| unavailable("etcd put failed", e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<u64> {
        let resp = self
            .kv()?
            .delete(key, None)
            .await
            .map_err(|e| unavailable("etcd delete failed", e))?;
        Ok(u64::try_from(resp.deleted()).unwrap_or(0))
    }

    async fn scan_prefix(&self, prefix: &str) -> StorageResult<Vec<KvPair>> {
        let resp = self
            .kv()?
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await
            .map_err(|e| unavailable("etcd prefix scan failed", e))?;
        resp.kvs()
            .iter()
            .map(|kv| {
                Ok(KvPair {
                    key: utf8_key(kv.key())?,
                    value: kv.value().to_vec(),
                })
            })
            .collect()
    }

    async fn scan_keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let resp = self
            .kv()?
            .get(prefix, Some(GetOptions::new().with_prefix().with_keys_only()))
            .await
            .map_err(|e| unavailable("etcd key scan failed", e))?;
        resp.kvs().iter().map(|kv| utf8_key(kv.key())).collect()
    }

    async fn commit(&self, txn: KvTxn) -> StorageResult<bool> {
        let compares: Vec<Compare> = txn.when.into_iter().map(to_compare).collect();
        let ops: Vec<TxnOp> = txn.then.into_iter().map(to_txn_op).collect();
        let resp = self
            .kv()?
            .txn(Txn::new().when(compares).and_then(ops))
            .await
            .map_err(|e| unavailable("etcd txn failed", e))?;
        Ok(resp.succeeded())
    }

    async fn close(&self) -> StorageResult<()> {
        if !self.latch.close() {
            return Ok(());
        }
        let client = self
            .client
            .lock()
            .map_err(|_| StorageError::Unavailable("etcd client lock poisoned".to_string()))?
            .take();
        // Dropping the last handle tears down the gRPC channel.
        drop(client);
        info!("etcd connection closed");
        Ok(())
    }
}
