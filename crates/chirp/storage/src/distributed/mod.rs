//! Engine backed by a strongly consistent key-value coordination service.
//!
//! The engine itself holds no mutable state; everything lives in the
//! service under the layout in [`keys`]. Relations are key encodings:
//! a follow edge is two empty-valued keys (forward and reverse) written in
//! one guarded transaction, so followers can be listed without a reverse
//! scan and the two sides never diverge.

pub mod codec;
#[cfg(feature = "etcd")]
pub mod etcd;
mod in_process;
pub mod keys;
pub mod kv;
mod posts;
mod users;

pub use in_process::InProcessKv;
pub use keys::KeySpace;
pub use kv::{KvCompare, KvOp, KvPair, KvStore, KvTxn};

use crate::traits::{BackendKind, PostRepository, Storage, UserRepository};
use crate::StorageResult;
use async_trait::async_trait;
use posts::DistributedPosts;
use std::sync::{Arc, Mutex, Weak};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use users::DistributedUsers;

/// Distributed storage engine over any [`KvStore`].
pub struct DistributedStorage {
    kv: Arc<dyn KvStore>,
    users: DistributedUsers,
    posts: DistributedPosts,
    shutdown_hook: Mutex<Option<JoinHandle<()>>>,
}

impl DistributedStorage {
    pub fn new(kv: Arc<dyn KvStore>, keys: KeySpace) -> Self {
        Self {
            users: DistributedUsers::new(Arc::clone(&kv), keys.clone()),
            posts: DistributedPosts::new(Arc::clone(&kv), keys),
            kv,
            shutdown_hook: Mutex::new(None),
        }
    }

    /// Close the engine when the process receives SIGINT or SIGTERM.
    ///
    /// The hook holds only a weak reference, so it never keeps the engine
    /// alive. An explicit [`Storage::close`] cancels it. Must be called from
    /// within a tokio runtime.
    pub fn install_shutdown_hook(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            shutdown_signal().await;
            if let Some(storage) = weak.upgrade() {
                // Detach first: aborting our own task would cancel the close.
                storage.take_hook();
                if let Err(err) = storage.kv.close().await {
                    warn!(error = %err, "closing storage on shutdown failed");
                }
            }
        });
        if let Some(previous) = self.replace_hook(Some(handle)) {
            previous.abort();
        }
    }

    pub fn has_shutdown_hook(&self) -> bool {
        self.shutdown_hook
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    fn take_hook(&self) -> Option<JoinHandle<()>> {
        self.replace_hook(None)
    }

    fn replace_hook(&self, next: Option<JoinHandle<()>>) -> Option<JoinHandle<()>> {
        match self.shutdown_hook.lock() {
            Ok(mut guard) => std::mem::replace(&mut *guard, next),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), next),
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, closing storage"),
        _ = terminate => info!("received terminate signal, closing storage"),
    }
}

#[async_trait]
impl Storage for DistributedStorage {
    fn users(&self) -> &dyn UserRepository {
        &self.users
    }

    fn posts(&self) -> &dyn PostRepository {
        &self.posts
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Distributed
    }

    async fn close(&self) -> StorageResult<()> {
        if let Some(hook) = self.take_hook() {
            hook.abort();
        }
        self.kv.close().await
    }
}

impl Drop for DistributedStorage {
    fn drop(&mut self) {
        if let Some(hook) = self.take_hook() {
            hook.abort();
        }
    }
}
