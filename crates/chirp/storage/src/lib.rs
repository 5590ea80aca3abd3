//! Storage for chirp accounts, the follow graph and posts.
//!
//! Two engines satisfy one contract ([`Storage`]):
//! - [`InMemoryStorage`]: process-local maps with per-entity locking.
//! - [`DistributedStorage`]: stateless engine over a strongly consistent
//!   key-value service (etcd with the `etcd` feature, [`InProcessKv`] for
//!   tests and single-node development).
//!
//! The engine is selected once from [`StorageConfig`] and shared as
//! `Arc<dyn Storage>`.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod distributed;
mod error;
mod latch;
pub mod memory;
mod traits;

pub use config::{open_storage, open_storage_with_kv, DistributedConfig, StorageConfig};
pub use distributed::{DistributedStorage, InProcessKv, KeySpace, KvStore};
pub use error::{StorageError, StorageResult};
pub use memory::InMemoryStorage;
pub use traits::{BackendKind, PostRepository, Storage, UserRepository};
