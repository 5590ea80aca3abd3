//! Backend selection. The engine is chosen once at startup and shared as
//! `Arc<dyn Storage>`.

use crate::distributed::{DistributedStorage, KeySpace, KvStore};
use crate::memory::InMemoryStorage;
use crate::traits::Storage;
use crate::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

pub const ENV_BACKEND: &str = "CHIRP_STORAGE";
pub const ENV_ETCD_ENDPOINTS: &str = "CHIRP_ETCD_ENDPOINTS";
pub const ENV_ETCD_NAMESPACE: &str = "CHIRP_ETCD_NAMESPACE";

/// Storage backend configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Keep users and posts in process memory only.
    #[default]
    Memory,
    /// Keep everything in an etcd cluster shared by all service instances.
    Distributed(DistributedConfig),
}

/// Connection settings for the coordination service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributedConfig {
    pub endpoints: Vec<String>,
    pub dial_timeout_ms: u64,
    pub request_timeout_ms: u64,
    /// Optional root prefix for every key; empty means no prefix.
    pub namespace: String,
    /// Close the engine on SIGINT/SIGTERM.
    pub install_shutdown_hook: bool,
}

impl Default for DistributedConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["localhost:2379".to_string()],
            dial_timeout_ms: 5_000,
            request_timeout_ms: 5_000,
            namespace: String::new(),
            install_shutdown_hook: true,
        }
    }
}

impl StorageConfig {
    pub fn memory() -> Self {
        Self::Memory
    }

    pub fn distributed<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Distributed(DistributedConfig {
            endpoints: endpoints.into_iter().map(Into::into).collect(),
            ..DistributedConfig::default()
        })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Distributed(_) => "distributed",
        }
    }

    /// Read the configuration from `CHIRP_*` environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`StorageConfig::from_env`] over an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> StorageResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = lookup(ENV_BACKEND).unwrap_or_else(|| "memory".to_string());
        let config = match backend.trim().to_ascii_lowercase().as_str() {
            "" | "memory" => Self::Memory,
            "distributed" | "etcd" => {
                let mut distributed = DistributedConfig::default();
                if let Some(raw) = lookup(ENV_ETCD_ENDPOINTS) {
                    distributed.endpoints = raw
                        .split(',')
                        .map(str::trim)
                        .filter(|endpoint| !endpoint.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                if let Some(namespace) = lookup(ENV_ETCD_NAMESPACE) {
                    distributed.namespace = namespace.trim().to_string();
                }
                Self::Distributed(distributed)
            }
            other => {
                return Err(StorageError::InvalidInput(format!(
                    "unknown storage backend '{other}' in {ENV_BACKEND}"
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> StorageResult<()> {
        let Self::Distributed(distributed) = self else {
            return Ok(());
        };
        if distributed.endpoints.is_empty() {
            return Err(StorageError::InvalidInput(
                "distributed storage needs at least one endpoint".to_string(),
            ));
        }
        if distributed.namespace.contains(char::is_whitespace) {
            return Err(StorageError::InvalidInput(format!(
                "namespace '{}' must not contain whitespace",
                distributed.namespace
            )));
        }
        Ok(())
    }
}

/// Open the configured engine.
pub async fn open_storage(config: StorageConfig) -> StorageResult<Arc<dyn Storage>> {
    config.validate()?;
    match config {
        StorageConfig::Memory => {
            info!(backend = "memory", "storage opened");
            Ok(Arc::new(InMemoryStorage::new()))
        }
        #[cfg(feature = "etcd")]
        StorageConfig::Distributed(distributed) => {
            let kv = crate::distributed::etcd::EtcdKv::connect(&distributed).await?;
            Ok(open_storage_with_kv(&distributed, Arc::new(kv)))
        }
        #[cfg(not(feature = "etcd"))]
        StorageConfig::Distributed(_) => Err(StorageError::InvalidInput(
            "distributed storage requires the `etcd` feature".to_string(),
        )),
    }
}

/// Build the distributed engine over an already connected [`KvStore`].
///
/// Installing the shutdown hook spawns a task, so this must run inside a
/// tokio runtime when `install_shutdown_hook` is set.
pub fn open_storage_with_kv(
    config: &DistributedConfig,
    kv: Arc<dyn KvStore>,
) -> Arc<dyn Storage> {
    let storage = Arc::new(DistributedStorage::new(kv, KeySpace::new(&config.namespace)));
    if config.install_shutdown_hook {
        storage.install_shutdown_hook();
    }
    info!(
        backend = "distributed",
        namespace = %config.namespace,
        "storage opened"
    );
    storage
}
