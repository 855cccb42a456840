//! Key-value storage for usage credits and the session → assessment handoff record.
//!
//! Every reader and writer holds an `Arc<dyn KeyValueStore>`; the backend is
//! chosen at startup (`STORE_BACKEND`). Each key has a single writer.

pub mod handoff;
pub mod ticket;
pub mod usage;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::StoreBackend;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    /// Reads and deletes in one step. Of two concurrent takers, one gets the value.
    async fn take(&self, key: &str) -> Result<Option<String>, StoreError>;
}

/// Builds the configured backend.
pub async fn open_store(backend: &StoreBackend) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    let store: Arc<dyn KeyValueStore> = match backend {
        StoreBackend::Memory => {
            info!("Using in-memory store (data is lost on restart)");
            Arc::new(MemoryStore::default())
        }
        StoreBackend::File(dir) => {
            let store = FileStore::open(dir)
                .await
                .with_context(|| format!("Failed to open store directory {}", dir.display()))?;
            info!("Using file store at {}", dir.display());
            Arc::new(store)
        }
        StoreBackend::Redis(url) => {
            let store = RedisStore::connect(url)
                .await
                .context("Failed to connect to Redis")?;
            info!("Using Redis store");
            Arc::new(store)
        }
    };
    Ok(store)
}

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.write().await.remove(key))
    }
}

/// One file per key under a directory. Writes go to a temp file and are
/// renamed into place, so readers never observe a torn value.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub async fn open(dir: &Path) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(dir).await?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{file_name}.value"))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, value).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        // Claim the file by renaming it away first; only one rename can win.
        let path = self.path_for(key);
        let claimed = path.with_extension(format!("taken-{}", uuid::Uuid::new_v4()));
        match tokio::fs::rename(&path, &claimed).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let value = tokio::fs::read_to_string(&claimed).await;
        let _ = tokio::fs::remove_file(&claimed).await;
        Ok(Some(value?))
    }
}

pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let (value, _deleted): (Option<String>, i64) = redis::pipe()
            .atomic()
            .get(key)
            .del(key)
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }
}

/// Store whose writes always fail; reads see nothing.
#[cfg(test)]
pub struct BrokenStore;

#[cfg(test)]
#[async_trait]
impl KeyValueStore for BrokenStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
        Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "quota exceeded",
        )))
    }

    async fn take(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Ok(None)
    }
}
