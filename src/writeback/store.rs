//! Durable Stores
//!
//! The write-back target. Only upsert-by-key is required; the cache never
//! reads back from the durable tier.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{CacheError, Result};

#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn upsert(&self, key: &str, value: &[u8]) -> Result<()>;
}

/// In-process store, used when no data directory is configured and in tests.
#[derive(Default)]
pub struct MemoryStore {
    rows: DashMap<String, Bytes>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.rows.get(key).map(|row| row.value().clone())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn upsert(&self, key: &str, value: &[u8]) -> Result<()> {
        self.rows
            .insert(key.to_string(), Bytes::copy_from_slice(value));
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FileRecord {
    key: String,
    value: Vec<u8>,
}

/// Append-only JSON-lines file. The last record for a key wins.
pub struct FileStore {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl FileStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        tracing::info!("Write-back store opened at {}", path.display());
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Replays the file into its latest key/value view.
    pub async fn load_all(&self) -> Result<HashMap<String, Bytes>> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let mut rows = HashMap::new();
        for (line_no, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<FileRecord>(line) {
                Ok(record) => {
                    rows.insert(record.key, Bytes::from(record.value));
                }
                Err(e) => {
                    tracing::warn!(
                        "Skipping corrupt record at {}:{}: {}",
                        self.path.display(),
                        line_no + 1,
                        e
                    );
                }
            }
        }
        Ok(rows)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DurableStore for FileStore {
    async fn upsert(&self, key: &str, value: &[u8]) -> Result<()> {
        let record = FileRecord {
            key: key.to_string(),
            value: value.to_vec(),
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line)
            .await
            .map_err(|e| CacheError::Persistence(format!("append '{}': {}", key, e)))?;
        file.flush().await?;
        Ok(())
    }
}
