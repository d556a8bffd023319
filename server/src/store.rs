//! Key-value/list store the action log is built on.
//!
//! [`KvStore`] is the narrow collaborator interface: plain values, append-only
//! lists and transactional multi-key reads and writes. [`MemoryStore`] keeps
//! everything in process and can mirror its contents to a snapshot file after
//! every write.

use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use shared::DecodeError;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store lock poisoned")]
    Poisoned,

    #[error("snapshot i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding failed: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("entry {index} of {key} is unreadable: {source}")]
    Corrupt {
        key: String,
        index: i64,
        source: DecodeError,
    },
}

pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    fn set(&self, key: &str, value: String)
        -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Appends to a list and returns its new length
    fn rpush(&self, key: &str, value: String)
        -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// Inclusive range; negative indices count from the end of the list
    fn lrange(
        &self,
        key: &str,
        start: i64,
        end: i64,
    ) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;

    /// Reads several values atomically
    fn mget(
        &self,
        keys: &[String],
    ) -> impl Future<Output = Result<Vec<Option<String>>, StoreError>> + Send;

    /// Writes several values atomically
    fn mset(
        &self,
        entries: Vec<(String, String)>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Contents {
    values: HashMap<String, String>,
    lists: HashMap<String, Vec<String>>,
}

/// In-process store, optionally snapshotted with bincode
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    contents: Arc<Mutex<Contents>>,
    snapshot: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `path` if it exists and keeps it up to date from then on
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let contents = match tokio::fs::read(&path).await {
            Ok(bytes) => bincode::deserialize(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No snapshot at {}, starting empty", path.display());
                Contents::default()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            contents: Arc::new(Mutex::new(contents)),
            snapshot: Some(path),
        })
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Contents>, StoreError> {
        self.contents.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Encodes the contents for the snapshot file while the lock is held
    fn encode_snapshot(&self, contents: &Contents) -> Result<Option<Vec<u8>>, StoreError> {
        if self.snapshot.is_none() {
            return Ok(None);
        }
        Ok(Some(bincode::serialize(contents)?))
    }

    /// Removes the element a failed `rpush` left at position `len - 1`
    fn unpush(&self, key: &str, len: usize) -> Result<(), StoreError> {
        let mut contents = self.lock()?;
        match contents.lists.get_mut(key) {
            Some(list) if list.len() == len => {
                list.pop();
            }
            _ => warn!("List {} changed before a failed append could be undone", key),
        }
        Ok(())
    }

    async fn persist(&self, bytes: Option<Vec<u8>>) -> Result<(), StoreError> {
        let (Some(path), Some(bytes)) = (&self.snapshot, bytes) else {
            return Ok(());
        };
        tokio::fs::write(path, bytes).await.map_err(|e| {
            error!("Failed to write snapshot {}: {}", path.display(), e);
            StoreError::Io(e)
        })
    }
}

fn resolve_range(len: usize, start: i64, end: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let end = if end < 0 { len + end } else { end.min(len - 1) };
    if start >= len || start > end {
        return None;
    }
    Some((start as usize, end as usize))
}

impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock()?.values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let snapshot = {
            let mut contents = self.lock()?;
            contents.values.insert(key.to_string(), value);
            self.encode_snapshot(&contents)?
        };
        self.persist(snapshot).await
    }

    async fn rpush(&self, key: &str, value: String) -> Result<usize, StoreError> {
        let (len, snapshot) = {
            let mut contents = self.lock()?;
            let list = contents.lists.entry(key.to_string()).or_default();
            list.push(value);
            let len = list.len();
            (len, self.encode_snapshot(&contents))
        };
        // A value that never reached the snapshot must not stay readable.
        match snapshot {
            Ok(snapshot) => match self.persist(snapshot).await {
                Ok(()) => Ok(len),
                Err(e) => {
                    self.unpush(key, len)?;
                    Err(e)
                }
            },
            Err(e) => {
                self.unpush(key, len)?;
                Err(e)
            }
        }
    }

    async fn lrange(&self, key: &str, start: i64, end: i64) -> Result<Vec<String>, StoreError> {
        let contents = self.lock()?;
        let Some(list) = contents.lists.get(key) else {
            return Ok(Vec::new());
        };
        Ok(match resolve_range(list.len(), start, end) {
            Some((start, end)) => list[start..=end].to_vec(),
            None => Vec::new(),
        })
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        let contents = self.lock()?;
        Ok(keys
            .iter()
            .map(|key| contents.values.get(key).cloned())
            .collect())
    }

    async fn mset(&self, entries: Vec<(String, String)>) -> Result<(), StoreError> {
        let snapshot = {
            let mut contents = self.lock()?;
            contents.values.extend(entries);
            self.encode_snapshot(&contents)?
        };
        self.persist(snapshot).await
    }
}
