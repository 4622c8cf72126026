//! Device-local durable key-value storage.
//!
//! String keys, string values. Nothing stored here is ever synced to the
//! loan service.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::debug;

use crate::Result;
use crate::utils::fs;
use crate::utils::json::{self, JsonContext};

/// A string-keyed, string-valued persistent store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Key-value store backed by a single JSON object file.
///
/// Every write rewrites the whole file through a temp file + rename, so a
/// crash mid-write leaves the previous contents intact. A file that fails to
/// parse is treated as empty.
pub struct FileKeyValueStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileKeyValueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_entries(&self) -> Result<BTreeMap<String, String>> {
        let raw = fs::read_optional(&self.path).await?;
        Ok(json::parse_optional_or_default(
            raw.as_deref(),
            JsonContext::StateFile { path: &self.path },
            "Local state file is corrupted; treating it as empty",
        ))
    }

    async fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let body = serde_json::to_vec_pretty(entries)?;
        fs::write_atomic(&self.path, &body).await
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.read_entries().await?;
        Ok(entries.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.read_entries().await?;
        entries.insert(key.to_string(), value.to_string());
        self.write_entries(&entries).await?;
        debug!(path = %self.path.display(), key, "Stored local value");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.read_entries().await?;
        if entries.remove(key).is_none() {
            return Ok(());
        }
        self.write_entries(&entries).await?;
        debug!(path = %self.path.display(), key, "Removed local value");
        Ok(())
    }
}

/// In-memory store, mostly for tests and one-shot commands.
#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;
    use crate::Error;

    /// Memory store whose reads and writes can be made to fail.
    #[derive(Default)]
    pub(crate) struct FaultyKeyValueStore {
        inner: MemoryKeyValueStore,
        failing_gets: AtomicUsize,
        failing_sets: AtomicBool,
    }

    impl FaultyKeyValueStore {
        /// Fail the next `count` reads.
        pub(crate) fn fail_next_gets(&self, count: usize) {
            self.failing_gets.store(count, Ordering::SeqCst);
        }

        pub(crate) fn set_failing_writes(&self, failing: bool) {
            self.failing_sets.store(failing, Ordering::SeqCst);
        }

        fn io_failure(op: &str) -> Error {
            Error::Io(std::io::Error::other(format!("{op} failed")))
        }
    }

    #[async_trait]
    impl KeyValueStore for FaultyKeyValueStore {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            let failed = self
                .failing_gets
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                return Err(Self::io_failure("read"));
            }
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<()> {
            if self.failing_sets.load(Ordering::SeqCst) {
                return Err(Self::io_failure("write"));
            }
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<()> {
            if self.failing_sets.load(Ordering::SeqCst) {
                return Err(Self::io_failure("remove"));
            }
            self.inner.remove(key).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_store_round_trip_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = FileKeyValueStore::new(&path);
        store.set("a", "1").await.unwrap();
        store.set("b", "2").await.unwrap();
        drop(store);

        let reopened = FileKeyValueStore::new(&path);
        assert_eq!(reopened.get("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(reopened.get("b").await.unwrap().as_deref(), Some("2"));
        assert_eq!(reopened.get("c").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_remove_keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyValueStore::new(dir.path().join("state.json"));
        store.set("a", "1").await.unwrap();
        store.set("b", "2").await.unwrap();

        store.remove("a").await.unwrap();
        store.remove("missing").await.unwrap();

        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.get("b").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_file_store_corrupted_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, "{{{ definitely not json").await.unwrap();

        let store = FileKeyValueStore::new(&path);
        assert_eq!(store.get("a").await.unwrap(), None);

        // Writing recovers the file.
        store.set("a", "1").await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryKeyValueStore::new();
        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
