//! Persistence of acknowledged ("read") overdue notifications.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::Result;
use crate::storage::KeyValueStore;
use crate::utils::json::{self, JsonContext};

/// Ids of overdue loans the user has acknowledged.
pub type ReadMarkSet = BTreeSet<String>;

/// Fixed key of the read set in the local store.
pub const READ_MARKS_KEY: &str = "read_notifications";

/// Durable set of read notification ids.
///
/// Ids are never expired: an id stays read even when the same loan becomes
/// overdue again later.
#[async_trait]
pub trait ReadMarkStore: Send + Sync {
    /// Load the persisted set.
    ///
    /// Missing or unparseable state yields an empty set. A failure to read the
    /// underlying store is an error, so callers can keep their last good set.
    async fn load(&self) -> Result<ReadMarkSet>;

    /// Overwrite the persisted set.
    async fn save(&self, marks: &ReadMarkSet) -> Result<()>;

    /// Remove the persisted set entirely.
    async fn clear(&self) -> Result<()>;
}

/// [`ReadMarkStore`] serialized as a JSON array under [`READ_MARKS_KEY`].
pub struct LocalReadMarkStore<S: KeyValueStore> {
    kv: Arc<S>,
    key: String,
}

impl<S: KeyValueStore> LocalReadMarkStore<S> {
    pub fn new(kv: Arc<S>) -> Self {
        Self {
            kv,
            key: READ_MARKS_KEY.to_string(),
        }
    }
}

#[async_trait]
impl<S: KeyValueStore> ReadMarkStore for LocalReadMarkStore<S> {
    async fn load(&self) -> Result<ReadMarkSet> {
        let raw = self.kv.get(&self.key).await?;

        let ids: Vec<String> = json::parse_optional_or_default(
            raw.as_deref(),
            JsonContext::StateKey { key: &self.key },
            "Stored notification marks are corrupted; starting from an empty set",
        );
        Ok(ids.into_iter().collect())
    }

    async fn save(&self, marks: &ReadMarkSet) -> Result<()> {
        let raw = serde_json::to_string(marks)?;
        self.kv.set(&self.key, &raw).await?;
        debug!(count = marks.len(), "Saved notification marks");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.kv.remove(&self.key).await?;
        debug!("Cleared notification marks");
        Ok(())
    }
}
