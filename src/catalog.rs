use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Primary table: `(source_feed_id, source_item_id)` -> entry JSON.
const ENTRIES: TableDefinition<(i64, i64), &[u8]> =
    TableDefinition::new("entries");

/// Dedup index: `(content_unique_id, source_feed_id)` -> primary key.
const CONTENT_KEYS: TableDefinition<(&str, i64), (i64, i64)> =
    TableDefinition::new("content_keys");

/// Indexed metadata for one discovered payload-bearing feed item.
///
/// Created once by the indexer on first sighting, never mutated, removed
/// only by administrative reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub source_feed_id: i64,
    pub source_item_id: i64,
    pub content_id: i64,
    pub content_unique_id: String,
    pub display_name: String,
    pub byte_size: Option<u64>,
    pub caption: String,
    pub mime_type: Option<String>,
    /// Normalized form of `display_name + caption`, see [`crate::normalize`].
    pub search_key: String,
    /// Unix seconds at insertion time.
    pub indexed_at: u64,
}

pub struct CatalogStore {
    db: Database,
}

impl CatalogStore {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(ENTRIES)?;
        txn.open_table(CONTENT_KEYS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    /// Insert an entry unless its `(content_unique_id, source_feed_id)`
    /// dedup key already exists. Returns `Ok(false)` on conflict; the
    /// duplicate case is an expected outcome, not an error.
    pub fn insert_if_absent(&self, entry: &CatalogEntry) -> Result<bool> {
        let txn = self.db.begin_write()?;
        {
            let mut keys = txn.open_table(CONTENT_KEYS)?;
            let dedup_key =
                (entry.content_unique_id.as_str(), entry.source_feed_id);
            if keys.get(dedup_key)?.is_some() {
                return Ok(false);
            }

            let primary = (entry.source_feed_id, entry.source_item_id);
            keys.insert(dedup_key, primary)?;

            let mut entries = txn.open_table(ENTRIES)?;
            let bytes = serde_json::to_vec(entry)?;
            entries.insert(primary, bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(true)
    }

    pub fn find_by_source_item(
        &self,
        feed_id: i64,
        item_id: i64,
    ) -> Result<Option<CatalogEntry>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ENTRIES)?;
        match table.get((feed_id, item_id))? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Collect entries the predicate accepts, streaming the primary table
    /// in `(feed, item)` key order. Only matches are materialized.
    pub fn matching(
        &self,
        mut pred: impl FnMut(&CatalogEntry) -> bool,
    ) -> Result<Vec<CatalogEntry>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ENTRIES)?;
        let mut result = Vec::new();
        for row in table.iter()? {
            let (_, value) = row?;
            let entry: CatalogEntry = serde_json::from_slice(value.value())?;
            if pred(&entry) {
                result.push(entry);
            }
        }
        Ok(result)
    }

    pub fn len(&self) -> Result<u64> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ENTRIES)?;
        let mut count = 0;
        for row in table.iter()? {
            row?;
            count += 1;
        }
        Ok(count)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Administrative reset: drop every entry and the dedup index.
    pub fn clear(&self) -> Result<()> {
        let txn = self.db.begin_write()?;
        txn.delete_table(ENTRIES)?;
        txn.delete_table(CONTENT_KEYS)?;
        txn.open_table(ENTRIES)?;
        txn.open_table(CONTENT_KEYS)?;
        txn.commit()?;
        Ok(())
    }
}

impl std::fmt::Debug for CatalogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogStore").finish_non_exhaustive()
    }
}
