use std::{
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Indexer checkpoints: `feed_id` -> `(last_processed_item_id, updated_at)`.
const CHECKPOINTS: TableDefinition<i64, (i64, u64)> =
    TableDefinition::new("checkpoints");

/// Forward records: `source_item_id` -> record JSON.
const FORWARD_RECORDS: TableDefinition<i64, &[u8]> =
    TableDefinition::new("forward_records");

const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");

const AD_TEXT_KEY: &str = "ad_text";

/// Outcome of one attempted cross-feed copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardStatus {
    Success,
    Skipped,
    Failed,
}

impl ForwardStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ForwardStatus::Success => "success",
            ForwardStatus::Skipped => "skipped",
            ForwardStatus::Failed => "failed",
        }
    }

    /// Whether this status settles the item (no further attempts).
    pub fn is_settled(self) -> bool {
        matches!(self, ForwardStatus::Success | ForwardStatus::Skipped)
    }
}

/// Durable status of one attempted forward, at most one per source item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardRecord {
    pub source_feed_id: i64,
    pub source_item_id: i64,
    pub target_feed_id: i64,
    pub status: ForwardStatus,
    /// Unix seconds of the most recent attempt.
    pub forwarded_at: u64,
}

/// Tallies of forward records by status.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ForwardTallies {
    pub success: u64,
    pub skipped: u64,
    pub failed: u64,
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Durable key-value records shared by the indexer (checkpoints) and the
/// forwarding pipeline (per-item status), plus the admin settings.
///
/// Checkpoint writes and forward-record upserts touch independent keys
/// and never contend.
pub struct ProgressStore {
    db: Database,
}

impl ProgressStore {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(CHECKPOINTS)?;
        txn.open_table(FORWARD_RECORDS)?;
        txn.open_table(SETTINGS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    // -- Checkpoints --

    pub fn checkpoint(&self, feed_id: i64) -> Result<Option<i64>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(CHECKPOINTS)?;
        Ok(table.get(feed_id)?.map(|v| v.value().0))
    }

    /// Advance the checkpoint for a feed. Monotonic: a value below the
    /// stored one is ignored.
    pub fn set_checkpoint(&self, feed_id: i64, item_id: i64) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(CHECKPOINTS)?;
            let current = table.get(feed_id)?.map(|v| v.value().0);
            if current.is_none_or(|c| item_id >= c) {
                table.insert(feed_id, (item_id, unix_now()))?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    pub fn list_checkpoints(&self) -> Result<Vec<(i64, i64, u64)>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(CHECKPOINTS)?;
        let mut result = Vec::new();
        for row in table.iter()? {
            let (feed, value) = row?;
            let (item, updated_at) = value.value();
            result.push((feed.value(), item, updated_at));
        }
        Ok(result)
    }

    pub fn clear_checkpoints(&self) -> Result<()> {
        let txn = self.db.begin_write()?;
        txn.delete_table(CHECKPOINTS)?;
        txn.open_table(CHECKPOINTS)?;
        txn.commit()?;
        Ok(())
    }

    // -- Forward records --

    pub fn forward_record(
        &self,
        source_item_id: i64,
    ) -> Result<Option<ForwardRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(FORWARD_RECORDS)?;
        match table.get(source_item_id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Whether the item is settled (`success` or `skipped`). `failed`
    /// records leave the item pending.
    pub fn is_forwarded(&self, source_item_id: i64) -> Result<bool> {
        Ok(self
            .forward_record(source_item_id)?
            .is_some_and(|r| r.status.is_settled()))
    }

    /// Upsert keyed by `source_item_id`: the first write inserts, later
    /// writes replace status and timestamp.
    pub fn record_forward(&self, record: &ForwardRecord) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(FORWARD_RECORDS)?;
            let bytes = serde_json::to_vec(record)?;
            table.insert(record.source_item_id, bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn forward_tallies(&self) -> Result<ForwardTallies> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(FORWARD_RECORDS)?;
        let mut tallies = ForwardTallies::default();
        for row in table.iter()? {
            let (_, value) = row?;
            let record: ForwardRecord = serde_json::from_slice(value.value())?;
            match record.status {
                ForwardStatus::Success => tallies.success += 1,
                ForwardStatus::Skipped => tallies.skipped += 1,
                ForwardStatus::Failed => tallies.failed += 1,
            }
        }
        Ok(tallies)
    }

    pub fn clear_forward_records(&self) -> Result<()> {
        let txn = self.db.begin_write()?;
        txn.delete_table(FORWARD_RECORDS)?;
        txn.open_table(FORWARD_RECORDS)?;
        txn.commit()?;
        Ok(())
    }

    // -- Settings --

    pub fn ad_text(&self) -> Result<String> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        Ok(table
            .get(AD_TEXT_KEY)?
            .map(|v| v.value().to_string())
            .unwrap_or_default())
    }

    pub fn set_ad_text(&self, value: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SETTINGS)?;
            table.insert(AD_TEXT_KEY, value)?;
        }
        txn.commit()?;
        Ok(())
    }
}

impl std::fmt::Debug for ProgressStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressStore").finish_non_exhaustive()
    }
}
