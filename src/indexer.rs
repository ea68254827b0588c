use std::{thread, time::Duration};

use crate::{
    catalog::{CatalogEntry, CatalogStore},
    error::{Error, Result},
    feed::SourceFeed,
    normalize::normalize,
    progress::{ProgressStore, unix_now},
    stop::StopFlag,
};

/// Checkpoint after this many processed (payload-bearing) items.
pub const CHECKPOINT_INTERVAL: u32 = 50;

/// Extra wait on top of a rate-limit signal before resuming the stream.
pub const RATE_LIMIT_MARGIN: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct IndexerOptions {
    pub checkpoint_interval: u32,
    /// Pause between items, respecting the upstream's rate limits.
    pub throttle: Duration,
    pub rate_limit_margin: Duration,
}

impl Default for IndexerOptions {
    fn default() -> Self {
        Self {
            checkpoint_interval: CHECKPOINT_INTERVAL,
            throttle: Duration::from_millis(150),
            rate_limit_margin: RATE_LIMIT_MARGIN,
        }
    }
}

/// Outcome of one indexer run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexSummary {
    /// Payload-bearing items examined this run.
    pub processed: u64,
    /// New catalog entries.
    pub inserted: u64,
    /// Items already present (dedup hit).
    pub duplicates: u64,
    /// Items without a payload or a derivable display name.
    pub skipped: u64,
    /// Whether the feed was exhausted (vs interrupted).
    pub drained: bool,
}

/// Stream the source feed from its durable checkpoint, cataloging every
/// payload-bearing item exactly once.
///
/// The checkpoint is written after every `checkpoint_interval` processed
/// items and once more on drain or graceful stop, never speculatively; a
/// crash replays at most one interval of items, each re-skipped by the
/// dedup key. A rate-limit signal suspends the stream for the demanded
/// wait plus a margin and resumes at the same position. Any other feed or
/// store failure aborts the run and surfaces to the operator.
pub fn run_indexer(
    feed: &dyn SourceFeed,
    catalog: &CatalogStore,
    progress: &ProgressStore,
    options: &IndexerOptions,
    stop: &StopFlag,
) -> Result<IndexSummary> {
    let feed_id = feed.feed_id();
    let mut cursor = progress.checkpoint(feed_id)?.unwrap_or(0);
    let start = cursor;
    tracing::info!(feed_id, resume_after = cursor, "indexing started");

    let mut summary = IndexSummary::default();
    let mut since_checkpoint = 0u32;

    loop {
        if stop.is_triggered() {
            tracing::info!(feed_id, cursor, "indexing interrupted");
            break;
        }

        let item = match feed.next_after(cursor) {
            Ok(Some(item)) => item,
            Ok(None) => {
                summary.drained = true;
                break;
            }
            Err(Error::RateLimited { retry_after }) => {
                let wait = retry_after + options.rate_limit_margin;
                tracing::warn!(
                    feed_id,
                    wait_secs = wait.as_secs(),
                    "rate limited, suspending stream"
                );
                thread::sleep(wait);
                // Resume from the same position.
                continue;
            }
            Err(err) => return Err(err),
        };

        cursor = item.item_id;

        let Some(payload) = item.payload.as_ref() else {
            summary.skipped += 1;
            continue;
        };
        let Some(name) = payload.display_name().map(str::to_string) else {
            summary.skipped += 1;
            continue;
        };

        let entry = CatalogEntry {
            source_feed_id: feed_id,
            source_item_id: item.item_id,
            content_id: payload.content_id,
            content_unique_id: payload.unique_id.clone(),
            display_name: name.clone(),
            byte_size: payload.byte_size,
            caption: item.caption.clone(),
            mime_type: payload.mime_type.clone(),
            search_key: normalize(&format!("{name} {}", item.caption)),
            indexed_at: unix_now(),
        };

        if catalog.insert_if_absent(&entry)? {
            summary.inserted += 1;
            tracing::info!(item_id = item.item_id, name = %name, "indexed");
        } else {
            summary.duplicates += 1;
        }

        summary.processed += 1;
        since_checkpoint += 1;
        if since_checkpoint >= options.checkpoint_interval {
            progress.set_checkpoint(feed_id, cursor)?;
            since_checkpoint = 0;
        }

        if !options.throttle.is_zero() {
            thread::sleep(options.throttle);
        }
    }

    // Everything up to the cursor is durably inserted.
    if cursor > start {
        progress.set_checkpoint(feed_id, cursor)?;
    }

    tracing::info!(
        feed_id,
        processed = summary.processed,
        inserted = summary.inserted,
        drained = summary.drained,
        "indexing finished"
    );
    Ok(summary)
}
