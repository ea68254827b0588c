use std::{thread, time::Duration};

use crate::{
    catalog::{CatalogEntry, CatalogStore},
    error::{Error, Result},
    feed::{SourceFeed, TargetFeed},
    progress::{ForwardRecord, ForwardStatus, ProgressStore, unix_now},
    stop::StopFlag,
};

/// Largest payload the pipeline will mirror (1.2 GiB).
pub const MAX_FORWARD_BYTES: u64 = 1_288_490_188;

/// Extra wait on top of a rate-limit signal before the single retry.
pub const RATE_LIMIT_MARGIN: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ForwarderOptions {
    pub max_bytes: u64,
    /// Pause after each copy (and after a failure), respecting the
    /// target's rate limits.
    pub throttle: Duration,
    pub rate_limit_margin: Duration,
}

impl Default for ForwarderOptions {
    fn default() -> Self {
        Self {
            max_bytes: MAX_FORWARD_BYTES,
            throttle: Duration::from_millis(1500),
            rate_limit_margin: RATE_LIMIT_MARGIN,
        }
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ForwardSummary {
    pub forwarded: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Whether the pending set was fully drained (vs interrupted).
    pub completed: bool,
}

/// Copy every qualifying catalog entry to the target feed exactly once.
///
/// The pending set is every entry of the source feed within the size cap
/// whose forward record is absent or `failed`, in item order; the status
/// check runs per candidate against the store, so pending-set computation
/// does not grow with forwarding history. Re-running after a partial run
/// resumes where it left off; `failed` items are retried on the next run.
pub fn run_forwarder(
    source: &dyn SourceFeed,
    target: &dyn TargetFeed,
    catalog: &CatalogStore,
    progress: &ProgressStore,
    options: &ForwarderOptions,
    stop: &StopFlag,
) -> Result<ForwardSummary> {
    let source_feed_id = source.feed_id();
    let target_feed_id = target.feed_id();
    let ad_text = progress.ad_text()?;

    // Item order is the primary key order of the catalog scan, so the
    // mirror preserves original upload order.
    let qualifying = catalog.matching(|e| {
        e.source_feed_id == source_feed_id
            && e.byte_size.is_some_and(|size| size <= options.max_bytes)
    })?;
    tracing::info!(
        source_feed_id,
        target_feed_id,
        qualifying = qualifying.len(),
        "forwarding started"
    );

    let mut summary = ForwardSummary::default();

    for entry in &qualifying {
        if stop.is_triggered() {
            tracing::info!("forwarding interrupted");
            return Ok(summary);
        }
        if progress.is_forwarded(entry.source_item_id)? {
            continue;
        }

        let caption = build_caption(entry, &ad_text);
        let status = match attempt_forward(source, target, entry, &caption) {
            Ok(status) => status,
            Err(Error::RateLimited { retry_after }) => {
                let wait = retry_after + options.rate_limit_margin;
                tracing::warn!(
                    item_id = entry.source_item_id,
                    wait_secs = wait.as_secs(),
                    "rate limited, retrying once"
                );
                thread::sleep(wait);
                match attempt_forward(source, target, entry, &caption) {
                    Ok(status) => status,
                    Err(err) => {
                        tracing::error!(
                            item_id = entry.source_item_id,
                            error = %err,
                            "retry failed"
                        );
                        ForwardStatus::Failed
                    }
                }
            }
            Err(err) => {
                tracing::error!(
                    item_id = entry.source_item_id,
                    error = %err,
                    "forward failed"
                );
                ForwardStatus::Failed
            }
        };

        progress.record_forward(&ForwardRecord {
            source_feed_id: entry.source_feed_id,
            source_item_id: entry.source_item_id,
            target_feed_id,
            status,
            forwarded_at: unix_now(),
        })?;

        match status {
            ForwardStatus::Success => {
                summary.forwarded += 1;
                tracing::info!(item_id = entry.source_item_id, "forwarded");
            }
            ForwardStatus::Skipped => {
                summary.skipped += 1;
            }
            ForwardStatus::Failed => {
                summary.failed += 1;
            }
        }

        // Skipped items made no feed write, nothing to throttle.
        if status != ForwardStatus::Skipped && !options.throttle.is_zero() {
            thread::sleep(options.throttle);
        }
    }

    summary.completed = true;
    tracing::info!(
        forwarded = summary.forwarded,
        skipped = summary.skipped,
        failed = summary.failed,
        "forwarding finished"
    );
    Ok(summary)
}

/// One copy attempt. Vanished or payload-less items settle as `Skipped`;
/// transport and rate-limit failures bubble to the caller.
fn attempt_forward(
    source: &dyn SourceFeed,
    target: &dyn TargetFeed,
    entry: &CatalogEntry,
    caption: &str,
) -> Result<ForwardStatus> {
    let Some(item) = source.fetch(entry.source_item_id)? else {
        tracing::warn!(
            item_id = entry.source_item_id,
            "item vanished upstream, skipping"
        );
        return Ok(ForwardStatus::Skipped);
    };
    let Some(payload) = item.payload else {
        return Ok(ForwardStatus::Skipped);
    };
    let Some(mut reader) = source.open_payload(entry.source_item_id)? else {
        return Ok(ForwardStatus::Skipped);
    };

    let name = payload.display_name().unwrap_or(&entry.display_name);
    target.append(name, payload.mime_type.as_deref(), caption, reader.as_mut())?;
    Ok(ForwardStatus::Success)
}

/// Mirror attribution plus the stored promotional text, when any.
fn build_caption(entry: &CatalogEntry, ad_text: &str) -> String {
    let mut caption = format!(
        "Mirrored from feed {} item {}",
        entry.source_feed_id, entry.source_item_id
    );
    if !ad_text.is_empty() {
        caption.push_str("\n\n");
        caption.push_str(ad_text);
    }
    caption
}
