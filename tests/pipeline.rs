//! End-to-end run over local spool directories: index a source feed into
//! the catalog, search it, mirror it into a target feed, and verify both
//! loops are idempotent across re-runs.

use std::time::Duration;

use feedvault::{
    CatalogStore, FsFeed, ProgressStore, SourceFeed, StopFlag,
    forwarder::{ForwarderOptions, run_forwarder},
    indexer::{IndexerOptions, run_indexer},
    search::{self, SearchParams},
};

struct Harness {
    _tmp: tempfile::TempDir,
    source: FsFeed,
    target: FsFeed,
    catalog: CatalogStore,
    progress: ProgressStore,
    source_dir: std::path::PathBuf,
}

fn harness() -> Harness {
    let tmp = tempfile::tempdir().unwrap();
    let source_dir = tmp.path().join("source");
    let target_dir = tmp.path().join("target");
    std::fs::create_dir(&source_dir).unwrap();
    std::fs::create_dir(&target_dir).unwrap();

    std::fs::write(source_dir.join("1-KGF.Chapter-2.mkv"), vec![0u8; 64])
        .unwrap();
    std::fs::write(source_dir.join("1.caption.txt"), "Tamil 1080p").unwrap();
    std::fs::write(source_dir.join("2-Money.Heist.S1E1.mkv"), vec![0u8; 32])
        .unwrap();
    // A caption-only item the indexer must skip.
    std::fs::write(source_dir.join("3.caption.txt"), "announcement").unwrap();
    std::fs::write(source_dir.join("4-KGF.Trailer.mkv"), vec![0u8; 900])
        .unwrap();

    let source = FsFeed::open(&source_dir, 1).unwrap();
    let target = FsFeed::open(&target_dir, 2).unwrap();
    let catalog = CatalogStore::open(&tmp.path().join("catalog.redb")).unwrap();
    let progress =
        ProgressStore::open(&tmp.path().join("progress.redb")).unwrap();

    Harness {
        _tmp: tmp,
        source,
        target,
        catalog,
        progress,
        source_dir,
    }
}

fn index_options() -> IndexerOptions {
    IndexerOptions {
        throttle: Duration::ZERO,
        rate_limit_margin: Duration::ZERO,
        ..IndexerOptions::default()
    }
}

fn forward_options(max_bytes: u64) -> ForwarderOptions {
    ForwarderOptions {
        max_bytes,
        throttle: Duration::ZERO,
        rate_limit_margin: Duration::ZERO,
    }
}

#[test]
fn index_search_forward_roundtrip() {
    let h = harness();

    let indexed = run_indexer(
        &h.source,
        &h.catalog,
        &h.progress,
        &index_options(),
        &StopFlag::new(),
    )
    .unwrap();
    assert_eq!(indexed.inserted, 3);
    assert_eq!(indexed.skipped, 1);
    assert!(indexed.drained);

    // Caption text is searchable alongside the file name.
    let page = search::execute_search(
        &h.catalog,
        &SearchParams {
            query: "kgf tamil".to_string(),
            limit: 10,
            offset: 0,
        },
    )
    .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.hits[0].display_name, "KGF.Chapter-2.mkv");
    assert_eq!(search::count(&h.catalog, "kgf").unwrap(), 2);

    // Mirror everything under 100 bytes; the 900-byte trailer stays put.
    h.progress.set_ad_text("Join the mirror feed").unwrap();
    let forwarded = run_forwarder(
        &h.source,
        &h.target,
        &h.catalog,
        &h.progress,
        &forward_options(100),
        &StopFlag::new(),
    )
    .unwrap();
    assert_eq!(forwarded.forwarded, 2);
    assert_eq!(forwarded.failed, 0);
    assert!(forwarded.completed);

    let first = h.target.fetch(1).unwrap().unwrap();
    let payload = first.payload.unwrap();
    assert_eq!(payload.display_name(), Some("KGF.Chapter-2.mkv"));
    assert_eq!(payload.byte_size, Some(64));
    assert!(first.caption.contains("feed 1 item 1"));
    assert!(first.caption.contains("Join the mirror feed"));

    let second = h.target.fetch(2).unwrap().unwrap();
    assert_eq!(
        second.payload.unwrap().display_name(),
        Some("Money.Heist.S1E1.mkv")
    );
}

#[test]
fn reruns_are_idempotent() {
    let h = harness();
    let stop = StopFlag::new();

    run_indexer(&h.source, &h.catalog, &h.progress, &index_options(), &stop)
        .unwrap();
    run_forwarder(
        &h.source,
        &h.target,
        &h.catalog,
        &h.progress,
        &forward_options(100),
        &stop,
    )
    .unwrap();
    let entries_before = h.catalog.len().unwrap();
    let mirrored_before = h.target.fetch(2).unwrap().is_some();

    let reindexed = run_indexer(
        &h.source,
        &h.catalog,
        &h.progress,
        &index_options(),
        &stop,
    )
    .unwrap();
    let reforwarded = run_forwarder(
        &h.source,
        &h.target,
        &h.catalog,
        &h.progress,
        &forward_options(100),
        &stop,
    )
    .unwrap();

    // The checkpoint skips every already-seen item and the forward
    // records settle every already-copied one.
    assert_eq!(reindexed.processed, 0);
    assert_eq!(reindexed.inserted, 0);
    assert_eq!(reforwarded.forwarded, 0);
    assert_eq!(h.catalog.len().unwrap(), entries_before);
    assert!(mirrored_before);
    assert!(h.target.fetch(3).unwrap().is_none());
}

#[test]
fn late_arrivals_resume_from_checkpoint() {
    let h = harness();
    let stop = StopFlag::new();

    run_indexer(&h.source, &h.catalog, &h.progress, &index_options(), &stop)
        .unwrap();
    assert_eq!(h.progress.checkpoint(1).unwrap(), Some(4));

    // A new item lands in the spool after the first drain.
    std::fs::write(h.source_dir.join("5-New.Arrival.mkv"), vec![0u8; 16])
        .unwrap();

    let summary = run_indexer(
        &h.source,
        &h.catalog,
        &h.progress,
        &index_options(),
        &stop,
    )
    .unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.inserted, 1);
    assert_eq!(h.progress.checkpoint(1).unwrap(), Some(5));

    assert_eq!(search::count(&h.catalog, "new arrival").unwrap(), 1);
}
