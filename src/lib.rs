//! feedvault - catalogs files discovered in an append-only content feed,
//! with deterministic ranked search and an exactly-once mirror pipeline.
//!
//! Three cooperating cores share one catalog: an incremental indexer that
//! streams the source feed from a durable checkpoint, a ranked search
//! engine with tiered scoring over normalized file metadata, and a
//! forwarding pipeline that copies qualifying payloads into a target feed
//! with per-item status records. No item is processed twice, and every
//! item is eventually processed exactly once, even across restarts.
//!
//! # Quick start
//!
//! ```no_run
//! use feedvault::{CatalogStore, DataDir};
//! use feedvault::search::{self, SearchParams};
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let catalog = CatalogStore::open(&data_dir.catalog_db()).unwrap();
//!
//! let page = search::execute_search(
//!     &catalog,
//!     &SearchParams {
//!         query: "kgf tamil".to_string(),
//!         limit: 10,
//!         offset: 0,
//!     },
//! )
//! .unwrap();
//!
//! for hit in &page.hits {
//!     println!("{:>3}. [{}] {}", hit.rank, hit.score, hit.display_name);
//! }
//! println!("{} total", page.total);
//! ```

pub mod catalog;
pub mod cli;
pub mod config;
pub mod data_dir;
pub mod error;
pub mod feed;
pub mod forwarder;
pub mod fsfeed;
pub mod indexer;
pub mod normalize;
pub mod progress;
pub mod search;
pub mod stop;

pub use catalog::{CatalogEntry, CatalogStore};
pub use data_dir::DataDir;
pub use error::{Error, Result};
pub use feed::{FeedItem, MemoryFeed, PayloadInfo, SourceFeed, TargetFeed};
pub use fsfeed::FsFeed;
pub use progress::{ForwardRecord, ForwardStatus, ProgressStore};
pub use stop::StopFlag;
