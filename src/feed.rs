use std::{
    collections::{BTreeMap, VecDeque},
    io::{Cursor, Read},
    sync::Mutex,
};

use serde::Serialize;

use crate::error::{Error, Result};

/// Metadata for the binary payload attached to a feed item.
#[derive(Debug, Clone, Serialize)]
pub struct PayloadInfo {
    /// Identifier the feed issued for the payload.
    pub content_id: i64,
    /// Stable identifier for the payload bytes, unique within the feed.
    pub unique_id: String,
    /// Primary file name, if the feed carries one directly.
    pub file_name: Option<String>,
    /// Name recovered from a secondary attribute path.
    pub attr_name: Option<String>,
    pub byte_size: Option<u64>,
    pub mime_type: Option<String>,
}

impl PayloadInfo {
    /// Resolve the display name: the primary file name first, then the
    /// secondary attribute path. Returns `None` only for genuinely
    /// nameless payloads.
    pub fn display_name(&self) -> Option<&str> {
        self.file_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.attr_name.as_deref().filter(|s| !s.is_empty()))
    }
}

/// One item in a feed, identified by a feed-local increasing sequence id.
#[derive(Debug, Clone, Serialize)]
pub struct FeedItem {
    pub item_id: i64,
    pub caption: String,
    pub payload: Option<PayloadInfo>,
}

/// Sequential read access to a feed's items.
///
/// All calls may fail with [`Error::RateLimited`], which carries the wait
/// the feed demands before the same call is retried.
pub trait SourceFeed {
    fn feed_id(&self) -> i64;

    /// The next item with an id strictly greater than `item_id`, in
    /// sequence order. `None` once the feed is exhausted.
    fn next_after(&self, item_id: i64) -> Result<Option<FeedItem>>;

    /// Fetch a single live item. `Ok(None)` if it was deleted upstream.
    fn fetch(&self, item_id: i64) -> Result<Option<FeedItem>>;

    /// Open the item's binary payload for streaming. `Ok(None)` if the
    /// item is gone or carries no payload.
    fn open_payload(&self, item_id: i64) -> Result<Option<Box<dyn Read + '_>>>;
}

/// Write access to a feed that accepts copied items.
pub trait TargetFeed {
    fn feed_id(&self) -> i64;

    /// Append a payload under a new sequence id and return that id.
    fn append(
        &self,
        name: &str,
        mime_type: Option<&str>,
        caption: &str,
        payload: &mut dyn Read,
    ) -> Result<i64>;
}

/// Offset that marks a feed identifier as private: `-(10^12 + id)`.
pub const PRIVATE_FEED_OFFSET: i64 = 1_000_000_000_000;

/// The private-prefixed form of a bare feed identifier.
pub fn private_form(feed_id: i64) -> i64 {
    -(PRIVATE_FEED_OFFSET + feed_id)
}

/// Resolve a configured feed identifier against the feed it names.
///
/// A bare positive identifier is accepted either literally or in its
/// private-prefixed form. Callers resolve once at startup and keep the
/// result; the forwarding and indexing hot paths never re-resolve.
pub fn resolve_feed_ident(candidate: i64, actual: i64) -> Result<i64> {
    if candidate == actual {
        return Ok(actual);
    }
    if candidate > 0 && private_form(candidate) == actual {
        return Ok(actual);
    }
    Err(Error::Config(format!(
        "feed identifier {candidate} does not name feed {actual}"
    )))
}

struct StoredItem {
    item: FeedItem,
    bytes: Option<Vec<u8>>,
}

#[derive(Default)]
struct MemoryFeedState {
    items: BTreeMap<i64, StoredItem>,
    source_faults: VecDeque<Error>,
    append_faults: VecDeque<Error>,
    next_id: i64,
}

/// In-memory feed implementing both sides of the boundary.
///
/// Used by tests and embedders; can simulate upstream rate limiting and
/// transport failures via the `fail_next_*` hooks.
pub struct MemoryFeed {
    feed_id: i64,
    state: Mutex<MemoryFeedState>,
}

impl MemoryFeed {
    pub fn new(feed_id: i64) -> Self {
        Self {
            feed_id,
            state: Mutex::new(MemoryFeedState::default()),
        }
    }

    pub fn feed_id(&self) -> i64 {
        self.feed_id
    }

    /// Insert an item with optional payload bytes under its own id.
    pub fn insert(&self, item: FeedItem, bytes: Option<Vec<u8>>) {
        let mut state = self.state.lock().unwrap();
        state.next_id = state.next_id.max(item.item_id);
        state.items.insert(item.item_id, StoredItem { item, bytes });
    }

    /// Remove an item, simulating upstream deletion.
    pub fn remove(&self, item_id: i64) {
        self.state.lock().unwrap().items.remove(&item_id);
    }

    /// Queue an error for the next source-side call.
    pub fn fail_next_read(&self, err: Error) {
        self.state.lock().unwrap().source_faults.push_back(err);
    }

    /// Queue an error for the next append call.
    pub fn fail_next_append(&self, err: Error) {
        self.state.lock().unwrap().append_faults.push_back(err);
    }

    /// Captions of appended items in sequence order, for assertions.
    pub fn captions(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.items.values().map(|s| s.item.caption.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SourceFeed for MemoryFeed {
    fn feed_id(&self) -> i64 {
        self.feed_id
    }

    fn next_after(&self, item_id: i64) -> Result<Option<FeedItem>> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.source_faults.pop_front() {
            return Err(err);
        }
        Ok(state
            .items
            .range(item_id + 1..)
            .next()
            .map(|(_, stored)| stored.item.clone()))
    }

    fn fetch(&self, item_id: i64) -> Result<Option<FeedItem>> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.source_faults.pop_front() {
            return Err(err);
        }
        Ok(state.items.get(&item_id).map(|stored| stored.item.clone()))
    }

    fn open_payload(&self, item_id: i64) -> Result<Option<Box<dyn Read + '_>>> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.source_faults.pop_front() {
            return Err(err);
        }
        let bytes = state.items.get(&item_id).and_then(|s| s.bytes.clone());
        Ok(bytes.map(|b| Box::new(Cursor::new(b)) as Box<dyn Read>))
    }
}

impl TargetFeed for MemoryFeed {
    fn feed_id(&self) -> i64 {
        self.feed_id
    }

    fn append(
        &self,
        name: &str,
        mime_type: Option<&str>,
        caption: &str,
        payload: &mut dyn Read,
    ) -> Result<i64> {
        let mut bytes = Vec::new();
        payload.read_to_end(&mut bytes)?;

        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.append_faults.pop_front() {
            return Err(err);
        }
        state.next_id += 1;
        let item_id = state.next_id;
        let item = FeedItem {
            item_id,
            caption: caption.to_string(),
            payload: Some(PayloadInfo {
                content_id: item_id,
                unique_id: format!("mem-{item_id}"),
                file_name: Some(name.to_string()),
                attr_name: None,
                byte_size: Some(bytes.len() as u64),
                mime_type: mime_type.map(str::to_string),
            }),
        };
        state.items.insert(
            item_id,
            StoredItem {
                item,
                bytes: Some(bytes),
            },
        );
        Ok(item_id)
    }
}

impl std::fmt::Debug for MemoryFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryFeed")
            .field("feed_id", &self.feed_id)
            .finish_non_exhaustive()
    }
}
