use std::{
    collections::BTreeMap,
    collections::hash_map::DefaultHasher,
    fs::File,
    hash::{Hash, Hasher},
    io::Read,
    path::{Path, PathBuf},
};

use crate::{
    error::{Error, Result},
    feed::{FeedItem, PayloadInfo, SourceFeed, TargetFeed, resolve_feed_ident},
};

/// Optional spool manifest declaring the directory's actual feed id.
const FEED_ID_FILE: &str = ".feed-id";

/// A feed backed by a local spool directory.
///
/// Payload files are named `<seq>-<name>` (the sequence id is the feed's
/// item id). Two optional sidecars per item: `<seq>.caption.txt` holds the
/// caption, `<seq>.name.txt` holds a display name for payloads whose file
/// name carries none. A caption sidecar without a payload file yields a
/// payload-less item. Hidden files and names without a numeric prefix are
/// ignored.
///
/// The same directory can be appended to, which makes `FsFeed` usable as
/// either end of the forwarding pipeline.
pub struct FsFeed {
    feed_id: i64,
    root: PathBuf,
}

#[derive(Debug, Default)]
struct ItemFiles {
    payload: Option<PathBuf>,
    /// Name portion of the payload file, empty when absent.
    name_part: String,
    caption: Option<PathBuf>,
    name_sidecar: Option<PathBuf>,
}

impl FsFeed {
    /// Open a spool directory as a feed.
    ///
    /// When the directory carries a `.feed-id` manifest, the configured
    /// identifier is resolved against it once here (a bare id is accepted
    /// in literal or private-prefixed form) and the resolved id is cached
    /// for the lifetime of the feed.
    pub fn open(root: &Path, feed_id: i64) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::Config(format!(
                "feed directory does not exist: {}",
                root.display()
            )));
        }

        let feed_id = match std::fs::read_to_string(root.join(FEED_ID_FILE)) {
            Ok(contents) => {
                let declared =
                    contents.trim().parse::<i64>().map_err(|_| {
                        Error::Config(format!(
                            "malformed {FEED_ID_FILE} in {}",
                            root.display()
                        ))
                    })?;
                resolve_feed_ident(feed_id, declared)?
            }
            Err(_) => feed_id,
        };

        Ok(Self {
            feed_id,
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The resolved feed identifier.
    pub fn feed_id(&self) -> i64 {
        self.feed_id
    }

    /// Scan the spool directory into `seq -> files`, sequence order.
    ///
    /// Re-scanned on every call so items dropped into the spool between
    /// calls are picked up; nothing is cached across calls.
    fn scan(&self) -> Result<BTreeMap<i64, ItemFiles>> {
        let mut items: BTreeMap<i64, ItemFiles> = BTreeMap::new();

        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            if name.starts_with('.') {
                continue;
            }

            let digits: String =
                name.chars().take_while(char::is_ascii_digit).collect();
            if digits.is_empty() {
                continue;
            }
            let Ok(seq) = digits.parse::<i64>() else {
                continue;
            };
            let rest = &name[digits.len()..];

            let files = items.entry(seq).or_default();
            if let Some(part) = rest.strip_prefix('-') {
                files.payload = Some(entry.path());
                files.name_part = part.to_string();
            } else if rest == ".caption.txt" {
                files.caption = Some(entry.path());
            } else if rest == ".name.txt" {
                files.name_sidecar = Some(entry.path());
            } else if rest.is_empty() {
                // Bare `<seq>` payload with no name at all.
                files.payload = Some(entry.path());
            }
        }

        Ok(items)
    }

    fn build_item(&self, seq: i64, files: &ItemFiles) -> Result<FeedItem> {
        let caption = match &files.caption {
            Some(path) => std::fs::read_to_string(path)?.trim().to_string(),
            None => String::new(),
        };

        let payload = match &files.payload {
            Some(path) => {
                let byte_size = std::fs::metadata(path)?.len();
                let file_name = (!files.name_part.is_empty())
                    .then(|| files.name_part.clone());
                let attr_name = match &files.name_sidecar {
                    Some(sidecar) => std::fs::read_to_string(sidecar)?
                        .lines()
                        .next()
                        .map(|l| l.trim().to_string())
                        .filter(|l| !l.is_empty()),
                    None => None,
                };
                let key_name = file_name
                    .as_deref()
                    .or(attr_name.as_deref())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{seq}"));
                Some(PayloadInfo {
                    content_id: seq,
                    unique_id: content_key(&key_name, byte_size),
                    file_name,
                    attr_name,
                    byte_size: Some(byte_size),
                    mime_type: None,
                })
            }
            None => None,
        };

        Ok(FeedItem {
            item_id: seq,
            caption,
            payload,
        })
    }
}

/// Stable payload identifier derived from the display name and size.
fn content_key(name: &str, size: u64) -> String {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    size.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

impl SourceFeed for FsFeed {
    fn feed_id(&self) -> i64 {
        self.feed_id
    }

    fn next_after(&self, item_id: i64) -> Result<Option<FeedItem>> {
        let items = self.scan()?;
        match items.range(item_id + 1..).next() {
            Some((&seq, files)) => Ok(Some(self.build_item(seq, files)?)),
            None => Ok(None),
        }
    }

    fn fetch(&self, item_id: i64) -> Result<Option<FeedItem>> {
        let items = self.scan()?;
        match items.get(&item_id) {
            Some(files) => Ok(Some(self.build_item(item_id, files)?)),
            None => Ok(None),
        }
    }

    fn open_payload(&self, item_id: i64) -> Result<Option<Box<dyn Read + '_>>> {
        let items = self.scan()?;
        match items.get(&item_id).and_then(|f| f.payload.as_ref()) {
            Some(path) => Ok(Some(Box::new(File::open(path)?))),
            None => Ok(None),
        }
    }
}

impl TargetFeed for FsFeed {
    fn feed_id(&self) -> i64 {
        self.feed_id
    }

    fn append(
        &self,
        name: &str,
        _mime_type: Option<&str>,
        caption: &str,
        payload: &mut dyn Read,
    ) -> Result<i64> {
        let items = self.scan()?;
        let item_id = items.keys().next_back().copied().unwrap_or(0) + 1;

        // Path separators would escape the spool directory.
        let safe_name: String = name
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();

        let payload_path = self.root.join(format!("{item_id:06}-{safe_name}"));
        let mut out = File::create(&payload_path)?;
        std::io::copy(payload, &mut out)?;

        if !caption.is_empty() {
            let caption_path =
                self.root.join(format!("{item_id:06}.caption.txt"));
            std::fs::write(&caption_path, caption)?;
        }

        Ok(item_id)
    }
}

impl std::fmt::Debug for FsFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsFeed")
            .field("feed_id", &self.feed_id)
            .field("root", &self.root)
            .finish()
    }
}
