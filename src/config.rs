use std::{path::PathBuf, time::Duration};

use crate::error::{Error, Result};

/// A feed to operate on: its identifier and its spool directory.
#[derive(Debug, Clone)]
pub struct FeedLocation {
    pub feed_id: i64,
    pub dir: PathBuf,
}

/// Settings sourced from the environment.
///
/// Required values are fatal when absent; nothing is silently defaulted
/// except the documented numeric tunables.
#[derive(Debug, Clone)]
pub struct Settings {
    pub source: FeedLocation,
    pub target: Option<FeedLocation>,
    pub max_forward_bytes: u64,
    pub index_throttle: Duration,
    pub forward_throttle: Duration,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup, so tests need not touch the
    /// process environment.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let source = FeedLocation {
            feed_id: parse_i64(
                "FEEDVAULT_SOURCE_FEED",
                &required(&lookup, "FEEDVAULT_SOURCE_FEED")?,
            )?,
            dir: PathBuf::from(required(&lookup, "FEEDVAULT_SOURCE_DIR")?),
        };

        let target_feed = non_empty(&lookup, "FEEDVAULT_TARGET_FEED");
        let target_dir = non_empty(&lookup, "FEEDVAULT_TARGET_DIR");
        let target = match (target_feed, target_dir) {
            (Some(feed), Some(dir)) => Some(FeedLocation {
                feed_id: parse_i64("FEEDVAULT_TARGET_FEED", &feed)?,
                dir: PathBuf::from(dir),
            }),
            (None, None) => None,
            _ => {
                return Err(Error::Config(
                    "FEEDVAULT_TARGET_FEED and FEEDVAULT_TARGET_DIR must be \
                     set together"
                        .to_string(),
                ));
            }
        };

        Ok(Self {
            source,
            target,
            max_forward_bytes: parse_u64_or(
                &lookup,
                "FEEDVAULT_MAX_FORWARD_BYTES",
                crate::forwarder::MAX_FORWARD_BYTES,
            )?,
            index_throttle: Duration::from_millis(parse_u64_or(
                &lookup,
                "FEEDVAULT_INDEX_THROTTLE_MS",
                150,
            )?),
            forward_throttle: Duration::from_millis(parse_u64_or(
                &lookup,
                "FEEDVAULT_FORWARD_THROTTLE_MS",
                1500,
            )?),
        })
    }

    /// The target feed, required by the forwarding pipeline.
    pub fn target(&self) -> Result<&FeedLocation> {
        self.target.as_ref().ok_or_else(|| {
            Error::Config(
                "FEEDVAULT_TARGET_FEED and FEEDVAULT_TARGET_DIR are required \
                 for forwarding"
                    .to_string(),
            )
        })
    }
}

fn non_empty(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<String> {
    lookup(key).filter(|v| !v.is_empty())
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<String> {
    non_empty(lookup, key).ok_or_else(|| {
        Error::Config(format!("missing required environment variable: {key}"))
    })
}

fn parse_i64(key: &str, value: &str) -> Result<i64> {
    value.parse().map_err(|_| {
        Error::Config(format!("{key} is not a valid integer: {value:?}"))
    })
}

fn parse_u64_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> Result<u64> {
    match non_empty(lookup, key) {
        Some(value) => value.parse().map_err(|_| {
            Error::Config(format!("{key} is not a valid integer: {value:?}"))
        }),
        None => Ok(default),
    }
}
