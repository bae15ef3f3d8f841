//! Named key/value stores with expiry
//!
//! A [`DataStore`] is a small persistent map living under the cache root,
//! used for data that is expensive to recompute but allowed to go stale,
//! such as the program-ID cache. Items carry an absolute expiry time and
//! expired items are dropped on read.

use crate::commit::commit_record;
use bcache_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize)]
struct StoreItem {
    value: String,
    expires_at: u64,
}

/// A named persistent key/value store with per-item TTL
#[derive(Debug)]
pub struct DataStore {
    dir: PathBuf,
}

impl DataStore {
    /// Open the store with the given name under the cache root
    pub fn new(root: &Path, name: &str) -> Self {
        Self {
            dir: root.join(name),
        }
    }

    fn item_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Get a stored value; absent and expired items both return `None`
    pub fn get_item(&self, key: &str) -> Option<String> {
        let path = self.item_path(key);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("failed to read store item {}: {e}", path.display());
                return None;
            }
        };

        let item: StoreItem = match serde_json::from_str(&content) {
            Ok(item) => item,
            Err(e) => {
                warn!("corrupt store item {}: {e}", path.display());
                let _ = fs::remove_file(&path);
                return None;
            }
        };

        if item.expires_at <= unix_now() {
            debug!("store item expired: {key}");
            let _ = fs::remove_file(&path);
            return None;
        }

        Some(item.value)
    }

    /// Upsert a value with expiry `now + ttl`
    pub fn store_item(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let item = StoreItem {
            value: value.to_string(),
            expires_at: unix_now() + ttl.as_secs(),
        };
        let content = serde_json::to_string(&item).map_err(Error::from)?;
        commit_record(&self.item_path(key), &content)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
