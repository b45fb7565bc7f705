//! Durable record of the last network-resolved driver version.
//!
//! The cache stores what was last *resolved*, not what is installed on disk;
//! the engine consults both independently because a user may delete the
//! binary without clearing the cache, or vice versa.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::UpdaterError;
use crate::version::Version;

/// One cached resolution for a driver key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub version: Version,
    /// Unix timestamp (seconds) of the fetch that produced this entry.
    pub fetched_at: u64,
}

/// Key→(version, timestamp) store. Freshness is the engine's concern, not the
/// store's. Entries are advisory hints: a lost or stale write only costs one
/// extra network call, never a wrong install.
pub trait CacheStore: Send + Sync {
    /// Must return `Ok(None)` when the underlying storage doesn't exist yet.
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, UpdaterError>;

    /// Creates the underlying storage if needed. Last-writer-wins across
    /// concurrent processes.
    fn put(&self, key: &str, version: &Version, fetched_at: u64) -> Result<(), UpdaterError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    version: String,
    fetched_at: u64,
}

/// File-backed [`CacheStore`]: a single JSON document mapping driver keys to
/// records.
pub struct JsonFileCache {
    path: PathBuf,
}

impl JsonFileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileCache { path: path.into() }
    }

    fn read_all(&self) -> HashMap<String, StoredEntry> {
        let Ok(raw) = fs::read_to_string(&self.path) else {
            return HashMap::new();
        };
        match serde_json::from_str(&raw) {
            Ok(map) => map,
            Err(e) => {
                // Corrupt cache data is advisory; start over rather than fail.
                debug!("Ignoring unreadable cache file {:?}: {e}", self.path);
                HashMap::new()
            }
        }
    }
}

impl CacheStore for JsonFileCache {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, UpdaterError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let map = self.read_all();
        let Some(stored) = map.get(key) else {
            return Ok(None);
        };
        match Version::parse(&stored.version) {
            Ok(version) => Ok(Some(CacheEntry {
                version,
                fetched_at: stored.fetched_at,
            })),
            Err(_) => {
                debug!("Ignoring cache entry for '{key}' with bad version '{}'", stored.version);
                Ok(None)
            }
        }
    }

    fn put(&self, key: &str, version: &Version, fetched_at: u64) -> Result<(), UpdaterError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| UpdaterError::IoError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let mut map = self.read_all();
        map.insert(
            key.to_string(),
            StoredEntry {
                version: version.to_string(),
                fetched_at,
            },
        );
        let body = serde_json::to_string_pretty(&map).map_err(|e| UpdaterError::IoError {
            path: self.path.clone(),
            source: std::io::Error::other(e),
        })?;
        fs::write(&self.path, body).map_err(|e| UpdaterError::IoError {
            path: self.path.clone(),
            source: e,
        })
    }
}

// --- Tests ---
