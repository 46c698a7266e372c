//! Response cache
//!
//! Exact-match, content-addressed store of completed answers. Each entry is an
//! independent JSON file named by its fingerprint:
//! `{dir}/{fingerprint}.json`
//!
//! There are no indexes; stats and expiry are full directory sweeps. Entries
//! that fail to decode or have expired are deleted on sight and reported as
//! misses, never as errors.

pub mod key;

use crate::error::StorageError;
use crate::provider::QueryResponse;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub use key::{fingerprint, is_fingerprint};

const ENTRY_EXTENSION: &str = "json";

/// A persisted response record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub command: String,
    pub question: String,
    pub model: String,
    pub response: QueryResponse,
    pub created_at: DateTime<Utc>,
    pub accessed_at: DateTime<Utc>,
    pub access_count: u64,
}

/// Aggregate view over every readable entry
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_size_bytes: u64,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
    pub total_hits: u64,
}

pub struct CacheStore {
    dir: PathBuf,
    max_age_days: i64,
}

impl CacheStore {
    /// Open (creating if needed) a store rooted at `dir`.
    ///
    /// `max_age_days <= 0` disables expiry.
    pub fn new<P: AsRef<Path>>(dir: P, max_age_days: i64) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        create_private_dir(&dir).map_err(|e| {
            StorageError::DirectoryUnavailable(format!("{}: {}", dir.display(), e))
        })?;
        Ok(Self { dir, max_age_days })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_age_days(&self) -> i64 {
        self.max_age_days
    }

    /// Look up a response, bumping its access metadata on a hit.
    pub fn get(
        &self,
        tool: &str,
        question: &str,
        model: &str,
    ) -> Result<Option<QueryResponse>, StorageError> {
        let key = fingerprint(tool, question, model);
        let path = self.entry_path(&key);

        let mut entry = match self.read_entry(&path) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                debug!(key = %key, "Cache miss");
                return Ok(None);
            }
            Err(StorageError::InvalidEntry { path, reason }) => {
                warn!(path = %path.display(), reason = %reason, "Removing unreadable cache entry");
                remove_quietly(&path);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if entry.key != key {
            warn!(path = %path.display(), "Removing cache entry stored under the wrong key");
            remove_quietly(&path);
            return Ok(None);
        }

        if self.is_expired(&entry, Utc::now()) {
            debug!(key = %key, created_at = %entry.created_at, "Cache entry expired");
            remove_quietly(&path);
            return Ok(None);
        }

        entry.accessed_at = Utc::now();
        entry.access_count += 1;
        if let Err(e) = self.write_entry(&entry) {
            // The hit is still good; only the bookkeeping is lost.
            warn!(key = %key, error = %e, "Failed to update cache access metadata");
        }

        debug!(key = %key, access_count = entry.access_count, "Cache hit");
        let mut response = entry.response;
        response.cached = true;
        Ok(Some(response))
    }

    /// Store a response, replacing any entry with the same fingerprint.
    pub fn set(
        &self,
        tool: &str,
        question: &str,
        model: &str,
        response: &QueryResponse,
    ) -> Result<(), StorageError> {
        let now = Utc::now();
        let mut response = response.clone();
        response.cached = false;

        let entry = CacheEntry {
            key: fingerprint(tool, question, model),
            command: tool.to_string(),
            question: question.to_string(),
            model: model.to_string(),
            response,
            created_at: now,
            accessed_at: now,
            access_count: 1,
        };
        self.write_entry(&entry)
    }

    /// Delete every expired entry, returning how many were removed.
    pub fn clean_expired(&self) -> Result<usize, StorageError> {
        let now = Utc::now();
        let mut removed = 0;
        for path in self.entry_paths()? {
            let entry = match self.read_entry(&path) {
                Ok(Some(entry)) => entry,
                // Unreadable entries are left for `get` to heal
                _ => continue,
            };
            if self.is_expired(&entry, now) && fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        debug!(removed, "Cleaned expired cache entries");
        Ok(removed)
    }

    /// Delete every entry unconditionally.
    pub fn clear(&self) -> Result<usize, StorageError> {
        let mut removed = 0;
        for path in self.entry_paths()? {
            if fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        debug!(removed, "Cleared cache");
        Ok(removed)
    }

    pub fn stats(&self) -> Result<CacheStats, StorageError> {
        let mut stats = CacheStats::default();
        for path in self.entry_paths()? {
            let Ok(metadata) = fs::metadata(&path) else {
                continue;
            };
            stats.total_entries += 1;
            stats.total_size_bytes += metadata.len();

            let Ok(Some(entry)) = self.read_entry(&path) else {
                continue;
            };
            stats.total_hits += entry.access_count;
            if stats.oldest_entry.map_or(true, |t| entry.created_at < t) {
                stats.oldest_entry = Some(entry.created_at);
            }
            if stats.newest_entry.map_or(true, |t| entry.created_at > t) {
                stats.newest_entry = Some(entry.created_at);
            }
        }
        Ok(stats)
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key, ENTRY_EXTENSION))
    }

    fn is_expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        if self.max_age_days <= 0 {
            return false;
        }
        now - entry.created_at > Duration::days(self.max_age_days)
    }

    /// `Ok(None)` if no file exists, `InvalidEntry` if it cannot be decoded.
    fn read_entry(&self, path: &Path) -> Result<Option<CacheEntry>, StorageError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::IoError(e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StorageError::InvalidEntry {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    /// Write to a temp file, then rename over the final path.
    fn write_entry(&self, entry: &CacheEntry) -> Result<(), StorageError> {
        let path = self.entry_path(&entry.key);
        let temp_path = path.with_extension("json.tmp");

        let serialized = serde_json::to_vec_pretty(entry)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        create_private_dir(&self.dir).map_err(|e| {
            StorageError::DirectoryUnavailable(format!("{}: {}", self.dir.display(), e))
        })?;

        let mut file = open_private_file(&temp_path)?;
        if let Err(e) = file.write_all(&serialized).and_then(|_| file.sync_all()) {
            remove_quietly(&temp_path);
            return Err(StorageError::IoError(e));
        }
        drop(file);

        fs::rename(&temp_path, &path).map_err(|e| {
            remove_quietly(&temp_path);
            StorageError::IoError(e)
        })
    }

    fn entry_paths(&self) -> Result<Vec<PathBuf>, StorageError> {
        let reader = match fs::read_dir(&self.dir) {
            Ok(reader) => reader,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::IoError(e)),
        };

        let mut paths = Vec::new();
        for dir_entry in reader {
            let path = dir_entry?.path();
            let named_like_entry = path.extension().and_then(|e| e.to_str())
                == Some(ENTRY_EXTENSION)
                && path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map_or(false, is_fingerprint);
            if named_like_entry && path.is_file() {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove cache file");
        }
    }
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn open_private_file(path: &Path) -> Result<fs::File, StorageError> {
    use std::os::unix::fs::OpenOptionsExt;
    Ok(fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?)
}

#[cfg(not(unix))]
fn open_private_file(path: &Path) -> Result<fs::File, StorageError> {
    Ok(fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?)
}
