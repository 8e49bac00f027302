use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use serde::Serialize;

use crate::config::ResultSettings;
use crate::sanitize;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A finished output file waiting to be downloaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultArtifact {
    #[serde(skip)]
    pub path: PathBuf,
    /// Name offered to the client, e.g. `protect_people.csv`.
    pub filename: String,
    pub content_type: String,
    pub size: u64,
}

impl ResultArtifact {
    /// Describes an artifact already written to `path`.
    pub fn from_file(path: &Path, filename: &str) -> std::io::Result<Self> {
        let size = std::fs::metadata(path)?.len();
        Ok(Self {
            path: path.to_path_buf(),
            filename: filename.to_string(),
            content_type: content_type_for(filename),
            size,
        })
    }
}

/// Guesses the download content type from a filename.
pub fn content_type_for(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first()
        .map(|m| m.to_string())
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string())
}

/// Token-keyed store of completed artifacts.
///
/// Entries expire after the configured TTL or when the store is over
/// capacity; the artifact file is deleted from disk whenever its entry goes.
#[derive(Clone)]
pub struct ResultStore {
    cache: Cache<String, ResultArtifact>,
    ttl: Duration,
}

impl ResultStore {
    /// Over capacity, the least recently used artifact goes first; a fresh
    /// insert is always admitted.
    pub fn new(ttl: Duration, max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .eviction_policy(EvictionPolicy::lru())
            .time_to_live(ttl)
            .eviction_listener(on_evict)
            .build();

        Self { cache, ttl }
    }

    pub fn from_settings(settings: &ResultSettings) -> Self {
        Self::new(
            Duration::from_secs(settings.ttl_seconds),
            settings.max_entries,
        )
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn store(&self, token: &str, artifact: ResultArtifact) {
        debug!(
            "Storing result {} ({} bytes)",
            sanitize::redact_path(&artifact.path),
            artifact.size
        );
        self.cache.insert(token.to_string(), artifact);
    }

    /// Returns `None` for unknown or expired tokens.
    pub fn fetch(&self, token: &str) -> Option<ResultArtifact> {
        self.cache.get(token)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.cache.contains_key(token)
    }

    /// Drops the entry and deletes its file.
    pub fn remove(&self, token: &str) -> Option<ResultArtifact> {
        self.cache.remove(token)
    }

    /// Number of live entries after pending housekeeping.
    pub fn len(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs expiry now instead of waiting for the next write.
    pub fn purge_expired(&self) {
        self.cache.run_pending_tasks();
    }
}

fn on_evict(token: Arc<String>, artifact: ResultArtifact, cause: RemovalCause) {
    if cause == RemovalCause::Replaced {
        return;
    }

    match std::fs::remove_file(&artifact.path) {
        Ok(()) => debug!(
            "Deleted result {} for token {} ({:?})",
            sanitize::redact_path(&artifact.path),
            token,
            cause
        ),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            "Failed to delete result {}: {}",
            sanitize::redact_path(&artifact.path),
            e
        ),
    }
}
