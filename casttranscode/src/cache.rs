//! Bookkeeping of produced transcodes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, warn};

/// Identity of one transcode request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TranscodeKey {
    pub source: PathBuf,
    pub subtitle: Option<u32>,
    pub audio: Option<u32>,
}

impl TranscodeKey {
    pub fn new(source: &Path, subtitle: Option<u32>, audio: Option<u32>) -> Self {
        Self {
            source: source.to_path_buf(),
            subtitle,
            audio,
        }
    }
}

/// A file produced by the encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputArtifact {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl OutputArtifact {
    pub fn new(path: PathBuf, ttl: Duration) -> Self {
        let created_at = Utc::now();
        let expires_at = TimeDelta::from_std(ttl)
            .ok()
            .and_then(|ttl| created_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            path,
            created_at,
            expires_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// TTL map from request to artifact.
///
/// An entry is a hit only while unexpired and present on disk. Expired
/// entries are purged lazily, their files removed.
#[derive(Debug, Default)]
pub struct ArtifactCache {
    entries: HashMap<TranscodeKey, OutputArtifact>,
}

impl ArtifactCache {
    pub fn lookup(&mut self, key: &TranscodeKey) -> Option<PathBuf> {
        self.purge_expired(Utc::now());

        let artifact = self.entries.get(key)?;
        if artifact.path.is_file() {
            return Some(artifact.path.clone());
        }

        debug!("Cached artifact {} vanished", artifact.path.display());
        self.entries.remove(key);
        None
    }

    pub fn insert(&mut self, key: TranscodeKey, artifact: OutputArtifact) {
        self.entries.insert(key, artifact);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn purge_expired(&mut self, now: DateTime<Utc>) {
        self.entries.retain(|_, artifact| {
            if !artifact.is_expired(now) {
                return true;
            }
            debug!("Artifact {} expired", artifact.path.display());
            remove_quietly(&artifact.path);
            false
        });
    }

    /// Drops every entry and deletes the files.
    pub fn clear(&mut self) {
        for (_, artifact) in self.entries.drain() {
            remove_quietly(&artifact.path);
        }
    }
}

pub(crate) fn remove_quietly(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Cannot remove {}: {}", path.display(), e),
    }
}
