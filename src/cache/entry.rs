// src/cache/entry.rs

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::checksum::Fingerprint;

/// One stored target result, keyed by fingerprint.
///
/// Entries are immutable once written: a changed fingerprint produces a new
/// entry, never an in-place update. Local entries carry the full fingerprint
/// (per-path hashes and dependency digests); entries reconstructed from a
/// remote index record carry only the aggregate digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub workspace: String,
    pub target: String,
    /// Unix seconds at write time.
    pub created_at: u64,
    /// Locator for the stored artifact (remote object key, file path, ...),
    /// or `None` when the result carries no artifact.
    pub artifact_locator: Option<String>,
    pub fingerprint: Fingerprint,
}

impl CacheEntry {
    pub fn new(
        workspace: impl Into<String>,
        target: impl Into<String>,
        fingerprint: Fingerprint,
        artifact_locator: Option<String>,
    ) -> Self {
        Self {
            workspace: workspace.into(),
            target: target.into(),
            created_at: unix_now(),
            artifact_locator,
            fingerprint,
        }
    }

    pub fn digest(&self) -> &str {
        &self.fingerprint.digest
    }

    /// Whether this entry is a hit for the current fingerprint.
    ///
    /// The per-key comparison is authoritative when the entry carries the
    /// full maps; digest-only entries (remote index records) fall back to
    /// comparing aggregate digests.
    pub fn matches(&self, current: &Fingerprint) -> bool {
        if self.fingerprint.files.is_empty() && self.fingerprint.deps.is_empty() {
            self.fingerprint.digest == current.digest
        } else {
            !Fingerprint::changed(Some(&self.fingerprint), current)
        }
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
