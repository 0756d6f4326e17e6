// src/cache/store.rs

use std::path::PathBuf;
use std::sync::Arc;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::cache::entry::CacheEntry;
use crate::cache::local::LocalCache;
use crate::cache::remote::{IndexRecord, RemoteAddress, RemoteBackend, RetryPolicy};
use crate::checksum::Fingerprint;
use crate::errors::Result;

/// Remote tier configuration: backend, addressing, and retry bounds.
#[derive(Clone)]
pub struct RemoteTier {
    pub backend: Arc<dyn RemoteBackend>,
    pub address: RemoteAddress,
    pub retry: RetryPolicy,
}

/// Two-tier cache: local filesystem plus an optional remote object/index
/// store. Absent remote configuration means local-only mode.
///
/// Remote reads and writes never error out of here: transient transport
/// failures degrade to "miss" / "not written" with a warn log, because an
/// unavailable cache must never block a build.
#[derive(Clone)]
pub struct CacheStore {
    local: LocalCache,
    remote: Option<RemoteTier>,
}

impl CacheStore {
    pub fn new(local_root: impl Into<PathBuf>) -> Self {
        Self {
            local: LocalCache::new(local_root),
            remote: None,
        }
    }

    pub fn with_remote(mut self, tier: RemoteTier) -> Self {
        self.remote = Some(tier);
        self
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Remote object key a new entry's artifact will live under, if a remote
    /// tier is configured. Used as the entry's artifact locator.
    pub fn remote_object_key(
        &self,
        workspace: &str,
        target: &str,
        digest: &str,
    ) -> Option<String> {
        self.remote
            .as_ref()
            .map(|tier| tier.address.object_key(workspace, target, digest))
    }

    /// Read the local tier.
    pub fn read_local(&self, workspace: &str, target: &str) -> Option<CacheEntry> {
        self.local.read(workspace, target)
    }

    /// Write the local tier.
    pub fn write_local(&self, entry: &CacheEntry) -> Result<()> {
        self.local.write(entry)
    }

    /// Remove the local entry only; remote entries are immutable history.
    pub fn invalidate(&self, workspace: &str, target: &str) -> Result<()> {
        self.local.invalidate(workspace, target)
    }

    /// Read the remote index for a (workspace, target) pair.
    ///
    /// `None` when no remote is configured, the record is absent, or the
    /// transport keeps failing past the retry bound.
    pub async fn read_remote(&self, workspace: &str, target: &str) -> Option<CacheEntry> {
        let tier = self.remote.as_ref()?;
        let key = tier.address.index_key(workspace, target);

        let record = retry(tier.retry, || tier.backend.get_index(key.clone())).await;
        match record {
            Ok(Some(record)) => {
                debug!(
                    workspace = %workspace,
                    target = %target,
                    digest = %record.fingerprint_digest,
                    "remote cache index hit"
                );
                Some(CacheEntry {
                    workspace: workspace.to_string(),
                    target: target.to_string(),
                    created_at: record.created_at,
                    artifact_locator: Some(record.artifact_locator),
                    fingerprint: Fingerprint::from_digest(record.fingerprint_digest),
                })
            }
            Ok(None) => None,
            Err(e) => {
                warn!(
                    workspace = %workspace,
                    target = %target,
                    error = %e,
                    "remote cache read failed; treating as miss"
                );
                None
            }
        }
    }

    /// Best-effort remote write: artifact object first, then the index
    /// record pointing at it. Failures are logged, never surfaced.
    pub async fn write_remote(&self, entry: &CacheEntry, artifact: Vec<u8>) {
        let Some(tier) = self.remote.as_ref() else {
            return;
        };

        let object_key = tier
            .address
            .object_key(&entry.workspace, &entry.target, entry.digest());
        let index_key = tier.address.index_key(&entry.workspace, &entry.target);

        let put = retry(tier.retry, || {
            tier.backend.put_object(object_key.clone(), artifact.clone())
        })
        .await;
        if let Err(e) = put {
            warn!(
                workspace = %entry.workspace,
                target = %entry.target,
                error = %e,
                "remote artifact write failed; skipping index record"
            );
            return;
        }

        let record = IndexRecord {
            fingerprint_digest: entry.digest().to_string(),
            artifact_locator: object_key,
            created_at: entry.created_at,
        };
        let put = retry(tier.retry, || {
            tier.backend.put_index(index_key.clone(), record.clone())
        })
        .await;
        match put {
            Ok(()) => debug!(
                workspace = %entry.workspace,
                target = %entry.target,
                "wrote remote cache entry"
            ),
            Err(e) => warn!(
                workspace = %entry.workspace,
                target = %entry.target,
                error = %e,
                "remote index write failed"
            ),
        }
    }
}

/// Bounded-attempt retry with fixed backoff between attempts.
async fn retry<T, F>(policy: RetryPolicy, mut op: F) -> anyhow::Result<T>
where
    F: FnMut() -> crate::exec::BoxFuture<anyhow::Result<T>>,
{
    let mut last_err = None;
    for attempt in 1..=policy.attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                debug!(attempt, error = %e, "remote cache operation failed");
                last_err = Some(e);
                if attempt < policy.attempts {
                    sleep(policy.backoff).await;
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("remote operation failed")))
}
