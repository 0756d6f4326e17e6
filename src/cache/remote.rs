// src/cache/remote.rs

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::model::RemoteSection;
use crate::exec::BoxFuture;

/// Abstract remote cache backend: an object store for artifact blobs plus a
/// table-like index store for small digest records.
///
/// The production implementation lives outside this crate (it talks to real
/// cloud services); the scheduler only ever sees this contract. Transport
/// errors are surfaced as `Err` and the caller degrades them to cache misses.
pub trait RemoteBackend: Send + Sync {
    fn put_object(&self, key: String, bytes: Vec<u8>) -> BoxFuture<anyhow::Result<()>>;
    fn get_object(&self, key: String) -> BoxFuture<anyhow::Result<Option<Vec<u8>>>>;
    fn put_index(&self, key: String, record: IndexRecord) -> BoxFuture<anyhow::Result<()>>;
    fn get_index(&self, key: String) -> BoxFuture<anyhow::Result<Option<IndexRecord>>>;
}

/// Small record stored in the index tier: digest -> artifact locator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub fingerprint_digest: String,
    pub artifact_locator: String,
    pub created_at: u64,
}

/// Where remote entries live: `(region, bucket/table, workspace, target, env)`
/// address every object and index record.
#[derive(Debug, Clone)]
pub struct RemoteAddress {
    pub region: String,
    pub bucket: String,
    pub table: String,
    pub env: String,
}

impl RemoteAddress {
    pub fn from_config(remote: &RemoteSection) -> Self {
        Self {
            region: remote.region.clone(),
            bucket: remote.bucket.clone(),
            table: remote.table.clone(),
            env: remote.env.clone(),
        }
    }

    /// Key for the artifact object of one fingerprint.
    pub fn object_key(&self, workspace: &str, target: &str, digest: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.bucket, self.env, workspace, target, digest
        )
    }

    /// Key for the latest index record of a (workspace, target) pair.
    pub fn index_key(&self, workspace: &str, target: &str) -> String {
        format!("{}/{}/{}/{}", self.table, self.env, workspace, target)
    }
}

/// Bounded-attempt retry with a fixed backoff, passed into the cache store
/// explicitly rather than living in an ambient global retry loop.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(remote: &RemoteSection) -> Self {
        Self {
            attempts: remote.retry_attempts.max(1),
            backoff: Duration::from_millis(remote.retry_backoff_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 2,
            backoff: Duration::from_millis(250),
        }
    }
}
