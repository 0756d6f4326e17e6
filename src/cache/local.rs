// src/cache/local.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::cache::entry::CacheEntry;
use crate::errors::Result;

/// Filesystem cache tier.
///
/// Layout: one subdirectory per workspace, one TOML file per target:
/// `<root>/<workspace>/<target>.toml`. Directories are created lazily on the
/// first write. Last-writer-wins on concurrent writes is acceptable because
/// entries are content-keyed: two writers with the same fingerprint produce
/// identical bytes.
#[derive(Debug, Clone)]
pub struct LocalCache {
    root: PathBuf,
}

impl LocalCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, workspace: &str, target: &str) -> PathBuf {
        self.root.join(workspace).join(format!("{target}.toml"))
    }

    /// Read the stored entry for a (workspace, target) pair.
    ///
    /// A missing file is a plain miss. An unreadable or unparsable file is
    /// *also* a miss, logged at warn: a cache is a pure optimization and must
    /// never be able to break a build.
    pub fn read(&self, workspace: &str, target: &str) -> Option<CacheEntry> {
        let path = self.entry_path(workspace, target);
        if !path.is_file() {
            return None;
        }

        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                warn!(
                    workspace = %workspace,
                    target = %target,
                    error = %e,
                    "unreadable local cache entry; treating as miss"
                );
                return None;
            }
        };

        match toml::from_str::<CacheEntry>(&contents) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(
                    workspace = %workspace,
                    target = %target,
                    error = %e,
                    "corrupt local cache entry; treating as miss"
                );
                None
            }
        }
    }

    /// Persist an entry, creating the workspace cache directory lazily.
    pub fn write(&self, entry: &CacheEntry) -> Result<()> {
        let path = self.entry_path(&entry.workspace, &entry.target);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents =
            toml::to_string(entry).map_err(|e| anyhow::anyhow!("serializing cache entry: {e}"))?;
        fs::write(&path, contents)?;

        debug!(
            workspace = %entry.workspace,
            target = %entry.target,
            digest = %entry.digest(),
            "wrote local cache entry"
        );
        Ok(())
    }

    /// Remove the local entry. Remote entries are immutable history and are
    /// never deleted from here.
    pub fn invalidate(&self, workspace: &str, target: &str) -> Result<()> {
        let path = self.entry_path(workspace, target);
        if path.is_file() {
            fs::remove_file(&path)?;
            debug!(workspace = %workspace, target = %target, "invalidated local cache entry");
        }
        Ok(())
    }
}
