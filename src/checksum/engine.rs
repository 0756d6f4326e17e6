// src/checksum/engine.rs

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use blake3::Hasher;
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::checksum::fingerprint::Fingerprint;
use crate::errors::{MonodagError, Result};
use crate::graph::{Workspace, WorkspaceGraph};

/// Target a dependency falls back to when it does not declare the one being
/// fingerprinted.
const FALLBACK_TARGET: &str = "build";

/// Computes content fingerprints for (workspace, target) pairs.
///
/// A fingerprint is a pure function of on-disk content at call time: hashes
/// are memoised only within a single top-level call, never across calls, so
/// file changes are always observed.
#[derive(Debug, Default)]
pub struct ChecksumEngine;

impl ChecksumEngine {
    pub fn new() -> Self {
        Self
    }

    /// Fingerprint a workspace's target: hash every file matched by the
    /// target's source globs, then fold in each direct dependency's own
    /// current digest.
    ///
    /// Fails with [`MonodagError::TargetNotFound`] if the workspace does not
    /// declare the target, and with [`MonodagError::Checksum`] on unreadable
    /// files; matched-but-missing inputs are never silently skipped.
    pub fn fingerprint(
        &self,
        graph: &WorkspaceGraph,
        workspace: &str,
        target: &str,
    ) -> Result<Fingerprint> {
        let ws = graph.get(workspace)?;
        if !ws.declares_target(target) {
            return Err(MonodagError::TargetNotFound {
                workspace: workspace.to_string(),
                target: target.to_string(),
            });
        }

        let mut memo = HashMap::new();
        let fp = self.fingerprint_inner(graph, ws, Some(target), &mut memo)?;
        debug!(
            workspace = %workspace,
            target = %target,
            digest = %fp.digest,
            files = fp.files.len(),
            "computed fingerprint"
        );
        Ok(fp)
    }

    fn fingerprint_inner(
        &self,
        graph: &WorkspaceGraph,
        ws: &Workspace,
        target: Option<&str>,
        memo: &mut HashMap<(String, Option<String>), Fingerprint>,
    ) -> Result<Fingerprint> {
        let key = (ws.name.clone(), target.map(|t| t.to_string()));
        if let Some(fp) = memo.get(&key) {
            return Ok(fp.clone());
        }

        let files = match target.and_then(|t| ws.target(t)) {
            Some(spec) => hash_workspace_files(&ws.name, &ws.root_path, &spec.source_globs)?,
            // No usable target: the workspace still contributes its
            // dependencies' digests, just no files of its own.
            None => BTreeMap::new(),
        };

        let mut deps = BTreeMap::new();
        for dep in graph.dependencies_of(&ws.name)? {
            let dep_target = resolve_dep_target(dep, target);
            let dep_fp = self.fingerprint_inner(graph, dep, dep_target.as_deref(), memo)?;
            deps.insert(dep.name.clone(), dep_fp.digest);
        }

        let fp = Fingerprint::new(files, deps);
        memo.insert(key, fp.clone());
        Ok(fp)
    }
}

/// Pick which target a dependency is fingerprinted with: the same target if
/// declared, else `build`, else the first declared target.
fn resolve_dep_target(dep: &Workspace, target: Option<&str>) -> Option<String> {
    if let Some(t) = target {
        if dep.declares_target(t) {
            return Some(t.to_string());
        }
    }
    if dep.declares_target(FALLBACK_TARGET) {
        return Some(FALLBACK_TARGET.to_string());
    }
    dep.targets.keys().next().cloned()
}

/// Hash every file under `root` matched by `globs`, keyed by relative path.
fn hash_workspace_files(
    workspace: &str,
    root: &Path,
    globs: &[String],
) -> Result<BTreeMap<String, String>> {
    if globs.is_empty() {
        return Ok(BTreeMap::new());
    }

    let glob_set = build_globset(workspace, globs)?;
    let mut files = BTreeMap::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| MonodagError::Checksum {
            workspace: workspace.to_string(),
            message: format!("walking {:?}: {e}", root),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = match entry.path().strip_prefix(root) {
            Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
            Err(_) => continue,
        };
        if !glob_set.is_match(&rel) {
            continue;
        }

        trace!(workspace = %workspace, path = %rel, "hashing source file");
        let hash = hash_file(entry.path()).map_err(|e| MonodagError::Checksum {
            workspace: workspace.to_string(),
            message: format!("reading {rel}: {e}"),
        })?;
        files.insert(rel, hash);
    }

    Ok(files)
}

/// Streaming blake3 of one file's bytes. Content, not mtime: CI checkouts
/// reset mtimes, so mtime-based invalidation would never hit.
fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Hasher::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

fn build_globset(workspace: &str, patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).map_err(|e| MonodagError::Checksum {
            workspace: workspace.to_string(),
            message: format!("invalid glob pattern '{pat}': {e}"),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| MonodagError::Checksum {
        workspace: workspace.to_string(),
        message: format!("building glob set: {e}"),
    })
}
