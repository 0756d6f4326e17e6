// src/watch/profiles.rs

use std::fmt;
use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::errors::{MonodagError, Result};
use crate::graph::WorkspaceGraph;

/// Compiled change-detection profile for one workspace.
///
/// Matches paths relative to the project root: the path must sit under the
/// workspace's root directory and match one of the workspace's source globs
/// (the union across its targets — any source change invalidates).
#[derive(Clone)]
pub struct WorkspaceWatchProfile {
    name: String,
    /// Workspace root relative to the project root, forward slashes, no
    /// trailing slash. Empty when the workspace root *is* the project root.
    root_rel: String,
    sources: GlobSet,
}

impl fmt::Debug for WorkspaceWatchProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkspaceWatchProfile")
            .field("name", &self.name)
            .field("root_rel", &self.root_rel)
            .finish_non_exhaustive()
    }
}

impl WorkspaceWatchProfile {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a project-root-relative path (e.g. `"packages/a/src/lib.ts"`)
    /// belongs to this workspace's watched sources.
    pub fn matches(&self, rel_path: &str) -> bool {
        let inner = if self.root_rel.is_empty() {
            rel_path
        } else {
            match rel_path
                .strip_prefix(self.root_rel.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
            {
                Some(inner) => inner,
                None => return false,
            }
        };
        self.sources.is_match(inner)
    }
}

/// Build a watch profile per workspace from the graph.
pub fn build_watch_profiles(
    graph: &WorkspaceGraph,
    base_dir: &Path,
) -> Result<Vec<WorkspaceWatchProfile>> {
    let mut profiles = Vec::with_capacity(graph.len());

    for ws in graph.workspaces() {
        let mut builder = GlobSetBuilder::new();
        for spec in ws.targets.values() {
            for pat in &spec.source_globs {
                let glob = Glob::new(pat).map_err(|e| {
                    MonodagError::InvalidManifest(format!(
                        "workspace '{}' has invalid glob '{pat}': {e}",
                        ws.name
                    ))
                })?;
                builder.add(glob);
            }
        }
        let sources = builder
            .build()
            .map_err(|e| MonodagError::Other(anyhow::anyhow!("building glob set: {e}")))?;

        let root_rel = ws
            .root_path
            .strip_prefix(base_dir)
            .unwrap_or(&ws.root_path)
            .to_string_lossy()
            .replace('\\', "/")
            .trim_end_matches('/')
            .to_string();

        profiles.push(WorkspaceWatchProfile {
            name: ws.name.clone(),
            root_rel,
            sources,
        });
    }

    Ok(profiles)
}
