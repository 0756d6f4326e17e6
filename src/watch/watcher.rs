// src/watch/watcher.rs

use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::errors::{MonodagError, Result};
use crate::watch::profiles::WorkspaceWatchProfile;

/// A workspace whose sources changed on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidateEvent {
    pub workspace: String,
}

/// Running filesystem watcher. Dropping it stops watching.
pub struct FsWatcher {
    _watcher: RecommendedWatcher,
}

/// Watch `root` recursively and emit one [`InvalidateEvent`] per workspace
/// whose source profile matches a changed path.
///
/// notify delivers events on its own thread; a blocking forwarder maps paths
/// to workspaces and pushes into the async channel.
pub fn spawn_watcher(
    root: &Path,
    profiles: Vec<WorkspaceWatchProfile>,
    tx: mpsc::Sender<InvalidateEvent>,
) -> Result<FsWatcher> {
    let (raw_tx, raw_rx) = std_mpsc::channel::<Event>();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            let _ = raw_tx.send(event);
        }
        Err(e) => warn!("watch error: {e}"),
    })
    .map_err(|e| MonodagError::Other(anyhow::anyhow!("creating watcher: {e}")))?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|e| MonodagError::Other(anyhow::anyhow!("watching {}: {e}", root.display())))?;

    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || {
        forward_events(&root, &profiles, raw_rx, tx);
    });

    Ok(FsWatcher { _watcher: watcher })
}

fn forward_events(
    root: &Path,
    profiles: &[WorkspaceWatchProfile],
    raw_rx: std_mpsc::Receiver<Event>,
    tx: mpsc::Sender<InvalidateEvent>,
) {
    while let Ok(event) = raw_rx.recv() {
        for workspace in match_workspaces(root, profiles, &event.paths) {
            debug!(%workspace, "source change detected");
            if tx
                .blocking_send(InvalidateEvent { workspace })
                .is_err()
            {
                return;
            }
        }
    }
}

fn match_workspaces(
    root: &Path,
    profiles: &[WorkspaceWatchProfile],
    paths: &[PathBuf],
) -> Vec<String> {
    let mut hit = Vec::new();
    for path in paths {
        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        let rel = rel.to_string_lossy().replace('\\', "/");
        for profile in profiles {
            if profile.matches(&rel) && !hit.iter().any(|w| w == profile.name()) {
                hit.push(profile.name().to_string());
            }
        }
    }
    hit
}

#[cfg(test)]
mod tests {
    // Profile matching is covered in profiles.rs and the session tests;
    // here we only pin down the path -> workspace mapping.
    use super::*;
    use crate::graph::{TargetSpec, WorkspaceGraph, WorkspaceKind, WorkspaceManifest};
    use crate::watch::profiles::build_watch_profiles;
    use std::collections::BTreeMap;

    fn graph_with(name: &str, root: &str, globs: &[&str]) -> WorkspaceGraph {
        let mut targets = BTreeMap::new();
        targets.insert(
            "build".to_string(),
            TargetSpec {
                command: "true".to_string(),
                source_globs: globs.iter().map(|s| s.to_string()).collect(),
                ready_pattern: None,
            },
        );
        let manifest = WorkspaceManifest {
            name: name.to_string(),
            root_path: PathBuf::from(root),
            kind: WorkspaceKind::Package,
            declared_dependencies: vec![],
            targets,
        };
        WorkspaceGraph::build(vec![manifest]).unwrap()
    }

    #[test]
    fn maps_changed_path_to_owning_workspace() {
        let graph = graph_with("pkg-a", "/repo/packages/a", &["src/**/*.ts"]);
        let profiles = build_watch_profiles(&graph, Path::new("/repo")).unwrap();

        let hits = match_workspaces(
            Path::new("/repo"),
            &profiles,
            &[PathBuf::from("/repo/packages/a/src/lib.ts")],
        );
        assert_eq!(hits, vec!["pkg-a".to_string()]);

        let misses = match_workspaces(
            Path::new("/repo"),
            &profiles,
            &[PathBuf::from("/repo/packages/a/README.md")],
        );
        assert!(misses.is_empty());
    }
}
