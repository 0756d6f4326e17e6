#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use monodag::graph::{TargetSpec, WorkspaceGraph, WorkspaceKind, WorkspaceManifest};

/// Builder for one workspace: its manifest entry plus the source files it
/// should have on disk.
pub struct WorkspaceBuilder {
    name: String,
    kind: WorkspaceKind,
    depends_on: Vec<String>,
    targets: BTreeMap<String, TargetSpec>,
    files: Vec<(String, String)>,
}

impl WorkspaceBuilder {
    pub fn package(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: WorkspaceKind::Package,
            depends_on: vec![],
            targets: BTreeMap::new(),
            files: vec![],
        }
    }

    pub fn service(name: &str) -> Self {
        Self {
            kind: WorkspaceKind::Service,
            ..Self::package(name)
        }
    }

    pub fn depends_on(mut self, dep: &str) -> Self {
        self.depends_on.push(dep.to_string());
        self
    }

    /// Declare a target watching every file in the workspace.
    pub fn target(self, name: &str, cmd: &str) -> Self {
        self.target_with_sources(name, cmd, &["**/*"])
    }

    pub fn target_with_sources(mut self, name: &str, cmd: &str, globs: &[&str]) -> Self {
        self.targets.insert(
            name.to_string(),
            TargetSpec {
                command: cmd.to_string(),
                source_globs: globs.iter().map(|g| g.to_string()).collect(),
                ready_pattern: None,
            },
        );
        self
    }

    pub fn ready_pattern(mut self, target: &str, pattern: &str) -> Self {
        if let Some(spec) = self.targets.get_mut(target) {
            spec.ready_pattern = Some(pattern.to_string());
        }
        self
    }

    /// A source file written under the workspace root when the project is
    /// materialised.
    pub fn file(mut self, rel_path: &str, contents: &str) -> Self {
        self.files.push((rel_path.to_string(), contents.to_string()));
        self
    }
}

/// Builds a real on-disk project (directories + source files) and the
/// matching manifests, ready for graph construction and fingerprinting.
/// The caller owns the root directory, typically a `tempfile::TempDir`.
pub struct ProjectBuilder {
    root: PathBuf,
    manifests: Vec<WorkspaceManifest>,
}

impl ProjectBuilder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            manifests: vec![],
        }
    }

    pub fn workspace(mut self, ws: WorkspaceBuilder) -> Self {
        let ws_root = self.root.join(&ws.name);
        fs::create_dir_all(&ws_root).expect("creating workspace root");
        for (rel, contents) in &ws.files {
            write_file(&ws_root, rel, contents);
        }
        self.manifests.push(WorkspaceManifest {
            name: ws.name,
            root_path: ws_root,
            kind: ws.kind,
            declared_dependencies: ws.depends_on,
            targets: ws.targets,
        });
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifests(self) -> Vec<WorkspaceManifest> {
        self.manifests
    }

    pub fn graph(self) -> WorkspaceGraph {
        WorkspaceGraph::build(self.manifests).expect("building workspace graph")
    }
}

/// Write (or overwrite) a file, creating parent directories. Used by tests to
/// touch sources between runs.
pub fn write_file(base: &Path, rel_path: &str, contents: &str) {
    let path = base.join(rel_path);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("creating parent directories");
    }
    fs::write(&path, contents).expect("writing file");
}
