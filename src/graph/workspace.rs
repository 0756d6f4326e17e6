// src/graph/workspace.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Kind of a workspace: a library package or a deployable service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceKind {
    Package,
    Service,
}

/// One named target a workspace can run (build, lint, deploy, ...).
#[derive(Debug, Clone)]
pub struct TargetSpec {
    /// Shell command, executed with the workspace root as working directory.
    pub command: String,
    /// Globs (relative to the workspace root) selecting the target's inputs.
    pub source_globs: Vec<String>,
    /// For service targets: stdout regex that marks the process as up.
    pub ready_pattern: Option<String>,
}

/// Raw per-workspace data as supplied by the manifest provider.
///
/// This is the fixed shape the graph is built from; the TOML layer maps into
/// it at the config boundary.
#[derive(Debug, Clone)]
pub struct WorkspaceManifest {
    pub name: String,
    pub root_path: PathBuf,
    pub kind: WorkspaceKind,
    pub declared_dependencies: Vec<String>,
    pub targets: BTreeMap<String, TargetSpec>,
}

/// A node in the workspace graph. Immutable after graph construction;
/// runtime status lives in scheduler-owned overlay state, never here.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub name: String,
    pub root_path: PathBuf,
    pub kind: WorkspaceKind,
    pub declared_dependencies: Vec<String>,
    pub targets: BTreeMap<String, TargetSpec>,
}

impl Workspace {
    pub(crate) fn from_manifest(m: WorkspaceManifest) -> Self {
        Self {
            name: m.name,
            root_path: m.root_path,
            kind: m.kind,
            declared_dependencies: m.declared_dependencies,
            targets: m.targets,
        }
    }

    /// Look up a declared target by name.
    pub fn target(&self, name: &str) -> Option<&TargetSpec> {
        self.targets.get(name)
    }

    /// Whether this workspace declares the given target.
    pub fn declares_target(&self, name: &str) -> bool {
        self.targets.contains_key(name)
    }
}
