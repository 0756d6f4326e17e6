// src/graph/mod.rs

//! Workspace dependency graph.
//!
//! - [`workspace`] holds the immutable node data model.
//! - [`graph`] owns the edge relation and topological queries.

pub mod graph;
pub mod workspace;

pub use graph::WorkspaceGraph;
pub use workspace::{TargetSpec, Workspace, WorkspaceKind, WorkspaceManifest};
