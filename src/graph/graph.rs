// src/graph/graph.rs

use std::collections::{BTreeSet, HashMap, HashSet};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

use crate::errors::{MonodagError, Result};
use crate::graph::workspace::{Workspace, WorkspaceManifest};

/// Immutable-after-construction model of workspaces and their dependency
/// edges.
///
/// Edge direction is dependency -> dependent: for `B depends_on A` we add
/// `A -> B`, so a topological order of the graph is a valid build order.
/// Node indices follow manifest declaration order, which is what makes
/// [`WorkspaceGraph::topological_order`] deterministic across runs.
#[derive(Debug, Clone)]
pub struct WorkspaceGraph {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
    workspaces: HashMap<String, Workspace>,
}

impl WorkspaceGraph {
    /// Construct the graph from per-workspace manifests.
    ///
    /// Fails with [`MonodagError::CyclicDependency`] naming the cycle path if
    /// the declared dependency relation is not acyclic, and with
    /// [`MonodagError::WorkspaceNotFound`] on a dangling dependency (the
    /// manifest validator reports those earlier with more context; this is
    /// the hard backstop for other manifest providers).
    pub fn build(manifests: Vec<WorkspaceManifest>) -> Result<Self> {
        let mut graph: DiGraph<String, ()> = DiGraph::new();
        let mut index: HashMap<String, NodeIndex> = HashMap::new();
        let mut workspaces: HashMap<String, Workspace> = HashMap::new();

        for manifest in &manifests {
            let idx = graph.add_node(manifest.name.clone());
            index.insert(manifest.name.clone(), idx);
        }

        for manifest in manifests {
            let to = index[&manifest.name];
            for dep in &manifest.declared_dependencies {
                let from = *index
                    .get(dep)
                    .ok_or_else(|| MonodagError::WorkspaceNotFound(dep.clone()))?;
                graph.add_edge(from, to, ());
            }
            workspaces.insert(manifest.name.clone(), Workspace::from_manifest(manifest));
        }

        let built = Self {
            graph,
            index,
            workspaces,
        };
        built.check_acyclic()?;

        debug!(
            workspaces = built.workspaces.len(),
            edges = built.graph.edge_count(),
            "workspace graph constructed"
        );
        Ok(built)
    }

    /// Depth-first cycle check with an explicit recursion stack, so a cycle
    /// can be reported as the full path, not just one participating node.
    fn check_acyclic(&self) -> Result<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            OnStack,
            Done,
        }

        let mut marks = vec![Mark::Unvisited; self.graph.node_count()];
        let mut path: Vec<NodeIndex> = Vec::new();
        // (node, entering) frames; entering=false pops the node off the path.
        let mut frames: Vec<(NodeIndex, bool)> = Vec::new();

        for start in self.graph.node_indices() {
            if marks[start.index()] != Mark::Unvisited {
                continue;
            }
            frames.push((start, true));

            while let Some((node, entering)) = frames.pop() {
                if !entering {
                    marks[node.index()] = Mark::Done;
                    path.pop();
                    continue;
                }
                if marks[node.index()] == Mark::Done {
                    continue;
                }
                if marks[node.index()] == Mark::OnStack {
                    continue;
                }

                marks[node.index()] = Mark::OnStack;
                path.push(node);
                frames.push((node, false));

                for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                    match marks[next.index()] {
                        Mark::OnStack => {
                            // Back edge: the cycle is the path from `next` onward.
                            let pos = path
                                .iter()
                                .position(|n| *n == next)
                                .unwrap_or(0);
                            let cycle = path[pos..]
                                .iter()
                                .map(|n| self.graph[*n].clone())
                                .collect();
                            return Err(MonodagError::CyclicDependency(cycle));
                        }
                        Mark::Unvisited => frames.push((next, true)),
                        Mark::Done => {}
                    }
                }
            }
        }

        Ok(())
    }

    /// Look up a workspace by name.
    pub fn get(&self, name: &str) -> Result<&Workspace> {
        self.workspaces
            .get(name)
            .ok_or_else(|| MonodagError::WorkspaceNotFound(name.to_string()))
    }

    /// All workspaces in declaration order.
    pub fn workspaces(&self) -> impl Iterator<Item = &Workspace> {
        self.graph
            .node_indices()
            .map(move |idx| &self.workspaces[&self.graph[idx]])
    }

    /// Number of workspaces.
    pub fn len(&self) -> usize {
        self.workspaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workspaces.is_empty()
    }

    /// Direct dependencies of a workspace.
    pub fn dependencies_of(&self, name: &str) -> Result<Vec<&Workspace>> {
        self.neighbors(name, Direction::Incoming)
    }

    /// Direct dependents of a workspace (reverse edges).
    pub fn dependents_of(&self, name: &str) -> Result<Vec<&Workspace>> {
        self.neighbors(name, Direction::Outgoing)
    }

    /// All workspaces the given one transitively depends on (not including
    /// itself). Computed per call via BFS; never persisted.
    pub fn transitive_dependencies_of(&self, name: &str) -> Result<Vec<&Workspace>> {
        self.transitive(name, Direction::Incoming)
    }

    /// All workspaces that transitively depend on the given one (not
    /// including itself).
    pub fn transitive_dependents_of(&self, name: &str) -> Result<Vec<&Workspace>> {
        self.transitive(name, Direction::Outgoing)
    }

    /// Workspaces nothing depends on.
    pub fn roots(&self) -> Vec<&Workspace> {
        self.without_neighbors(Direction::Outgoing)
    }

    /// Workspaces with no dependencies.
    pub fn leaves(&self) -> Vec<&Workspace> {
        self.without_neighbors(Direction::Incoming)
    }

    /// Kahn's-algorithm topological order: every dependency precedes its
    /// dependents.
    ///
    /// When `scope` is supplied, the result is restricted to the closure of
    /// those workspaces and their transitive dependencies. Ties among
    /// simultaneously-ready nodes break by declaration order, keeping the
    /// output deterministic across runs.
    pub fn topological_order(&self, scope: Option<&[String]>) -> Result<Vec<&Workspace>> {
        let included = self.scope_closure(scope)?;

        let mut in_degree: HashMap<NodeIndex, usize> = HashMap::new();
        for &idx in &included {
            let degree = self
                .graph
                .neighbors_directed(idx, Direction::Incoming)
                .filter(|n| included.contains(n))
                .count();
            in_degree.insert(idx, degree);
        }

        // BTreeSet of raw indices = declaration order among ready nodes.
        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(idx, _)| idx.index())
            .collect();

        let mut order = Vec::with_capacity(included.len());
        while let Some(&raw) = ready.iter().next() {
            ready.remove(&raw);
            let idx = NodeIndex::new(raw);
            order.push(&self.workspaces[&self.graph[idx]]);

            for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                if let Some(degree) = in_degree.get_mut(&next) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(next.index());
                    }
                }
            }
        }

        // Construction already rejected cycles, so this always drains.
        debug_assert_eq!(order.len(), included.len());
        Ok(order)
    }

    /// The set of nodes a scoped run needs: the scope workspaces plus all
    /// their transitive dependencies, or the whole graph when unscoped.
    fn scope_closure(&self, scope: Option<&[String]>) -> Result<HashSet<NodeIndex>> {
        match scope {
            None => Ok(self.graph.node_indices().collect()),
            Some(names) => {
                let mut included = HashSet::new();
                let mut stack = Vec::new();
                for name in names {
                    let idx = *self
                        .index
                        .get(name)
                        .ok_or_else(|| MonodagError::WorkspaceNotFound(name.clone()))?;
                    stack.push(idx);
                }
                while let Some(idx) = stack.pop() {
                    if !included.insert(idx) {
                        continue;
                    }
                    stack.extend(self.graph.neighbors_directed(idx, Direction::Incoming));
                }
                Ok(included)
            }
        }
    }

    fn neighbors(&self, name: &str, dir: Direction) -> Result<Vec<&Workspace>> {
        let idx = *self
            .index
            .get(name)
            .ok_or_else(|| MonodagError::WorkspaceNotFound(name.to_string()))?;
        let mut found: Vec<&Workspace> = self
            .graph
            .neighbors_directed(idx, dir)
            .map(|n| &self.workspaces[&self.graph[n]])
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    fn transitive(&self, name: &str, dir: Direction) -> Result<Vec<&Workspace>> {
        let start = *self
            .index
            .get(name)
            .ok_or_else(|| MonodagError::WorkspaceNotFound(name.to_string()))?;

        let mut seen: HashSet<NodeIndex> = HashSet::new();
        let mut stack: Vec<NodeIndex> =
            self.graph.neighbors_directed(start, dir).collect();

        while let Some(idx) = stack.pop() {
            if idx == start || !seen.insert(idx) {
                continue;
            }
            stack.extend(self.graph.neighbors_directed(idx, dir));
        }

        let mut found: Vec<&Workspace> = seen
            .into_iter()
            .map(|n| &self.workspaces[&self.graph[n]])
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    fn without_neighbors(&self, dir: Direction) -> Vec<&Workspace> {
        self.graph
            .node_indices()
            .filter(|idx| self.graph.neighbors_directed(*idx, dir).next().is_none())
            .map(|idx| &self.workspaces[&self.graph[idx]])
            .collect()
    }
}
