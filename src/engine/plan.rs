// src/engine/plan.rs

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use tracing::debug;

use crate::errors::{MonodagError, Result};
use crate::graph::WorkspaceGraph;

/// Per-run status of one plan node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// Waiting on dependencies or a pool slot.
    Pending,
    /// Executor is live for this node.
    Running,
    /// A stored result matched the current fingerprint; executor skipped.
    FromCache,
    Succeeded,
    Failed,
    /// Never executed: upstream failure, cancellation, or deadline.
    Skipped,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, NodeStatus::Pending | NodeStatus::Running)
    }

    pub fn is_success(self) -> bool {
        matches!(self, NodeStatus::Succeeded | NodeStatus::FromCache)
    }
}

/// Why a node ended up `Skipped`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// A transitive dependency failed, so this node must not run.
    UpstreamFailed(String),
    Cancelled,
    DeadlineExpired,
}

/// Transient per-run overlay state for one workspace. Created when a plan
/// starts executing, discarded with the run report (or retained for the life
/// of a watch session and overwritten on each re-run). Never stored on the
/// workspace itself.
#[derive(Debug, Clone)]
pub struct ExecutionNode {
    pub workspace: String,
    pub status: NodeStatus,
    pub started_at: Option<Instant>,
    pub ended_at: Option<Instant>,
    pub fingerprint_digest: Option<String>,
    pub error: Option<String>,
    pub skip_reason: Option<SkipReason>,
}

impl ExecutionNode {
    pub(crate) fn pending(workspace: &str) -> Self {
        Self {
            workspace: workspace.to_string(),
            status: NodeStatus::Pending,
            started_at: None,
            ended_at: None,
            fingerprint_digest: None,
            error: None,
            skip_reason: None,
        }
    }
}

/// One node of an execution plan: a workspace that declares the target, and
/// its blocking dependencies *within the plan*.
#[derive(Debug, Clone)]
pub struct PlanNode {
    pub workspace: String,
    /// Nearest plan ancestors: dependency edges collapsed through workspaces
    /// that do not declare the target.
    pub deps: Vec<String>,
}

/// The ordered, scope-restricted subset of the graph selected for one run.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub target: String,
    /// Nodes in dependency-respecting topological order.
    pub nodes: Vec<PlanNode>,
}

impl ExecutionPlan {
    /// Build a plan for `target`, restricted to the closure needed for
    /// `scope` (or the whole graph when omitted).
    ///
    /// Each explicitly scoped workspace must declare the target; workspaces
    /// pulled in only as dependencies participate when they declare it and
    /// are collapsed over when they do not.
    pub fn build(
        graph: &WorkspaceGraph,
        target: &str,
        scope: Option<&[String]>,
    ) -> Result<ExecutionPlan> {
        if let Some(names) = scope {
            for name in names {
                let ws = graph.get(name)?;
                if !ws.declares_target(target) {
                    return Err(MonodagError::TargetNotFound {
                        workspace: name.clone(),
                        target: target.to_string(),
                    });
                }
            }
        }

        let order = graph.topological_order(scope)?;
        let participants: HashSet<String> = order
            .iter()
            .filter(|ws| ws.declares_target(target))
            .map(|ws| ws.name.clone())
            .collect();

        let mut nodes = Vec::new();
        for ws in &order {
            if !participants.contains(&ws.name) {
                continue;
            }
            let mut memo = HashMap::new();
            let deps = plan_deps(graph, &ws.name, &participants, &mut memo)?;
            nodes.push(PlanNode {
                workspace: ws.name.clone(),
                deps,
            });
        }

        debug!(
            target = %target,
            nodes = nodes.len(),
            closure = order.len(),
            "built execution plan"
        );
        Ok(ExecutionPlan {
            target: target.to_string(),
            nodes,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Workspace names in plan order.
    pub fn workspaces(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.workspace.as_str())
    }
}

/// Nearest participating ancestors of `name`: walk declared dependencies,
/// passing through workspaces that are not part of the plan.
fn plan_deps(
    graph: &WorkspaceGraph,
    name: &str,
    participants: &HashSet<String>,
    memo: &mut HashMap<String, Vec<String>>,
) -> Result<Vec<String>> {
    if let Some(deps) = memo.get(name) {
        return Ok(deps.clone());
    }

    let mut found = Vec::new();
    for dep in graph.dependencies_of(name)? {
        if participants.contains(&dep.name) {
            found.push(dep.name.clone());
        } else {
            found.extend(plan_deps(graph, &dep.name, participants, memo)?);
        }
    }
    found.sort();
    found.dedup();

    memo.insert(name.to_string(), found.clone());
    Ok(found)
}
