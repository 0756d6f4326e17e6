// src/engine/report.rs

use std::collections::BTreeMap;
use std::time::Duration;

use crate::engine::plan::{ExecutionNode, NodeStatus, SkipReason};

/// Terminal state of one node after a run.
#[derive(Debug, Clone)]
pub struct NodeReport {
    pub status: NodeStatus,
    pub fingerprint_digest: Option<String>,
    /// Wall time between executor dispatch and completion; `None` for nodes
    /// that never ran (cache hits, skips).
    pub duration: Option<Duration>,
    pub error: Option<String>,
    pub skip_reason: Option<SkipReason>,
}

/// Outcome of one `run` call: per-workspace terminal status plus an error
/// index. Partial failure is a normal result here, not an `Err`; only graph
/// construction and fingerprinting abort a run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub target: String,
    pub nodes: BTreeMap<String, NodeReport>,
    /// Executor errors keyed by workspace name.
    pub errors: BTreeMap<String, String>,
}

impl RunReport {
    pub(crate) fn from_nodes(target: &str, nodes: BTreeMap<String, ExecutionNode>) -> Self {
        let mut reports = BTreeMap::new();
        let mut errors = BTreeMap::new();

        for (name, node) in nodes {
            if let Some(err) = &node.error {
                errors.insert(name.clone(), err.clone());
            }
            let duration = match (node.started_at, node.ended_at) {
                (Some(start), Some(end)) => Some(end.duration_since(start)),
                _ => None,
            };
            reports.insert(
                name,
                NodeReport {
                    status: node.status,
                    fingerprint_digest: node.fingerprint_digest,
                    duration,
                    error: node.error,
                    skip_reason: node.skip_reason,
                },
            );
        }

        Self {
            target: target.to_string(),
            nodes: reports,
            errors,
        }
    }

    /// `true` when no node failed. Skipped nodes do not count as failures;
    /// the failing upstream already does.
    pub fn success(&self) -> bool {
        self.nodes.values().all(|n| n.status != NodeStatus::Failed)
    }

    pub fn status_of(&self, workspace: &str) -> Option<NodeStatus> {
        self.nodes.get(workspace).map(|n| n.status)
    }

    /// Workspaces by terminal status, for summary output.
    pub fn count(&self, status: NodeStatus) -> usize {
        self.nodes.values().filter(|n| n.status == status).count()
    }
}
