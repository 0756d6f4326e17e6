// src/status.rs

//! Node status notifications for external observers (dashboards, sockets).
//!
//! Delivery is fire-and-forget: `publish` must return quickly and must never
//! block the scheduler. Transitions are emitted in the order they occur and
//! are monotonic per node.

use std::time::SystemTime;

use tracing::info;

use crate::engine::plan::NodeStatus;

/// One status transition of a plan node.
#[derive(Debug, Clone)]
pub struct StatusTransition {
    pub workspace: String,
    pub target: String,
    pub status: NodeStatus,
    pub timestamp: SystemTime,
}

impl StatusTransition {
    pub fn now(workspace: &str, target: &str, status: NodeStatus) -> Self {
        Self {
            workspace: workspace.to_string(),
            target: target.to_string(),
            status,
            timestamp: SystemTime::now(),
        }
    }
}

/// Receives node status transitions for external display.
pub trait StatusSink: Send + Sync {
    fn publish(&self, transition: StatusTransition);
}

/// Default sink: log each transition.
#[derive(Debug, Default)]
pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn publish(&self, transition: StatusTransition) {
        info!(
            workspace = %transition.workspace,
            target = %transition.target,
            status = ?transition.status,
            "node status"
        );
    }
}
