// src/watch/session.rs

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};
use tracing::{info, warn};

use crate::engine::{NodeStatus, RunOptions, Scheduler};
use crate::engine::report::NodeReport;
use crate::errors::Result;
use crate::exec::Executor;
use crate::watch::watcher::InvalidateEvent;

/// Editors and builds touch many files in a burst; wait this long after the
/// first event before re-planning, folding the burst into one run.
const COALESCE_WINDOW: Duration = Duration::from_millis(200);

/// Long-lived rebuild loop: run the target once, then re-run the affected
/// subgraph on every invalidation.
///
/// The session retains each node's last report; invalidation discards the
/// retained state for the changed workspace and every transitive dependent,
/// and the next run rebuilds exactly that closure. Workspaces in the closure
/// that do not declare the target drop out of the re-run scope (their own
/// dependents are already in the closure independently).
pub struct WatchSession {
    scheduler: Arc<Scheduler>,
    target: String,
    scope: Option<Vec<String>>,
    options: RunOptions,
    executor: Arc<dyn Executor>,
    rx: mpsc::Receiver<InvalidateEvent>,
    nodes: BTreeMap<String, NodeReport>,
}

impl WatchSession {
    pub fn new(
        scheduler: Arc<Scheduler>,
        target: impl Into<String>,
        scope: Option<Vec<String>>,
        options: RunOptions,
        executor: Arc<dyn Executor>,
        rx: mpsc::Receiver<InvalidateEvent>,
    ) -> Self {
        Self {
            scheduler,
            target: target.into(),
            scope,
            options,
            executor,
            rx,
            nodes: BTreeMap::new(),
        }
    }

    /// Last observed status for a workspace, if it has run in this session.
    pub fn node_status(&self, workspace: &str) -> Option<NodeStatus> {
        self.nodes.get(workspace).map(|n| n.status)
    }

    /// Drop retained state for a changed workspace and return the affected
    /// closure (the workspace plus its transitive dependents), filtered to
    /// workspaces that declare this session's target.
    pub fn on_invalidate(&mut self, workspace: &str) -> Result<Vec<String>> {
        let affected = self.scheduler.affected_by(workspace)?;
        for name in &affected {
            self.nodes.remove(name);
        }
        let scoped = affected
            .into_iter()
            .filter(|name| {
                self.scheduler
                    .graph()
                    .get(name)
                    .map(|ws| ws.declares_target(&self.target))
                    .unwrap_or(false)
            })
            .collect();
        Ok(scoped)
    }

    /// Initial full run, then block on invalidation events until the watcher
    /// side closes the channel.
    pub async fn run(mut self) -> Result<()> {
        self.run_scoped(self.scope.clone()).await?;

        let mut open = true;
        while open {
            let Some(first) = self.rx.recv().await else {
                break;
            };
            let mut changed = BTreeSet::new();
            changed.insert(first.workspace);

            let deadline = Instant::now() + COALESCE_WINDOW;
            loop {
                match timeout_at(deadline, self.rx.recv()).await {
                    Ok(Some(ev)) => {
                        changed.insert(ev.workspace);
                    }
                    // Channel closed mid-burst: run what we collected, then
                    // shut down.
                    Ok(None) => {
                        open = false;
                        break;
                    }
                    Err(_) => break,
                }
            }

            self.rerun(changed).await;
        }
        Ok(())
    }

    async fn rerun(&mut self, changed: BTreeSet<String>) {
        let mut scope = BTreeSet::new();
        for workspace in &changed {
            match self.on_invalidate(workspace) {
                Ok(affected) => scope.extend(affected),
                // The workspace may have been removed between the watcher's
                // profile build and now; nothing to re-run for it.
                Err(e) => warn!(%workspace, "ignoring invalidation: {e}"),
            }
        }
        if scope.is_empty() {
            return;
        }

        info!(
            changed = %changed.iter().cloned().collect::<Vec<_>>().join(", "),
            rebuilding = scope.len(),
            "change detected"
        );

        let scope: Vec<String> = scope.into_iter().collect();
        // Watch mode outlives individual run failures: report and keep
        // watching rather than tearing the session down.
        if let Err(e) = self.run_scoped(Some(scope)).await {
            warn!("re-run failed: {e}");
        }
    }

    async fn run_scoped(&mut self, scope: Option<Vec<String>>) -> Result<()> {
        let plan = self.scheduler.plan(&self.target, scope.as_deref())?;
        let report = self
            .scheduler
            .run(&plan, &self.options, self.executor.clone())
            .await?;

        info!(
            target = %report.target,
            succeeded = report.count(NodeStatus::Succeeded),
            cached = report.count(NodeStatus::FromCache),
            failed = report.count(NodeStatus::Failed),
            skipped = report.count(NodeStatus::Skipped),
            "run finished"
        );
        self.nodes.extend(report.nodes);
        Ok(())
    }
}
