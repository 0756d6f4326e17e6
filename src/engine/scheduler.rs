// src/engine/scheduler.rs

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant as TokioInstant, sleep_until};
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheStore};
use crate::checksum::{ChecksumEngine, Fingerprint};
use crate::engine::plan::{ExecutionNode, ExecutionPlan, NodeStatus, SkipReason};
use crate::engine::report::RunReport;
use crate::errors::Result;
use crate::exec::{ExecRequest, Executor};
use crate::graph::{Workspace, WorkspaceGraph};
use crate::status::{StatusSink, StatusTransition};

/// Cancellation severity requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelState {
    Active,
    /// Stop admitting new nodes; running executors finish.
    Soft,
    /// Also invoke the executor's cancellation hook for running nodes.
    Hard,
}

/// Caller-side handle for cancelling a run.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: watch::Sender<CancelState>,
}

impl CancelHandle {
    pub fn cancel_soft(&self) {
        let _ = self.tx.send(CancelState::Soft);
    }

    pub fn cancel_hard(&self) {
        let _ = self.tx.send(CancelState::Hard);
    }
}

/// Scheduler-side view of a cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<CancelState>,
}

impl CancelToken {
    pub fn state(&self) -> CancelState {
        *self.rx.borrow()
    }

    async fn changed(&mut self) {
        let _ = self.rx.changed().await;
    }
}

/// Create a connected cancellation handle/token pair.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(CancelState::Active);
    (CancelHandle { tx }, CancelToken { rx })
}

/// Options for one `run` call.
#[derive(Clone)]
pub struct RunOptions {
    /// Maximum number of nodes in flight at once; clamped to at least 1.
    pub concurrency: usize,
    /// Per-run deadline: once elapsed, no new nodes are admitted and
    /// remaining pending nodes are skipped. Running nodes are not killed.
    pub deadline: Option<Duration>,
    pub cancel: Option<CancelToken>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            deadline: None,
            cancel: None,
        }
    }
}

/// Default pool size: the machine's available parallelism.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Events sent from node tasks back into the run loop. The loop is the only
/// mutator of node state, which keeps status transitions ordered and
/// monotonic per node.
enum NodeEvent {
    /// Cache missed and the executor is now live.
    Started { workspace: String },
    /// A stored entry matched the current fingerprint; no execution.
    CacheHit { workspace: String },
    /// Dispatched but hard-cancelled before the executor started.
    Aborted { workspace: String },
    /// Executor finished.
    Finished {
        workspace: String,
        success: bool,
        error: Option<String>,
    },
}

type ExecLockMap = Mutex<HashMap<(String, String), Arc<tokio::sync::Mutex<()>>>>;

/// Drives execution plans: consults the cache per node, dispatches executors
/// with bounded parallelism honoring the DAG partial order, and reports
/// status transitions.
///
/// The graph is read-only and shared; per-run state lives in the run loop.
/// A per-(workspace, target) async mutex guarantees at most one live
/// executor for a pair even across overlapping concurrent runs.
pub struct Scheduler {
    graph: Arc<WorkspaceGraph>,
    checksums: ChecksumEngine,
    cache: CacheStore,
    sink: Arc<dyn StatusSink>,
    exec_locks: Arc<ExecLockMap>,
}

impl Scheduler {
    pub fn new(graph: Arc<WorkspaceGraph>, cache: CacheStore, sink: Arc<dyn StatusSink>) -> Self {
        Self {
            graph,
            checksums: ChecksumEngine::new(),
            cache,
            sink,
            exec_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn graph(&self) -> &WorkspaceGraph {
        &self.graph
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Build the execution plan for a target, optionally scoped.
    pub fn plan(&self, target: &str, scope: Option<&[String]>) -> Result<ExecutionPlan> {
        ExecutionPlan::build(&self.graph, target, scope)
    }

    /// The workspaces affected by a change in `workspace`: itself plus every
    /// transitive dependent. This is what a watch-triggered re-run scopes to.
    pub fn affected_by(&self, workspace: &str) -> Result<Vec<String>> {
        let mut affected = vec![self.graph.get(workspace)?.name.clone()];
        for ws in self.graph.transitive_dependents_of(workspace)? {
            affected.push(ws.name.clone());
        }
        Ok(affected)
    }

    /// Execute a plan.
    ///
    /// Node failures are captured in the report, never raised; the only
    /// errors that unwind out of here are fingerprint I/O failures, and those
    /// abort before any executor is invoked.
    pub async fn run(
        &self,
        plan: &ExecutionPlan,
        options: &RunOptions,
        executor: Arc<dyn Executor>,
    ) -> Result<RunReport> {
        let concurrency = options.concurrency.max(1);
        info!(
            target = %plan.target,
            nodes = plan.len(),
            concurrency,
            "starting run"
        );

        if plan.is_empty() {
            return Ok(RunReport::from_nodes(&plan.target, BTreeMap::new()));
        }

        // Fingerprint phase: fatal on error, before anything executes. An
        // unreadable source file is an environment problem every node needs
        // to see consistently.
        let mut fingerprints: HashMap<String, Fingerprint> = HashMap::new();
        let mut workspaces: HashMap<String, Workspace> = HashMap::new();
        for node in &plan.nodes {
            let fp = self
                .checksums
                .fingerprint(&self.graph, &node.workspace, &plan.target)?;
            fingerprints.insert(node.workspace.clone(), fp);
            workspaces.insert(node.workspace.clone(), self.graph.get(&node.workspace)?.clone());
        }

        // Per-run overlay state.
        let mut states: BTreeMap<String, ExecutionNode> = BTreeMap::new();
        let mut blockers: HashMap<String, usize> = HashMap::new();
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        let mut ready: VecDeque<String> = VecDeque::new();

        for node in &plan.nodes {
            let mut exec_node = ExecutionNode::pending(&node.workspace);
            exec_node.fingerprint_digest =
                fingerprints.get(&node.workspace).map(|fp| fp.digest.clone());
            states.insert(node.workspace.clone(), exec_node);

            blockers.insert(node.workspace.clone(), node.deps.len());
            for dep in &node.deps {
                dependents
                    .entry(dep.clone())
                    .or_default()
                    .push(node.workspace.clone());
            }
            if node.deps.is_empty() {
                ready.push_back(node.workspace.clone());
            }
            self.emit(&node.workspace, &plan.target, NodeStatus::Pending);
        }

        let (tx, mut rx) = mpsc::channel::<NodeEvent>(plan.len() * 2 + 4);
        let mut in_flight = 0usize;
        let mut terminal = 0usize;
        let mut dispatched: HashSet<String> = HashSet::new();
        let mut stop_admitting = false;

        let deadline_at = options.deadline.map(|d| TokioInstant::now() + d);
        let cancel_for_dispatch = options.cancel.clone();
        let mut cancel = options.cancel.clone();

        while terminal < plan.len() {
            // Admit ready nodes the instant a pool slot and the node are free.
            while !stop_admitting && in_flight < concurrency {
                let Some(name) = ready.pop_front() else { break };
                if states[&name].status != NodeStatus::Pending {
                    continue;
                }
                in_flight += 1;
                dispatched.insert(name.clone());
                self.dispatch(
                    &name,
                    &plan.target,
                    &fingerprints,
                    &workspaces,
                    cancel_for_dispatch.clone(),
                    Arc::clone(&executor),
                    tx.clone(),
                );
            }

            if terminal >= plan.len() {
                break;
            }
            if in_flight == 0 && stop_admitting {
                break;
            }

            tokio::select! {
                maybe_event = rx.recv() => {
                    let Some(event) = maybe_event else { break };
                    self.handle_event(
                        event,
                        &plan.target,
                        &mut states,
                        &mut blockers,
                        &dependents,
                        &mut ready,
                        &mut in_flight,
                        &mut terminal,
                    );
                }
                _ = wait_cancelled(&mut cancel), if !stop_admitting => {
                    let state = cancel.as_ref().map(|c| c.state()).unwrap_or(CancelState::Active);
                    if state == CancelState::Active {
                        // Sender dropped without cancelling; stop waiting on it.
                        cancel = None;
                    }
                    if state != CancelState::Active {
                        warn!(target = %plan.target, ?state, "run cancelled; not admitting further nodes");
                        stop_admitting = true;
                        terminal += skip_all_pending(
                            &mut states,
                            &dispatched,
                            &plan.target,
                            SkipReason::Cancelled,
                            self.sink.as_ref(),
                        );
                        if state == CancelState::Hard {
                            for (name, node) in states.iter() {
                                if node.status == NodeStatus::Running {
                                    executor.cancel(name, &plan.target);
                                }
                            }
                        }
                    }
                }
                _ = wait_deadline(deadline_at), if !stop_admitting => {
                    warn!(target = %plan.target, "run deadline elapsed; skipping remaining pending nodes");
                    stop_admitting = true;
                    terminal += skip_all_pending(
                        &mut states,
                        &dispatched,
                        &plan.target,
                        SkipReason::DeadlineExpired,
                        self.sink.as_ref(),
                    );
                }
            }
        }

        let report = RunReport::from_nodes(&plan.target, states);
        info!(
            target = %plan.target,
            succeeded = report.count(NodeStatus::Succeeded),
            from_cache = report.count(NodeStatus::FromCache),
            failed = report.count(NodeStatus::Failed),
            skipped = report.count(NodeStatus::Skipped),
            "run finished"
        );
        Ok(report)
    }

    /// Spawn a node task: take the per-(workspace, target) execution lock,
    /// consult both cache tiers, then either report a hit or run the
    /// executor and store the result.
    #[allow(clippy::too_many_arguments)]
    fn dispatch(
        &self,
        name: &str,
        target: &str,
        fingerprints: &HashMap<String, Fingerprint>,
        workspaces: &HashMap<String, Workspace>,
        cancel: Option<CancelToken>,
        executor: Arc<dyn Executor>,
        tx: mpsc::Sender<NodeEvent>,
    ) {
        let workspace = workspaces[name].clone();
        let fingerprint = fingerprints[name].clone();
        let target = target.to_string();
        let cache = self.cache.clone();
        let lock = self.exec_lock(name, &target);
        let name = name.to_string();

        tokio::spawn(async move {
            // One live executor per (workspace, target), even across
            // overlapping runs.
            let _guard = lock.lock().await;

            if cache_hit(&cache, &name, &target, &fingerprint).await {
                let _ = tx.send(NodeEvent::CacheHit { workspace: name }).await;
                return;
            }

            // Waiting on the lock may have outlived a cancellation. The node
            // never started, so even a soft cancel aborts it here.
            if matches!(
                cancel.map(|c| c.state()),
                Some(CancelState::Soft | CancelState::Hard)
            ) {
                let _ = tx.send(NodeEvent::Aborted { workspace: name }).await;
                return;
            }

            let _ = tx
                .send(NodeEvent::Started {
                    workspace: name.clone(),
                })
                .await;

            let outcome = executor
                .execute(ExecRequest {
                    workspace: workspace.clone(),
                    target: target.clone(),
                    fingerprint: fingerprint.clone(),
                })
                .await;

            if outcome.success {
                let locator = cache.remote_object_key(&name, &target, &fingerprint.digest);
                let entry = CacheEntry::new(&name, &target, fingerprint.clone(), locator);
                if let Err(e) = cache.write_local(&entry) {
                    warn!(workspace = %name, target = %target, error = %e, "local cache write failed");
                }
                // Remote write is best-effort and does not block completion.
                let artifact = outcome.output.clone();
                tokio::spawn(async move {
                    cache.write_remote(&entry, artifact).await;
                });
            }

            let _ = tx
                .send(NodeEvent::Finished {
                    workspace: name,
                    success: outcome.success,
                    error: outcome.error,
                })
                .await;
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_event(
        &self,
        event: NodeEvent,
        target: &str,
        states: &mut BTreeMap<String, ExecutionNode>,
        blockers: &mut HashMap<String, usize>,
        dependents: &HashMap<String, Vec<String>>,
        ready: &mut VecDeque<String>,
        in_flight: &mut usize,
        terminal: &mut usize,
    ) {
        match event {
            NodeEvent::Started { workspace } => {
                if let Some(node) = states.get_mut(&workspace) {
                    node.status = NodeStatus::Running;
                    node.started_at = Some(Instant::now());
                }
                self.emit(&workspace, target, NodeStatus::Running);
            }
            NodeEvent::CacheHit { workspace } => {
                *in_flight -= 1;
                *terminal += 1;
                if let Some(node) = states.get_mut(&workspace) {
                    node.status = NodeStatus::FromCache;
                }
                debug!(workspace = %workspace, target = %target, "cache hit; executor skipped");
                self.emit(&workspace, target, NodeStatus::FromCache);
                unblock_dependents(&workspace, states, blockers, dependents, ready);
            }
            NodeEvent::Aborted { workspace } => {
                *in_flight -= 1;
                *terminal += 1;
                if let Some(node) = states.get_mut(&workspace) {
                    node.status = NodeStatus::Skipped;
                    node.skip_reason = Some(SkipReason::Cancelled);
                }
                self.emit(&workspace, target, NodeStatus::Skipped);
            }
            NodeEvent::Finished {
                workspace,
                success,
                error,
            } => {
                *in_flight -= 1;
                *terminal += 1;
                if let Some(node) = states.get_mut(&workspace) {
                    node.ended_at = Some(Instant::now());
                    if success {
                        node.status = NodeStatus::Succeeded;
                    } else {
                        node.status = NodeStatus::Failed;
                        node.error =
                            Some(error.unwrap_or_else(|| "execution failed".to_string()));
                    }
                }

                if success {
                    self.emit(&workspace, target, NodeStatus::Succeeded);
                    unblock_dependents(&workspace, states, blockers, dependents, ready);
                } else {
                    warn!(workspace = %workspace, target = %target, "node failed; skipping dependents");
                    self.emit(&workspace, target, NodeStatus::Failed);
                    *terminal +=
                        self.fail_dependents(&workspace, target, states, dependents);
                }
            }
        }
    }

    /// Contagion: every transitive dependent still pending is skipped without
    /// ever reaching its executor. Failure travels downstream only.
    fn fail_dependents(
        &self,
        failed: &str,
        target: &str,
        states: &mut BTreeMap<String, ExecutionNode>,
        dependents: &HashMap<String, Vec<String>>,
    ) -> usize {
        let mut skipped = 0;
        let mut stack: Vec<String> = dependents.get(failed).cloned().unwrap_or_default();

        while let Some(name) = stack.pop() {
            let Some(node) = states.get_mut(&name) else { continue };
            if node.status != NodeStatus::Pending {
                continue;
            }
            node.status = NodeStatus::Skipped;
            node.skip_reason = Some(SkipReason::UpstreamFailed(failed.to_string()));
            skipped += 1;
            debug!(
                workspace = %name,
                upstream = %failed,
                "skipping dependent of failed node"
            );
            self.emit(&name, target, NodeStatus::Skipped);
            stack.extend(dependents.get(&name).cloned().unwrap_or_default());
        }

        skipped
    }

    fn exec_lock(&self, workspace: &str, target: &str) -> Arc<tokio::sync::Mutex<()>> {
        let key = (workspace.to_string(), target.to_string());
        let mut guard = match self.exec_locks.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(guard.entry(key).or_default())
    }

    fn emit(&self, workspace: &str, target: &str, status: NodeStatus) {
        self.sink
            .publish(StatusTransition::now(workspace, target, status));
    }
}

/// Both tiers consulted; a hit requires the stored fingerprint to match the
/// current one (per-key over the local tier's full maps, digest-only for
/// remote index records). A remote hit warms the local tier.
async fn cache_hit(
    cache: &CacheStore,
    workspace: &str,
    target: &str,
    fingerprint: &Fingerprint,
) -> bool {
    if let Some(entry) = cache.read_local(workspace, target) {
        if entry.matches(fingerprint) {
            return true;
        }
    }

    if let Some(entry) = cache.read_remote(workspace, target).await {
        if entry.matches(fingerprint) {
            // Warm the local tier with the full fingerprint, not the reduced
            // remote record, so later runs get the per-key comparison.
            let warmed = CacheEntry {
                fingerprint: fingerprint.clone(),
                ..entry
            };
            if let Err(e) = cache.write_local(&warmed) {
                warn!(workspace = %workspace, target = %target, error = %e, "warming local cache failed");
            }
            return true;
        }
    }

    false
}

fn unblock_dependents(
    workspace: &str,
    states: &BTreeMap<String, ExecutionNode>,
    blockers: &mut HashMap<String, usize>,
    dependents: &HashMap<String, Vec<String>>,
    ready: &mut VecDeque<String>,
) {
    let Some(deps) = dependents.get(workspace) else {
        return;
    };
    for name in deps {
        if let Some(count) = blockers.get_mut(name) {
            *count = count.saturating_sub(1);
            if *count == 0 && states[name].status == NodeStatus::Pending {
                ready.push_back(name.clone());
            }
        }
    }
}

/// Skip every pending node that has not been dispatched. Returns how many
/// nodes became terminal.
fn skip_all_pending(
    states: &mut BTreeMap<String, ExecutionNode>,
    dispatched: &HashSet<String>,
    target: &str,
    reason: SkipReason,
    sink: &dyn StatusSink,
) -> usize {
    let mut skipped = 0;
    for (name, node) in states.iter_mut() {
        if node.status == NodeStatus::Pending && !dispatched.contains(name) {
            node.status = NodeStatus::Skipped;
            node.skip_reason = Some(reason.clone());
            skipped += 1;
            sink.publish(StatusTransition::now(name, target, NodeStatus::Skipped));
        }
    }
    skipped
}

async fn wait_cancelled(cancel: &mut Option<CancelToken>) {
    match cancel {
        Some(token) => token.changed().await,
        None => std::future::pending().await,
    }
}

async fn wait_deadline(at: Option<TokioInstant>) {
    match at {
        Some(instant) => sleep_until(instant).await,
        None => std::future::pending().await,
    }
}
