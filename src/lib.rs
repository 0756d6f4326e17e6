// src/lib.rs

//! monodag: build, check and deploy a monorepo of interdependent workspaces.
//!
//! A TOML manifest declares workspaces, their dependency edges and their
//! named targets. From that, monodag builds a [`graph::WorkspaceGraph`],
//! fingerprints each workspace's sources with [`checksum::ChecksumEngine`],
//! consults a two-tier [`cache::CacheStore`], and drives the remaining work
//! through [`engine::Scheduler`] with bounded parallelism. `--watch` keeps a
//! [`watch::WatchSession`] alive that re-runs the affected subgraph when
//! sources change.

pub mod cache;
pub mod checksum;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod graph;
pub mod logging;
pub mod status;
pub mod watch;

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cache::CacheStore;
use crate::cli::CliArgs;
use crate::engine::{ExecutionPlan, NodeStatus, RunOptions, RunReport, Scheduler, cancel_pair};
use crate::exec::{CommandExecutor, Executor};
use crate::graph::WorkspaceGraph;
use crate::status::LogStatusSink;
use crate::watch::WatchSession;

pub use errors::{MonodagError, Result};

/// Run the CLI. Returns `true` when every node succeeded (directly or from
/// cache); the binary maps `false` to a non-zero exit code.
pub async fn run(args: CliArgs) -> Result<bool> {
    let manifest = config::load_and_validate(&args.config)?;
    let base_dir = config::manifest_base_dir(Path::new(&args.config));
    let manifests = config::workspace_manifests(&manifest, &base_dir);
    let graph = Arc::new(WorkspaceGraph::build(manifests)?);

    let scope = if args.scope.is_empty() {
        None
    } else {
        Some(args.scope.clone())
    };

    let cache = CacheStore::new(base_dir.join(&manifest.settings.cache_dir));
    if manifest.remote.is_some() {
        // The remote tier is pluggable through the library API
        // (`CacheStore::with_remote`); the standalone binary ships without a
        // backend and runs against the local tier.
        warn!("[remote] configured but no remote backend is linked in; using local cache only");
    }

    let scheduler = Arc::new(Scheduler::new(
        graph.clone(),
        cache,
        Arc::new(LogStatusSink),
    ));

    let mut options = RunOptions::default();
    if let Some(n) = args.concurrency.or(manifest.settings.concurrency) {
        options.concurrency = n.max(1);
    }

    if args.dry_run {
        let plan = scheduler.plan(&args.target, scope.as_deref())?;
        print_plan(&plan);
        return Ok(true);
    }

    let executor: Arc<dyn Executor> = Arc::new(CommandExecutor::new());

    if args.watch {
        run_watch(scheduler, &args.target, scope, options, executor, &base_dir).await?;
        return Ok(true);
    }

    // First Ctrl-C stops admitting new nodes, a second one kills what is
    // still running.
    let (cancel_handle, cancel_token) = cancel_pair();
    options.cancel = Some(cancel_token);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt: finishing running targets, admitting nothing new");
            cancel_handle.cancel_soft();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("second interrupt: stopping running targets");
            cancel_handle.cancel_hard();
        }
    });

    let plan = scheduler.plan(&args.target, scope.as_deref())?;
    let report = scheduler.run(&plan, &options, executor).await?;
    summarize(&report);
    Ok(report.success())
}

async fn run_watch(
    scheduler: Arc<Scheduler>,
    target: &str,
    scope: Option<Vec<String>>,
    options: RunOptions,
    executor: Arc<dyn Executor>,
    base_dir: &Path,
) -> Result<()> {
    let profiles = watch::build_watch_profiles(scheduler.graph(), base_dir)?;
    let (tx, rx) = mpsc::channel(256);
    let _watcher = watch::spawn_watcher(base_dir, profiles, tx)?;

    let session = WatchSession::new(scheduler, target, scope, options, executor, rx);
    info!(root = %base_dir.display(), "watching for changes (Ctrl-C to stop)");

    tokio::select! {
        res = session.run() => res,
        _ = tokio::signal::ctrl_c() => {
            info!("stopping watch");
            Ok(())
        }
    }
}

fn print_plan(plan: &ExecutionPlan) {
    println!("target: {}", plan.target);
    if plan.is_empty() {
        println!("(no workspace declares this target in scope)");
        return;
    }
    for node in &plan.nodes {
        if node.deps.is_empty() {
            println!("  {}", node.workspace);
        } else {
            println!("  {}  (after {})", node.workspace, node.deps.join(", "));
        }
    }
}

fn summarize(report: &RunReport) {
    info!(
        target = %report.target,
        succeeded = report.count(NodeStatus::Succeeded),
        cached = report.count(NodeStatus::FromCache),
        failed = report.count(NodeStatus::Failed),
        skipped = report.count(NodeStatus::Skipped),
        "run complete"
    );
    for (workspace, error) in &report.errors {
        warn!(%workspace, "failed: {error}");
    }
}
