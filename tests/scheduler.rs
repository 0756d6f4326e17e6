// tests/scheduler.rs

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use monodag::cache::CacheStore;
use monodag::engine::{NodeStatus, RunOptions, Scheduler, SkipReason, cancel_pair};
use monodag::exec::Executor;
use monodag::graph::WorkspaceGraph;
use monodag::status::{LogStatusSink, StatusSink, StatusTransition};
use monodag_test_utils::builders::{ProjectBuilder, WorkspaceBuilder, write_file};
use monodag_test_utils::fake_executor::FakeExecutor;
use monodag_test_utils::{init_tracing, with_timeout};
use tempfile::TempDir;

fn scheduler_for(graph: WorkspaceGraph, cache_root: &Path) -> Scheduler {
    Scheduler::new(
        Arc::new(graph),
        CacheStore::new(cache_root),
        Arc::new(LogStatusSink),
    )
}

/// pkgA <- pkgB <- svcC, plus an independent pkgD.
fn pipeline(tmp: &TempDir) -> WorkspaceGraph {
    ProjectBuilder::new(tmp.path())
        .workspace(
            WorkspaceBuilder::package("pkgA")
                .target_with_sources("build", "tsc", &["src/**"])
                .file("src/lib.ts", "a v1\n"),
        )
        .workspace(
            WorkspaceBuilder::package("pkgB")
                .depends_on("pkgA")
                .target_with_sources("build", "tsc", &["src/**"])
                .file("src/lib.ts", "b v1\n"),
        )
        .workspace(
            WorkspaceBuilder::service("svcC")
                .depends_on("pkgB")
                .target_with_sources("build", "tsc", &["src/**"])
                .file("src/main.ts", "c v1\n"),
        )
        .workspace(
            WorkspaceBuilder::package("pkgD")
                .target_with_sources("build", "tsc", &["src/**"])
                .file("src/lib.ts", "d v1\n"),
        )
        .graph()
}

fn options(concurrency: usize) -> RunOptions {
    RunOptions {
        concurrency,
        ..RunOptions::default()
    }
}

#[tokio::test]
async fn chain_runs_in_dependency_order() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let scheduler = scheduler_for(pipeline(&tmp), cache.path());
    let exec = Arc::new(FakeExecutor::new());

    let plan = scheduler
        .plan("build", Some(&["svcC".to_string()]))
        .unwrap();
    let report = with_timeout(scheduler.run(&plan, &options(4), exec.clone()))
        .await
        .unwrap();

    assert_eq!(
        exec.invocations(),
        vec!["pkgA:build", "pkgB:build", "svcC:build"]
    );
    assert!(report.success());
    assert_eq!(report.nodes.len(), 3);
    for ws in ["pkgA", "pkgB", "svcC"] {
        assert_eq!(report.status_of(ws), Some(NodeStatus::Succeeded));
        assert!(report.nodes[ws].fingerprint_digest.is_some());
    }
}

#[tokio::test]
async fn unchanged_rerun_is_served_from_cache() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let scheduler = scheduler_for(pipeline(&tmp), cache.path());

    let plan = scheduler.plan("build", None).unwrap();
    let first = Arc::new(FakeExecutor::new());
    with_timeout(scheduler.run(&plan, &options(4), first.clone()))
        .await
        .unwrap();
    assert_eq!(first.invocation_count(), 4);

    let second = Arc::new(FakeExecutor::new());
    let report = with_timeout(scheduler.run(&plan, &options(4), second.clone()))
        .await
        .unwrap();

    assert_eq!(second.invocation_count(), 0);
    assert_eq!(report.count(NodeStatus::FromCache), 4);
    assert!(report.success());
}

#[tokio::test]
async fn touched_source_reruns_the_affected_closure_only() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let scheduler = scheduler_for(pipeline(&tmp), cache.path());

    let plan = scheduler.plan("build", None).unwrap();
    with_timeout(scheduler.run(&plan, &options(4), Arc::new(FakeExecutor::new())))
        .await
        .unwrap();

    write_file(&tmp.path().join("pkgA"), "src/lib.ts", "a v2\n");

    let exec = Arc::new(FakeExecutor::new());
    let report = with_timeout(scheduler.run(&plan, &options(4), exec.clone()))
        .await
        .unwrap();

    assert_eq!(
        exec.invocations(),
        vec!["pkgA:build", "pkgB:build", "svcC:build"]
    );
    // Untouched sibling stays cached.
    assert_eq!(report.status_of("pkgD"), Some(NodeStatus::FromCache));
    assert_eq!(report.count(NodeStatus::Succeeded), 3);
}

#[tokio::test]
async fn failure_is_contagious_to_transitive_dependents() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let scheduler = scheduler_for(pipeline(&tmp), cache.path());
    let exec = Arc::new(FakeExecutor::new().fail_on("pkgA"));

    let plan = scheduler.plan("build", None).unwrap();
    let report = with_timeout(scheduler.run(&plan, &options(4), exec.clone()))
        .await
        .unwrap();

    assert!(!report.success());
    assert_eq!(report.status_of("pkgA"), Some(NodeStatus::Failed));
    for ws in ["pkgB", "svcC"] {
        assert_eq!(report.status_of(ws), Some(NodeStatus::Skipped));
        assert_eq!(
            report.nodes[ws].skip_reason,
            Some(SkipReason::UpstreamFailed("pkgA".to_string()))
        );
        assert!(!exec.invoked(ws, "build"), "{ws} must never execute");
    }
    // Independent branch is unaffected by the failure.
    assert_eq!(report.status_of("pkgD"), Some(NodeStatus::Succeeded));
    assert!(report.errors.contains_key("pkgA"));
}

#[tokio::test]
async fn concurrency_limit_is_honoured() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let mut builder = ProjectBuilder::new(tmp.path());
    for i in 0..6 {
        builder = builder.workspace(
            WorkspaceBuilder::package(&format!("w{i}"))
                .target("build", "true")
                .file("src/lib.ts", &format!("w{i}\n")),
        );
    }
    let scheduler = scheduler_for(builder.graph(), cache.path());
    let exec = Arc::new(FakeExecutor::new().with_delay(Duration::from_millis(50)));

    let plan = scheduler.plan("build", None).unwrap();
    let report = with_timeout(scheduler.run(&plan, &options(2), exec.clone()))
        .await
        .unwrap();

    assert!(report.success());
    assert_eq!(exec.invocation_count(), 6);
    assert!(
        exec.max_concurrency() <= 2,
        "saw {} concurrent executions",
        exec.max_concurrency()
    );
}

#[tokio::test]
async fn soft_cancel_finishes_running_and_skips_pending() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let scheduler = scheduler_for(pipeline(&tmp), cache.path());
    let exec = Arc::new(FakeExecutor::new().with_delay(Duration::from_millis(150)));

    let (handle, token) = cancel_pair();
    let opts = RunOptions {
        concurrency: 1,
        cancel: Some(token),
        ..RunOptions::default()
    };
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(40)).await;
        handle.cancel_soft();
    });

    let plan = scheduler
        .plan("build", Some(&["svcC".to_string()]))
        .unwrap();
    let report = with_timeout(scheduler.run(&plan, &opts, exec.clone()))
        .await
        .unwrap();

    // The in-flight node runs to completion; nothing new is admitted.
    assert_eq!(report.status_of("pkgA"), Some(NodeStatus::Succeeded));
    for ws in ["pkgB", "svcC"] {
        assert_eq!(report.status_of(ws), Some(NodeStatus::Skipped));
        assert_eq!(report.nodes[ws].skip_reason, Some(SkipReason::Cancelled));
    }
    assert_eq!(exec.invocation_count(), 1);
}

#[tokio::test]
async fn hard_cancel_kills_the_running_node() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let scheduler = scheduler_for(pipeline(&tmp), cache.path());
    let exec = Arc::new(FakeExecutor::new().with_delay(Duration::from_millis(500)));

    let (handle, token) = cancel_pair();
    let opts = RunOptions {
        concurrency: 1,
        cancel: Some(token),
        ..RunOptions::default()
    };
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(40)).await;
        handle.cancel_hard();
    });

    let plan = scheduler
        .plan("build", Some(&["svcC".to_string()]))
        .unwrap();
    let report = with_timeout(scheduler.run(&plan, &opts, exec.clone()))
        .await
        .unwrap();

    // The running node is interrupted through the executor hook and reports
    // the interruption as its failure; nothing downstream ever starts.
    assert_eq!(exec.cancellations(), vec!["pkgA:build"]);
    assert_eq!(report.status_of("pkgA"), Some(NodeStatus::Failed));
    for ws in ["pkgB", "svcC"] {
        assert_eq!(report.status_of(ws), Some(NodeStatus::Skipped));
        assert_eq!(report.nodes[ws].skip_reason, Some(SkipReason::Cancelled));
    }
    assert_eq!(exec.invocation_count(), 1);
}

#[tokio::test]
async fn cancelled_node_parked_on_the_exec_lock_never_starts() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let scheduler = Arc::new(scheduler_for(pipeline(&tmp), cache.path()));
    let plan = scheduler
        .plan("build", Some(&["pkgA".to_string()]))
        .unwrap();

    // First run holds pkgA's execution lock for a while and fails, so the
    // second run cannot be satisfied from cache when the lock frees up.
    let blocker = Arc::new(
        FakeExecutor::new()
            .with_delay(Duration::from_millis(300))
            .fail_on("pkgA"),
    );
    let first = tokio::spawn({
        let scheduler = Arc::clone(&scheduler);
        let plan = plan.clone();
        let blocker = Arc::clone(&blocker);
        async move { scheduler.run(&plan, &options(1), blocker).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (handle, token) = cancel_pair();
    let opts = RunOptions {
        concurrency: 1,
        cancel: Some(token),
        ..RunOptions::default()
    };
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel_soft();
    });

    let exec = Arc::new(FakeExecutor::new());
    let report = with_timeout(scheduler.run(&plan, &opts, exec.clone()))
        .await
        .unwrap();

    // The parked node was soft-cancelled before it ever started, so it backs
    // off when the lock frees up instead of launching its executor.
    assert_eq!(report.status_of("pkgA"), Some(NodeStatus::Skipped));
    assert_eq!(
        report.nodes["pkgA"].skip_reason,
        Some(SkipReason::Cancelled)
    );
    assert_eq!(exec.invocation_count(), 0);

    let first_report = first.await.unwrap().unwrap();
    assert_eq!(first_report.status_of("pkgA"), Some(NodeStatus::Failed));
}

#[tokio::test]
async fn deadline_skips_whatever_has_not_started() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let scheduler = scheduler_for(pipeline(&tmp), cache.path());
    let exec = Arc::new(FakeExecutor::new().with_delay(Duration::from_millis(150)));

    let opts = RunOptions {
        concurrency: 1,
        deadline: Some(Duration::from_millis(40)),
        ..RunOptions::default()
    };
    let plan = scheduler
        .plan("build", Some(&["svcC".to_string()]))
        .unwrap();
    let report = with_timeout(scheduler.run(&plan, &opts, exec.clone()))
        .await
        .unwrap();

    // Deadline expiry never kills a running executor.
    assert_eq!(report.status_of("pkgA"), Some(NodeStatus::Succeeded));
    for ws in ["pkgB", "svcC"] {
        assert_eq!(
            report.nodes[ws].skip_reason,
            Some(SkipReason::DeadlineExpired)
        );
    }
}

#[tokio::test]
async fn target_nobody_declares_yields_an_empty_run() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let scheduler = scheduler_for(pipeline(&tmp), cache.path());

    let plan = scheduler.plan("deploy", None).unwrap();
    assert!(plan.is_empty());

    let report = with_timeout(scheduler.run(&plan, &options(4), Arc::new(FakeExecutor::new())))
        .await
        .unwrap();
    assert!(report.success());
    assert!(report.nodes.is_empty());
}

struct RecordingSink(Mutex<Vec<StatusTransition>>);

impl StatusSink for RecordingSink {
    fn publish(&self, transition: StatusTransition) {
        self.0.lock().unwrap().push(transition);
    }
}

#[tokio::test]
async fn status_transitions_are_ordered_per_node() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let sink = Arc::new(RecordingSink(Mutex::new(vec![])));
    let scheduler = Scheduler::new(
        Arc::new(pipeline(&tmp)),
        CacheStore::new(cache.path()),
        sink.clone(),
    );

    let plan = scheduler
        .plan("build", Some(&["pkgA".to_string()]))
        .unwrap();
    with_timeout(scheduler.run(&plan, &options(1), Arc::new(FakeExecutor::new())))
        .await
        .unwrap();

    let seen: Vec<NodeStatus> = sink
        .0
        .lock()
        .unwrap()
        .iter()
        .filter(|t| t.workspace == "pkgA")
        .map(|t| t.status)
        .collect();
    assert_eq!(
        seen,
        vec![NodeStatus::Pending, NodeStatus::Running, NodeStatus::Succeeded]
    );

    // A cached re-run goes Pending -> FromCache, never through Running.
    sink.0.lock().unwrap().clear();
    with_timeout(scheduler.run(&plan, &options(1), Arc::new(FakeExecutor::new())))
        .await
        .unwrap();
    let seen: Vec<NodeStatus> = sink
        .0
        .lock()
        .unwrap()
        .iter()
        .filter(|t| t.workspace == "pkgA")
        .map(|t| t.status)
        .collect();
    assert_eq!(seen, vec![NodeStatus::Pending, NodeStatus::FromCache]);
}
