// tests/exec.rs

#![cfg(unix)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use monodag::checksum::Fingerprint;
use monodag::exec::{CommandExecutor, ExecRequest, Executor};
use monodag::graph::Workspace;
use monodag_test_utils::builders::{ProjectBuilder, WorkspaceBuilder};
use monodag_test_utils::{init_tracing, with_timeout};
use tempfile::TempDir;

fn request(ws: &Workspace, target: &str) -> ExecRequest {
    ExecRequest {
        workspace: ws.clone(),
        target: target.to_string(),
        fingerprint: Fingerprint::new(BTreeMap::new(), BTreeMap::new()),
    }
}

#[tokio::test]
async fn captures_stdout_of_a_successful_command() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let graph = ProjectBuilder::new(tmp.path())
        .workspace(WorkspaceBuilder::package("pkg").target("build", "echo hello from build"))
        .graph();
    let ws = graph.get("pkg").unwrap();

    let exec = CommandExecutor::new();
    let outcome = with_timeout(exec.execute(request(ws, "build"))).await;

    assert!(outcome.success);
    assert_eq!(
        String::from_utf8_lossy(&outcome.output).trim(),
        "hello from build"
    );
}

#[tokio::test]
async fn captures_non_utf8_output_byte_for_byte() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let graph = ProjectBuilder::new(tmp.path())
        .workspace(WorkspaceBuilder::package("pkg").target(
            "build",
            r"printf 'before\n'; printf '\377\376\n'; printf 'after\n'",
        ))
        .graph();
    let ws = graph.get("pkg").unwrap();

    let exec = CommandExecutor::new();
    let outcome = with_timeout(exec.execute(request(ws, "build"))).await;

    // Invalid UTF-8 in the middle must not truncate or reshape the capture.
    assert!(outcome.success);
    assert_eq!(outcome.output, b"before\n\xff\xfe\nafter\n");
}

#[tokio::test]
async fn nonzero_exit_is_a_failure_with_an_error() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let graph = ProjectBuilder::new(tmp.path())
        .workspace(WorkspaceBuilder::package("pkg").target("build", "exit 3"))
        .graph();
    let ws = graph.get("pkg").unwrap();

    let exec = CommandExecutor::new();
    let outcome = with_timeout(exec.execute(request(ws, "build"))).await;

    assert!(!outcome.success);
    assert!(outcome.error.is_some());
}

#[tokio::test]
async fn runs_in_the_workspace_root() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let graph = ProjectBuilder::new(tmp.path())
        .workspace(
            WorkspaceBuilder::package("pkg")
                .target("build", "cat marker.txt")
                .file("marker.txt", "inside the workspace"),
        )
        .graph();
    let ws = graph.get("pkg").unwrap();

    let exec = CommandExecutor::new();
    let outcome = with_timeout(exec.execute(request(ws, "build"))).await;

    assert!(outcome.success);
    assert_eq!(
        String::from_utf8_lossy(&outcome.output).trim(),
        "inside the workspace"
    );
}

#[tokio::test]
async fn cancel_kills_a_running_command() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let graph = ProjectBuilder::new(tmp.path())
        .workspace(WorkspaceBuilder::package("pkg").target("build", "sleep 30"))
        .graph();
    let ws = graph.get("pkg").unwrap().clone();

    let exec = Arc::new(CommandExecutor::new());
    let fut = exec.execute(request(&ws, "build"));
    let task = tokio::spawn(fut);

    tokio::time::sleep(Duration::from_millis(100)).await;
    exec.cancel("pkg", "build");

    let outcome = with_timeout(async { task.await.unwrap() }).await;
    assert!(!outcome.success);
    assert!(outcome.error.as_deref().unwrap_or("").contains("cancelled"));
}
