// src/engine/service.rs

use std::collections::HashMap;
use std::process::Stdio;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::{MonodagError, Result};
use crate::graph::Workspace;

/// Observed state of a supervised service process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    NotRunning,
    Running { pid: Option<u32> },
}

struct ServiceHandle {
    target: String,
    child: Child,
}

/// Manages long-running service processes outside the batch-run model
/// (local service emulation).
///
/// Invariant: at most one live process per workspace at a time. Starting an
/// already-running service is a no-op that reports the current state, never
/// a duplicate launch.
#[derive(Default)]
pub struct ServiceSupervisor {
    procs: Mutex<HashMap<String, ServiceHandle>>,
}

impl ServiceSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a service target for a workspace, unless it is already running.
    pub async fn start_one(&self, workspace: &Workspace, target: &str) -> Result<ServiceState> {
        let spec = workspace
            .target(target)
            .ok_or_else(|| MonodagError::TargetNotFound {
                workspace: workspace.name.clone(),
                target: target.to_string(),
            })?;

        let mut procs = self.procs.lock().await;

        // Reap a previously started process that has since exited.
        if let Some(handle) = procs.get_mut(&workspace.name) {
            match handle.child.try_wait() {
                Ok(None) => {
                    let pid = handle.child.id();
                    debug!(
                        workspace = %workspace.name,
                        target = %handle.target,
                        "service already running; start is a no-op"
                    );
                    return Ok(ServiceState::Running { pid });
                }
                Ok(Some(status)) => {
                    debug!(
                        workspace = %workspace.name,
                        exit = ?status.code(),
                        "previous service process exited; restarting"
                    );
                    procs.remove(&workspace.name);
                }
                Err(e) => {
                    warn!(workspace = %workspace.name, error = %e, "polling service process failed");
                    procs.remove(&workspace.name);
                }
            }
        }

        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&spec.command);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&spec.command);
            c
        };
        cmd.current_dir(&workspace.root_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = child_spawn(cmd, &workspace.name, target)?;
        let pid = child.id();

        if let Some(stdout) = child.stdout.take() {
            spawn_ready_monitor(&workspace.name, spec.ready_pattern.as_deref(), stdout);
        }

        info!(workspace = %workspace.name, target = %target, ?pid, "service started");
        procs.insert(
            workspace.name.clone(),
            ServiceHandle {
                target: target.to_string(),
                child,
            },
        );
        Ok(ServiceState::Running { pid })
    }

    /// Stop the workspace's live process, if any.
    pub async fn stop_one(&self, workspace: &str) -> Result<ServiceState> {
        let mut procs = self.procs.lock().await;
        let Some(mut handle) = procs.remove(workspace) else {
            debug!(workspace = %workspace, "service not running; stop is a no-op");
            return Ok(ServiceState::NotRunning);
        };

        if let Err(e) = handle.child.kill().await {
            warn!(workspace = %workspace, error = %e, "killing service process failed");
        }
        info!(workspace = %workspace, target = %handle.target, "service stopped");
        Ok(ServiceState::NotRunning)
    }

    /// Stop (if running) and start again.
    pub async fn restart_one(&self, workspace: &Workspace, target: &str) -> Result<ServiceState> {
        self.stop_one(&workspace.name).await?;
        self.start_one(workspace, target).await
    }

    /// Current state of a workspace's service process.
    pub async fn state_of(&self, workspace: &str) -> ServiceState {
        let mut procs = self.procs.lock().await;
        match procs.get_mut(workspace) {
            Some(handle) => match handle.child.try_wait() {
                Ok(None) => ServiceState::Running {
                    pid: handle.child.id(),
                },
                _ => {
                    procs.remove(workspace);
                    ServiceState::NotRunning
                }
            },
            None => ServiceState::NotRunning,
        }
    }
}

fn child_spawn(mut cmd: Command, workspace: &str, target: &str) -> Result<Child> {
    cmd.spawn().map_err(|e| {
        MonodagError::Other(anyhow::anyhow!(
            "spawning service process for '{workspace}:{target}': {e}"
        ))
    })
}

/// Watch stdout for the ready pattern, logging when the service comes up.
/// Lines are drained either way so the pipe buffer never fills.
fn spawn_ready_monitor(
    workspace: &str,
    ready_pattern: Option<&str>,
    stdout: tokio::process::ChildStdout,
) {
    let workspace = workspace.to_string();
    let regex = ready_pattern.and_then(|pat| match Regex::new(pat) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(workspace = %workspace, pattern = %pat, error = %e, "invalid ready_pattern; ignoring");
            None
        }
    });

    tokio::spawn(async move {
        let reader = BufReader::new(stdout);
        let mut lines = reader.lines();
        let mut ready = false;

        while let Ok(Some(line)) = lines.next_line().await {
            debug!(workspace = %workspace, "service stdout: {}", line);
            if !ready {
                if let Some(re) = &regex {
                    if re.is_match(&line) {
                        ready = true;
                        info!(workspace = %workspace, "service reported ready");
                    }
                }
            }
        }

        debug!(workspace = %workspace, "service stdout closed");
    });
}
