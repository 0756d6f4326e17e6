// src/exec/command.rs

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::exec::{BoxFuture, ExecOutcome, ExecRequest, Executor};

type KillKey = (String, String);

/// Executor that runs target commands as shell processes in the workspace
/// root directory.
///
/// Stdout is captured as the execution output (and becomes the cache
/// artifact); stderr is drained and logged at debug so OS pipe buffers never
/// fill up. A kill channel is registered per (workspace, target) so a
/// hard-stop can interrupt a running process through [`Executor::cancel`].
#[derive(Default)]
pub struct CommandExecutor {
    kill_channels: Arc<Mutex<HashMap<KillKey, oneshot::Sender<()>>>>,
}

impl CommandExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Executor for CommandExecutor {
    fn execute(&self, req: ExecRequest) -> BoxFuture<ExecOutcome> {
        let kill_channels = Arc::clone(&self.kill_channels);
        Box::pin(async move { run_command(req, kill_channels).await })
    }

    fn cancel(&self, workspace: &str, target: &str) {
        let key = (workspace.to_string(), target.to_string());
        let sender = {
            let mut guard = match self.kill_channels.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.remove(&key)
        };
        if let Some(sender) = sender {
            debug!(workspace = %key.0, target = %key.1, "sending kill signal to running target");
            let _ = sender.send(());
        }
    }
}

async fn run_command(
    req: ExecRequest,
    kill_channels: Arc<Mutex<HashMap<KillKey, oneshot::Sender<()>>>>,
) -> ExecOutcome {
    let command = match req.workspace.target(&req.target) {
        Some(spec) => spec.command.clone(),
        None => {
            return ExecOutcome::failure(format!(
                "workspace '{}' has no target '{}'",
                req.workspace.name, req.target
            ));
        }
    };

    info!(
        workspace = %req.workspace.name,
        target = %req.target,
        cmd = %command,
        "starting target process"
    );

    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(&command);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(&command);
        c
    };

    cmd.current_dir(&req.workspace.root_path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return ExecOutcome::failure(format!(
                "spawning process for '{}:{}': {e}",
                req.workspace.name, req.target
            ));
        }
    };

    // Register the kill channel for hard-stop cancellation.
    let key = (req.workspace.name.clone(), req.target.clone());
    let (kill_tx, kill_rx) = oneshot::channel::<()>();
    {
        let mut guard = match kill_channels.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.insert(key.clone(), kill_tx);
    }

    // Drain stderr in the background, logged at debug.
    if let Some(stderr) = child.stderr.take() {
        let workspace = req.workspace.name.clone();
        tokio::spawn(async move {
            let reader = BufReader::new(stderr);
            let mut lines = reader.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(workspace = %workspace, "stderr: {}", line);
            }
        });
    }

    // Collect stdout in the background; it becomes the cached artifact.
    // Captured as raw bytes: target output is not required to be UTF-8.
    let stdout_task = {
        let stdout = child.stdout.take();
        let workspace = req.workspace.name.clone();
        tokio::spawn(async move {
            let mut output = Vec::new();
            if let Some(mut stdout) = stdout {
                if let Err(e) = stdout.read_to_end(&mut output).await {
                    warn!(workspace = %workspace, "reading stdout: {e}");
                }
                for line in String::from_utf8_lossy(&output).lines() {
                    debug!(workspace = %workspace, "stdout: {}", line);
                }
            }
            output
        })
    };

    let outcome = tokio::select! {
        status = child.wait() => {
            let output = stdout_task.await.unwrap_or_default();
            match status {
                Ok(status) if status.success() => ExecOutcome::success(output),
                Ok(status) => ExecOutcome::failure(format!(
                    "process exited with code {}",
                    status.code().unwrap_or(-1)
                )),
                Err(e) => ExecOutcome::failure(format!("waiting for process: {e}")),
            }
        }
        _ = kill_rx => {
            warn!(
                workspace = %req.workspace.name,
                target = %req.target,
                "killing target process on cancellation"
            );
            let _ = child.kill().await;
            ExecOutcome::failure("cancelled")
        }
    };

    {
        let mut guard = match kill_channels.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.remove(&key);
    }

    info!(
        workspace = %req.workspace.name,
        target = %req.target,
        success = outcome.success,
        "target process finished"
    );
    outcome
}
