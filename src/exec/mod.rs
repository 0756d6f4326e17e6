// src/exec/mod.rs

//! Executor boundary.
//!
//! The scheduler never interprets what a target actually does; it hands an
//! [`ExecRequest`] to an [`Executor`] and waits for the outcome. The default
//! implementation spawns shell processes ([`command`]); tests substitute a
//! fake.

pub mod command;

use std::future::Future;
use std::pin::Pin;

use crate::checksum::Fingerprint;
use crate::graph::Workspace;

/// Boxed future used at trait boundaries, so executors stay object-safe.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Everything an executor needs to run one target once.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    pub workspace: Workspace,
    pub target: String,
    pub fingerprint: Fingerprint,
}

/// Result of one target execution.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub success: bool,
    /// Captured output bytes; stored as the cache artifact on success.
    pub output: Vec<u8>,
    pub error: Option<String>,
}

impl ExecOutcome {
    pub fn success(output: Vec<u8>) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Executes targets. May spawn external processes, call a deployment
/// pipeline, or run in-process; the scheduler does not care.
pub trait Executor: Send + Sync {
    fn execute(&self, req: ExecRequest) -> BoxFuture<ExecOutcome>;

    /// Cancellation hook invoked on hard-stop for nodes still running.
    /// Default: nothing to interrupt.
    fn cancel(&self, _workspace: &str, _target: &str) {}
}

pub use command::CommandExecutor;
