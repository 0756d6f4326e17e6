// src/engine/mod.rs

//! Execution engine.
//!
//! - [`plan`] turns a graph + target into an ordered, scope-restricted
//!   execution plan with transient per-run node state.
//! - [`scheduler`] runs plans with bounded parallelism, cache consultation,
//!   contagious failure, cancellation and deadlines.
//! - [`report`] is the per-run result surfaced to callers.
//! - [`service`] supervises long-running service processes outside the
//!   batch-run model.

pub mod plan;
pub mod report;
pub mod scheduler;
pub mod service;

pub use plan::{ExecutionNode, ExecutionPlan, NodeStatus, PlanNode, SkipReason};
pub use report::{NodeReport, RunReport};
pub use scheduler::{
    CancelHandle, CancelState, CancelToken, RunOptions, Scheduler, cancel_pair,
    default_concurrency,
};
pub use service::{ServiceState, ServiceSupervisor};
