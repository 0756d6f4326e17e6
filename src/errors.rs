// src/errors.rs

//! Crate-wide error taxonomy.
//!
//! Graph construction and fingerprinting failures are fatal and unwind out of
//! `plan`/`run`; executor failures are captured per-node in the run report;
//! cache-tier failures never surface here at all (they degrade to misses).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonodagError {
    #[error("cyclic dependency between workspaces: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    #[error("unknown workspace: {0}")]
    WorkspaceNotFound(String),

    #[error("workspace '{workspace}' declares no target '{target}'")]
    TargetNotFound { workspace: String, target: String },

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("checksum failure for workspace '{workspace}': {message}")]
    Checksum { workspace: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, MonodagError>;
