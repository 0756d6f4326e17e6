// src/watch/mod.rs

//! Filesystem watch bridge: maps source changes to workspace invalidations
//! and drives incremental re-runs.
//!
//! The flow is profile -> event -> session: [`profiles`] compiles each
//! workspace's source globs, [`watcher`] turns notify events into
//! per-workspace [`InvalidateEvent`]s, and [`session::WatchSession`] coalesces
//! them and re-runs the affected subgraph.

pub mod profiles;
pub mod session;
pub mod watcher;

pub use profiles::{WorkspaceWatchProfile, build_watch_profiles};
pub use session::WatchSession;
pub use watcher::{FsWatcher, InvalidateEvent, spawn_watcher};
