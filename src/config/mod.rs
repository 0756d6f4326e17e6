// src/config/mod.rs

//! Manifest loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a manifest file from disk (`loader.rs`).
//! - Validate references and patterns (`validate.rs`).
//!
//! The dynamic TOML shapes become fixed [`crate::graph::WorkspaceManifest`]
//! structs at this boundary; everything downstream works with those.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, manifest_base_dir, workspace_manifests};
pub use model::{ManifestFile, RemoteSection, SettingsSection, TargetSection, WorkspaceSection};
pub use validate::validate_manifest;
