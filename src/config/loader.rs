// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::ManifestFile;
use crate::config::validate::validate_manifest;
use crate::errors::Result;
use crate::graph::{TargetSpec, WorkspaceKind, WorkspaceManifest};

/// Load a manifest file from a given path and return the raw `ManifestFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<ManifestFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    let manifest: ManifestFile = toml::from_str(&contents)?;
    Ok(manifest)
}

/// Load a manifest file from path and run semantic validation.
///
/// This is the recommended entry point for the rest of the application; the
/// result feeds [`workspace_manifests`] and then graph construction.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ManifestFile> {
    let manifest = load_from_path(&path)?;
    validate_manifest(&manifest)?;
    Ok(manifest)
}

/// Turn the TOML sections into the fixed per-workspace structs the graph is
/// built from, resolving workspace roots against the manifest's directory.
pub fn workspace_manifests(cfg: &ManifestFile, base_dir: &Path) -> Vec<WorkspaceManifest> {
    cfg.workspace
        .iter()
        .map(|(name, ws)| WorkspaceManifest {
            name: name.clone(),
            root_path: base_dir.join(&ws.root),
            kind: match ws.kind {
                crate::config::model::KindField::Package => WorkspaceKind::Package,
                crate::config::model::KindField::Service => WorkspaceKind::Service,
            },
            declared_dependencies: ws.depends_on.clone(),
            targets: ws
                .target
                .iter()
                .map(|(t, spec)| {
                    (
                        t.clone(),
                        TargetSpec {
                            command: spec.cmd.clone(),
                            source_globs: spec.sources.clone(),
                            ready_pattern: spec.ready_pattern.clone(),
                        },
                    )
                })
                .collect(),
        })
        .collect()
}

/// Directory containing the manifest, used as the base for workspace roots
/// and the watch root. Falls back to `.`.
pub fn manifest_base_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}
