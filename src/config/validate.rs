// src/config/validate.rs

use globset::Glob;
use regex::Regex;

use crate::config::model::ManifestFile;
use crate::errors::{MonodagError, Result};

/// Run semantic validation against a loaded manifest.
///
/// This checks:
/// - there is at least one workspace
/// - `depends_on` references exist and are not self-references
/// - every target has a non-empty command
/// - source globs compile
/// - `ready_pattern` regexes compile
///
/// Acyclicity is **not** checked here; graph construction does that and
/// reports the full cycle path.
pub fn validate_manifest(cfg: &ManifestFile) -> Result<()> {
    ensure_has_workspaces(cfg)?;
    validate_dependencies(cfg)?;
    validate_targets(cfg)?;
    Ok(())
}

fn ensure_has_workspaces(cfg: &ManifestFile) -> Result<()> {
    if cfg.workspace.is_empty() {
        return Err(MonodagError::InvalidManifest(
            "manifest must contain at least one [workspace.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_dependencies(cfg: &ManifestFile) -> Result<()> {
    for (name, ws) in cfg.workspace.iter() {
        for dep in ws.depends_on.iter() {
            if !cfg.workspace.contains_key(dep) {
                return Err(MonodagError::InvalidManifest(format!(
                    "workspace '{name}' has unknown dependency '{dep}' in `depends_on`"
                )));
            }
            if dep == name {
                return Err(MonodagError::InvalidManifest(format!(
                    "workspace '{name}' cannot depend on itself"
                )));
            }
        }
    }
    Ok(())
}

fn validate_targets(cfg: &ManifestFile) -> Result<()> {
    for (name, ws) in cfg.workspace.iter() {
        for (target_name, target) in ws.target.iter() {
            if target.cmd.trim().is_empty() {
                return Err(MonodagError::InvalidManifest(format!(
                    "workspace '{name}' target '{target_name}' has an empty `cmd`"
                )));
            }

            for pat in target.sources.iter() {
                Glob::new(pat).map_err(|e| {
                    MonodagError::InvalidManifest(format!(
                        "workspace '{name}' target '{target_name}' has invalid glob '{pat}': {e}"
                    ))
                })?;
            }

            if let Some(ref pat) = target.ready_pattern {
                Regex::new(pat).map_err(|e| {
                    MonodagError::InvalidManifest(format!(
                        "workspace '{name}' target '{target_name}' has invalid ready_pattern: {e}"
                    ))
                })?;
            }
        }
    }
    Ok(())
}
