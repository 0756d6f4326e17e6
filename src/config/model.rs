// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

/// Top-level manifest as read from a TOML file.
///
/// ```toml
/// [settings]
/// concurrency = 4
/// cache_dir = ".monodag/cache"
///
/// [remote]
/// region = "eu-west-1"
/// bucket = "artifacts"
/// table = "artifact-index"
/// env = "dev"
///
/// [workspace.pkg-a]
/// root = "packages/a"
/// kind = "package"
/// depends_on = ["pkg-b"]
///
/// [workspace.pkg-a.target.build]
/// cmd = "npm run build"
/// sources = ["src/**/*.ts", "package.json"]
/// ```
///
/// All sections except `[workspace.<name>]` are optional.
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestFile {
    /// Global behaviour from `[settings]`.
    #[serde(default)]
    pub settings: SettingsSection,

    /// Optional remote cache tier from `[remote]`; absent means local-only.
    #[serde(default)]
    pub remote: Option<RemoteSection>,

    /// All workspaces from `[workspace.<name>]`, keyed by workspace name.
    #[serde(default)]
    pub workspace: BTreeMap<String, WorkspaceSection>,
}

/// `[settings]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SettingsSection {
    /// Maximum concurrent target executions; `None` means use the machine's
    /// available parallelism.
    #[serde(default)]
    pub concurrency: Option<usize>,

    /// Root of the local cache tier, relative to the manifest directory.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
}

fn default_cache_dir() -> String {
    ".monodag/cache".to_string()
}

impl Default for SettingsSection {
    fn default() -> Self {
        Self {
            concurrency: None,
            cache_dir: default_cache_dir(),
        }
    }
}

/// `[remote]` section: addressing for the object-store + table-index tier.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSection {
    pub region: String,
    pub bucket: String,
    pub table: String,
    /// Deployment environment the cache entries belong to (e.g. "dev").
    #[serde(default = "default_env")]
    pub env: String,

    /// Bounded retry for remote reads/writes.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Backoff between attempts, in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_env() -> String {
    "dev".to_string()
}

fn default_retry_attempts() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    250
}

/// `[workspace.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceSection {
    /// Workspace root directory, relative to the manifest directory.
    pub root: String,

    /// `"package"` (library) or `"service"` (deployable).
    #[serde(default)]
    pub kind: KindField,

    /// Direct dependencies: names of workspaces this one builds on.
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Named targets from `[workspace.<name>.target.<t>]`.
    #[serde(default)]
    pub target: BTreeMap<String, TargetSection>,
}

/// Workspace kind as spelled in TOML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KindField {
    #[default]
    Package,
    Service,
}

/// `[workspace.<name>.target.<t>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetSection {
    /// The command to execute, run with `sh -c` in the workspace root.
    pub cmd: String,

    /// Glob patterns (relative to the workspace root) selecting the source
    /// files this target's output depends on.
    #[serde(default)]
    pub sources: Vec<String>,

    /// For long-running service targets: a regex matched against stdout lines
    /// to decide when the process is up.
    #[serde(default)]
    pub ready_pattern: Option<String>,
}
