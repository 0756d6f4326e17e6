// tests/config.rs

use std::path::Path;

use monodag::config::{
    self, load_and_validate, manifest_base_dir, validate_manifest, workspace_manifests,
};
use monodag::errors::MonodagError;
use monodag::graph::{WorkspaceGraph, WorkspaceKind};
use monodag_test_utils::init_tracing;
use tempfile::TempDir;

const FULL_MANIFEST: &str = r#"
[settings]
concurrency = 3
cache_dir = ".cache/monodag"

[remote]
region = "eu-west-1"
bucket = "artifacts"
table = "artifact-index"
env = "staging"
retry_attempts = 3
retry_backoff_ms = 100

[workspace.pkg-a]
root = "packages/a"

[workspace.pkg-a.target.build]
cmd = "npm run build"
sources = ["src/**/*.ts", "package.json"]

[workspace.svc-api]
root = "services/api"
kind = "service"
depends_on = ["pkg-a"]

[workspace.svc-api.target.build]
cmd = "npm run build"
sources = ["src/**"]

[workspace.svc-api.target.serve]
cmd = "npm start"
sources = ["src/**"]
ready_pattern = "listening on port \\d+"
"#;

fn write_manifest(tmp: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = tmp.path().join("Monodag.toml");
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn full_manifest_parses_and_maps_into_the_graph() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let path = write_manifest(&tmp, FULL_MANIFEST);

    let cfg = load_and_validate(&path).unwrap();
    assert_eq!(cfg.settings.concurrency, Some(3));
    assert_eq!(cfg.settings.cache_dir, ".cache/monodag");

    let remote = cfg.remote.as_ref().unwrap();
    assert_eq!(remote.env, "staging");
    assert_eq!(remote.retry_attempts, 3);

    let base = manifest_base_dir(&path);
    assert_eq!(base, tmp.path());
    let manifests = workspace_manifests(&cfg, &base);
    assert_eq!(manifests.len(), 2);

    let graph = WorkspaceGraph::build(manifests).unwrap();
    let api = graph.get("svc-api").unwrap();
    assert_eq!(api.kind, WorkspaceKind::Service);
    assert_eq!(api.root_path, tmp.path().join("services/api"));
    assert_eq!(api.declared_dependencies, vec!["pkg-a"]);
    let serve = api.target("serve").unwrap();
    assert_eq!(serve.ready_pattern.as_deref(), Some("listening on port \\d+"));

    let a = graph.get("pkg-a").unwrap();
    assert_eq!(a.kind, WorkspaceKind::Package);
    assert!(a.declares_target("build"));
    assert!(!a.declares_target("serve"));
}

#[test]
fn defaults_apply_when_sections_are_omitted() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let path = write_manifest(
        &tmp,
        r#"
[workspace.solo]
root = "."

[workspace.solo.target.build]
cmd = "make"
"#,
    );

    let cfg = load_and_validate(&path).unwrap();
    assert_eq!(cfg.settings.concurrency, None);
    assert_eq!(cfg.settings.cache_dir, ".monodag/cache");
    assert!(cfg.remote.is_none());
    assert_eq!(
        cfg.workspace["solo"].kind,
        config::model::KindField::Package
    );
}

#[test]
fn missing_file_is_an_io_error() {
    init_tracing();
    let err = load_and_validate(Path::new("/nonexistent/Monodag.toml")).unwrap_err();
    assert!(matches!(err, MonodagError::Io(_)));
}

fn expect_invalid(toml: &str, needle: &str) {
    let cfg: config::ManifestFile = ::toml::from_str(toml).unwrap();
    let err = validate_manifest(&cfg).unwrap_err();
    match err {
        MonodagError::InvalidManifest(msg) => {
            assert!(msg.contains(needle), "{msg:?} does not mention {needle:?}")
        }
        other => panic!("expected InvalidManifest, got {other}"),
    }
}

#[test]
fn validation_rejects_bad_manifests() {
    init_tracing();

    expect_invalid("", "at least one");

    expect_invalid(
        r#"
[workspace.a]
root = "a"
depends_on = ["missing"]
"#,
        "unknown dependency",
    );

    expect_invalid(
        r#"
[workspace.a]
root = "a"
depends_on = ["a"]
"#,
        "depend on itself",
    );

    expect_invalid(
        r#"
[workspace.a]
root = "a"

[workspace.a.target.build]
cmd = "   "
"#,
        "empty `cmd`",
    );

    expect_invalid(
        r#"
[workspace.a]
root = "a"

[workspace.a.target.build]
cmd = "make"
sources = ["src/[oops"]
"#,
        "invalid glob",
    );

    expect_invalid(
        r#"
[workspace.a]
root = "a"

[workspace.a.target.serve]
cmd = "run"
ready_pattern = "[unclosed"
"#,
        "invalid ready_pattern",
    );
}
