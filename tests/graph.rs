// tests/graph.rs

use monodag::errors::MonodagError;
use monodag::graph::WorkspaceGraph;
use monodag_test_utils::builders::{ProjectBuilder, WorkspaceBuilder};
use monodag_test_utils::init_tracing;
use tempfile::TempDir;

fn diamond(tmp: &TempDir) -> WorkspaceGraph {
    // base <- left, base <- right, left+right <- top
    ProjectBuilder::new(tmp.path())
        .workspace(WorkspaceBuilder::package("base").target("build", "true"))
        .workspace(
            WorkspaceBuilder::package("left")
                .depends_on("base")
                .target("build", "true"),
        )
        .workspace(
            WorkspaceBuilder::package("right")
                .depends_on("base")
                .target("build", "true"),
        )
        .workspace(
            WorkspaceBuilder::package("top")
                .depends_on("left")
                .depends_on("right")
                .target("build", "true"),
        )
        .graph()
}

#[test]
fn topological_order_respects_edges_and_declaration_order() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let graph = diamond(&tmp);

    let order: Vec<&str> = graph
        .topological_order(None)
        .unwrap()
        .into_iter()
        .map(|w| w.name.as_str())
        .collect();

    // base first, top last, siblings in declaration order.
    assert_eq!(order, vec!["base", "left", "right", "top"]);
}

#[test]
fn scoped_order_includes_transitive_dependencies_only() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let graph = diamond(&tmp);

    let order: Vec<&str> = graph
        .topological_order(Some(&["left".to_string()]))
        .unwrap()
        .into_iter()
        .map(|w| w.name.as_str())
        .collect();

    assert_eq!(order, vec!["base", "left"]);
}

#[test]
fn cycle_is_rejected_with_full_path() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let err = ProjectBuilder::new(tmp.path())
        .workspace(
            WorkspaceBuilder::package("a")
                .depends_on("c")
                .target("build", "true"),
        )
        .workspace(
            WorkspaceBuilder::package("b")
                .depends_on("a")
                .target("build", "true"),
        )
        .workspace(
            WorkspaceBuilder::package("c")
                .depends_on("b")
                .target("build", "true"),
        )
        .manifests();
    let err = WorkspaceGraph::build(err).unwrap_err();

    match err {
        MonodagError::CyclicDependency(path) => {
            // The reported path names every participant of the cycle.
            for name in ["a", "b", "c"] {
                assert!(path.iter().any(|p| p == name), "{name} missing from {path:?}");
            }
        }
        other => panic!("expected CyclicDependency, got {other}"),
    }
}

#[test]
fn dependency_queries() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let graph = diamond(&tmp);

    let deps: Vec<&str> = graph
        .dependencies_of("top")
        .unwrap()
        .into_iter()
        .map(|w| w.name.as_str())
        .collect();
    assert_eq!(deps, vec!["left", "right"]);

    let dependents: Vec<&str> = graph
        .transitive_dependents_of("base")
        .unwrap()
        .into_iter()
        .map(|w| w.name.as_str())
        .collect();
    assert_eq!(dependents.len(), 3);
    for name in ["left", "right", "top"] {
        assert!(dependents.contains(&name));
    }

    // Roots: nothing depends on them. Leaves: depend on nothing.
    let roots: Vec<&str> = graph.roots().into_iter().map(|w| w.name.as_str()).collect();
    assert_eq!(roots, vec!["top"]);
    let leaves: Vec<&str> = graph.leaves().into_iter().map(|w| w.name.as_str()).collect();
    assert_eq!(leaves, vec!["base"]);
}

#[test]
fn unknown_workspace_is_an_error() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let graph = diamond(&tmp);

    assert!(matches!(
        graph.get("nope"),
        Err(MonodagError::WorkspaceNotFound(_))
    ));
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    // Random DAGs by construction: node i may only depend on nodes j < i.
    fn arb_dag() -> impl Strategy<Value = Vec<Vec<usize>>> {
        (2usize..10).prop_flat_map(|n| {
            let deps = (0..n)
                .map(|i| proptest::sample::subsequence((0..i).collect::<Vec<_>>(), 0..=i))
                .collect::<Vec<_>>();
            deps
        })
    }

    proptest! {
        // Each case materialises a real directory tree; keep the case count
        // modest so the suite stays fast.
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn topological_order_is_consistent(deps in arb_dag()) {
            let tmp = TempDir::new().unwrap();
            let mut builder = ProjectBuilder::new(tmp.path());
            for (i, ds) in deps.iter().enumerate() {
                let mut ws = WorkspaceBuilder::package(&format!("w{i}")).target("build", "true");
                for d in ds {
                    ws = ws.depends_on(&format!("w{d}"));
                }
                builder = builder.workspace(ws);
            }
            let graph = builder.graph();

            let order: Vec<String> = graph
                .topological_order(None)
                .unwrap()
                .into_iter()
                .map(|w| w.name.clone())
                .collect();

            prop_assert_eq!(order.len(), deps.len());
            let pos = |name: &str| order.iter().position(|n| n == name).unwrap();
            for (i, ds) in deps.iter().enumerate() {
                for d in ds {
                    let dep_pos = pos(&format!("w{d}"));
                    let ws_pos = pos(&format!("w{i}"));
                    prop_assert!(dep_pos < ws_pos);
                }
            }
        }
    }
}
