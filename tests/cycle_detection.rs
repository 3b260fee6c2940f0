use std::fs;

use filedag::config::{load_and_validate, Params};
use filedag::dag::DagGraph;
use filedag::errors::FiledagError;
use filedag::fs::RealFileSystem;
use filedag::pipeline::{load_pipeline, Pipeline};
use filedag::rules::{Registry, TaskDecl};
use tempfile::TempDir;

fn follows(pairs: &[(&str, &[&str])]) -> Vec<(String, Vec<String>)> {
    pairs
        .iter()
        .map(|(name, deps)| (name.to_string(), deps.iter().map(|d| d.to_string()).collect()))
        .collect()
}

#[test]
fn three_task_cycle_is_named_in_follows_order() {
    let err = DagGraph::from_follows(follows(&[("a", &["c"]), ("b", &["a"]), ("c", &["b"])]))
        .unwrap_err();
    assert!(matches!(&err, FiledagError::DagCycle(members) if members.len() == 3));
    assert!(err.to_string().ends_with("a -> b -> c -> a"), "{err}");
}

#[test]
fn self_follow_is_a_cycle() {
    let err = DagGraph::from_follows(follows(&[("a", &["a"])])).unwrap_err();
    assert!(err.to_string().ends_with("a -> a"), "{err}");
}

#[test]
fn tasks_hanging_off_a_cycle_are_not_reported_as_members() {
    let err = DagGraph::from_follows(follows(&[
        ("entry", &[]),
        ("x", &["entry", "y"]),
        ("y", &["x"]),
        ("tail", &["y"]),
    ]))
    .unwrap_err();
    match err {
        FiledagError::DagCycle(mut members) => {
            members.sort();
            assert_eq!(members, vec!["x", "y"]);
        }
        other => panic!("expected a cycle, got {other:?}"),
    }
}

#[test]
fn diamond_is_not_a_cycle() {
    let graph = DagGraph::from_follows(follows(&[
        ("top", &[]),
        ("left", &["top"]),
        ("right", &["top"]),
        ("bottom", &["left", "right"]),
    ]))
    .unwrap();
    assert_eq!(graph.rank("bottom"), Some(2));
}

#[test]
fn assembling_a_cyclic_registry_fails_before_anything_runs() {
    let mut registry = Registry::new();
    registry
        .declare(TaskDecl::new("sort").follows(["index"]).output("s.bam").command("sort"))
        .unwrap();
    registry
        .declare(TaskDecl::new("index").follows(["sort"]).output("s.bai").command("index"))
        .unwrap();
    assert!(matches!(
        Pipeline::assemble(registry, Params::new()),
        Err(FiledagError::DagCycle(_))
    ));
}

#[test]
fn cyclic_pipeline_file_is_rejected_at_load() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("Filedag.toml");
    fs::write(
        &path,
        r#"
[config]
sources = []

[import]
enabled = false

[task.one]
follows = ["two"]
cmd = "true"

[task.two]
follows = ["one"]
cmd = "true"
"#,
    )
    .unwrap();

    let file = load_and_validate(&path).unwrap();
    let err = load_pipeline(&RealFileSystem, &file, &path).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("one") && message.contains("two"), "{message}");
}
