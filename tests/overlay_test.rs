use flowtree::dsl::builder::WorkflowBuilder;
use flowtree::dsl::TaskDef;
use flowtree::nodes::registry::VariantRegistry;
use flowtree::nodes::Node;
use flowtree::overlay::{ExecutionRecord, ExecutionStatus};
use flowtree::tree::WorkflowTree;
use serde_json::json;
use std::sync::Arc;

fn linear() -> WorkflowTree {
    WorkflowTree::build(
        WorkflowBuilder::new("linear")
            .task("A", "a").build()
            .task("B", "b").build()
            .build(),
        Arc::new(VariantRegistry::standard()),
    )
}

fn parallel() -> WorkflowTree {
    WorkflowTree::build(
        WorkflowBuilder::new("parallel")
            .fork(
                "Fork",
                vec![
                    vec![TaskDef::simple("B1", "b"), TaskDef::simple("B", "b")],
                    vec![TaskDef::simple("C", "c")],
                    vec![],
                ],
            )
            .join("Join", &["B", "C"])
            .build(),
        Arc::new(VariantRegistry::standard()),
    )
}

fn join_status(tree: &WorkflowTree) -> Option<ExecutionStatus> {
    tree.node("Join")
        .and_then(Node::execution)
        .and_then(|s| s.status())
}

#[test]
fn test_iterations_are_counted() {
    let mut tree = linear();

    tree.apply_execution(vec![ExecutionRecord::new("B", 1, ExecutionStatus::Completed)]);
    tree.apply_execution(vec![ExecutionRecord::new("B", 2, ExecutionStatus::Completed)]);

    let summary = tree.node("B").and_then(Node::execution).expect("B has no summary");
    assert_eq!(summary.status(), Some(ExecutionStatus::Completed));
    assert_eq!(summary.iteration_count(), 2);
}

#[test]
fn test_loop_body_keeps_every_iteration() {
    let mut tree = WorkflowTree::build(
        WorkflowBuilder::new("loop")
            .do_while("loop", "$.loop.iteration < 5", vec![TaskDef::simple("body", "body")])
            .build(),
        Arc::new(VariantRegistry::standard()),
    );

    for iteration in 1..=5 {
        let status = if iteration == 5 {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Completed
        };
        tree.apply_execution(vec![
            ExecutionRecord::new("body", iteration, status).timed(u64::from(iteration) * 10, Some(u64::from(iteration) * 10 + 5)),
        ]);
    }

    let summary = tree.node("body").and_then(Node::execution).expect("body has no summary");
    assert_eq!(summary.iteration_count(), 5);
    let latest = summary.latest().expect("no latest snapshot");
    assert_eq!(latest.status, ExecutionStatus::Failed);
    assert_eq!(latest.start_time, Some(50));
    assert_eq!(summary.iterations[&3].status, ExecutionStatus::Completed);
}

#[test]
fn test_repeated_report_replaces_the_same_iteration() {
    let mut tree = linear();

    tree.apply_execution(vec![
        ExecutionRecord::new("A", 0, ExecutionStatus::Scheduled),
        ExecutionRecord::new("A", 0, ExecutionStatus::Running),
    ]);

    let summary = tree.node("A").and_then(Node::execution).expect("A has no summary");
    assert_eq!(summary.iteration_count(), 1);
    assert_eq!(summary.status(), Some(ExecutionStatus::Running));
}

#[test]
fn test_unknown_ids_are_discarded() {
    let mut tree = linear();

    let report = tree.apply_execution(vec![
        ExecutionRecord::new("gone", 0, ExecutionStatus::Completed),
        ExecutionRecord::new("A", 0, ExecutionStatus::Completed),
        ExecutionRecord::new("__start__", 0, ExecutionStatus::Completed),
    ]);

    assert_eq!(report.applied, 1);
    assert_eq!(report.discarded, 2);
    assert_eq!(tree.execution_summaries().len(), 1);
    assert_eq!(tree.len(), 4);
}

#[test]
fn test_join_rolls_up_its_branches() {
    let mut tree = parallel();
    assert_eq!(join_status(&tree), None);

    // Only one branch terminal has reported.
    tree.apply_execution(vec![
        ExecutionRecord::new("B1", 0, ExecutionStatus::Completed).timed(1, Some(4)),
        ExecutionRecord::new("B", 0, ExecutionStatus::Completed).timed(5, Some(10)),
    ]);
    assert_eq!(join_status(&tree), Some(ExecutionStatus::Running));

    tree.apply_execution(vec![ExecutionRecord::new("C", 0, ExecutionStatus::Running).timed(2, None)]);
    assert_eq!(join_status(&tree), Some(ExecutionStatus::Running));

    tree.apply_execution(vec![ExecutionRecord::new("C", 0, ExecutionStatus::Completed).timed(2, Some(20))]);
    let join = tree.node("Join").and_then(Node::execution).expect("Join has no summary");
    let latest = join.latest().expect("no rollup");
    assert_eq!(latest.status, ExecutionStatus::Completed);
    assert_eq!(latest.start_time, Some(2));
    assert_eq!(latest.end_time, Some(20));
}

#[test]
fn test_join_takes_the_slowest_branch_outcome() {
    let mut tree = parallel();

    tree.apply_execution(vec![
        ExecutionRecord::new("B", 0, ExecutionStatus::Completed).timed(1, Some(10)),
        ExecutionRecord::new("C", 0, ExecutionStatus::Failed).timed(1, Some(30)),
    ]);

    assert_eq!(join_status(&tree), Some(ExecutionStatus::Failed));
}

#[test]
fn test_records_for_joins_are_derived() {
    let mut tree = parallel();

    let report = tree.apply_execution(vec![ExecutionRecord::new("Join", 0, ExecutionStatus::Completed)]);

    assert_eq!(report.derived, 1);
    assert_eq!(join_status(&tree), None);
}

#[test]
fn test_nested_join_feeds_the_outer_rollup() {
    let mut tree = WorkflowTree::build(
        WorkflowBuilder::new("nested")
            .fork(
                "outer",
                vec![
                    vec![
                        TaskDef::fork_join("inner", vec![vec![TaskDef::simple("x", "x")]]),
                        TaskDef::join("inner_join", &["x"]),
                    ],
                    vec![TaskDef::simple("y", "y")],
                ],
            )
            .join("outer_join", &["inner_join", "y"])
            .build(),
        Arc::new(VariantRegistry::standard()),
    );

    tree.apply_execution(vec![
        ExecutionRecord::new("x", 0, ExecutionStatus::TimedOut).timed(3, Some(40)),
        ExecutionRecord::new("y", 0, ExecutionStatus::Completed).timed(1, Some(9)),
    ]);

    let inner = tree.node("inner_join").and_then(Node::execution).and_then(|s| s.status());
    assert_eq!(inner, Some(ExecutionStatus::TimedOut));
    let outer = tree.node("outer_join").and_then(Node::execution).and_then(|s| s.status());
    assert_eq!(outer, Some(ExecutionStatus::TimedOut));
}

#[test]
fn test_overlay_leaves_structure_alone() {
    let mut tree = parallel();
    let before = tree.serialize().expect("Serialization failed");

    tree.apply_execution(vec![ExecutionRecord::new("C", 0, ExecutionStatus::Completed)]);

    assert_eq!(tree.serialize().expect("Serialization failed"), before);
}

#[test]
fn test_clear_execution() {
    let mut tree = parallel();
    tree.apply_execution(vec![
        ExecutionRecord::new("B", 0, ExecutionStatus::Completed),
        ExecutionRecord::new("C", 0, ExecutionStatus::Completed),
    ]);
    assert_eq!(tree.execution_summaries().len(), 3);

    tree.clear_execution();

    assert!(tree.execution_summaries().is_empty());
}

#[test]
fn test_view_carries_status_and_iterations() {
    let mut tree = linear();
    tree.apply_execution(vec![
        ExecutionRecord::new("A", 1, ExecutionStatus::Completed),
        ExecutionRecord::new("A", 2, ExecutionStatus::Running),
    ]);

    let view = tree.render_view(None);
    let a = view.iter().find(|n| n.id == "A").expect("A not rendered");

    assert_eq!(a.status, Some(ExecutionStatus::Running));
    assert_eq!(a.iteration_count, 2);
    assert!(tree.outline().contains("A [Simple] (running x2)"));
}

#[test]
fn test_engine_status_names() {
    let cases = [
        ("IN_PROGRESS", ExecutionStatus::Running),
        ("SCHEDULED", ExecutionStatus::Scheduled),
        ("COMPLETED_WITH_ERRORS", ExecutionStatus::Completed),
        ("FAILED_WITH_TERMINAL_ERROR", ExecutionStatus::Failed),
        ("CANCELED", ExecutionStatus::Terminated),
        ("timed-out", ExecutionStatus::TimedOut),
        ("skipped", ExecutionStatus::Skipped),
    ];
    for (text, expected) in cases {
        assert_eq!(text.parse::<ExecutionStatus>(), Ok(expected), "parsing {}", text);
    }
    assert!("EXPLODED".parse::<ExecutionStatus>().is_err());
    assert!(!ExecutionStatus::Running.is_terminal());
    assert!(ExecutionStatus::Skipped.is_terminal());
}

#[test]
fn test_record_json_shape() {
    let record: ExecutionRecord = serde_json::from_value(json!({
        "nodeId": "B",
        "iteration": 2,
        "status": "COMPLETED",
        "startTime": 100,
        "endTime": 250,
        "output": {"ok": true}
    }))
    .expect("Invalid record");

    assert_eq!(record.iteration, 2);
    assert_eq!(record.status, ExecutionStatus::Completed);
    assert_eq!(record.input, None);
    assert_eq!(record.output, Some(json!({"ok": true})));

    let encoded = serde_json::to_value(&record).expect("Failed to encode");
    assert_eq!(encoded["status"], json!("completed"));
}
