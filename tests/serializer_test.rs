use flowtree::dsl::builder::WorkflowBuilder;
use flowtree::dsl::{TaskDef, WorkflowDef};
use flowtree::nodes::registry::VariantRegistry;
use flowtree::tree::WorkflowTree;
use serde_json::{Value, json};
use std::sync::Arc;

fn round_trip(def: &WorkflowDef) -> WorkflowDef {
    WorkflowTree::build(def.clone(), Arc::new(VariantRegistry::standard()))
        .serialize()
        .expect("Serialization failed")
}

fn kitchen_sink() -> WorkflowDef {
    let child = WorkflowBuilder::new("child_flow")
        .version(2)
        .field("ownerEmail", "child@example.com")
        .task("child_step", "child_step")
            .param("value", "${workflow.input.value}")
            .build()
        .build();

    WorkflowBuilder::new("kitchen_sink")
        .version(7)
        .field("description", "every construct at once")
        .field("schemaVersion", 2)
        .field("inputParameters", json!(["orderId"]))
        .field("outputParameters", json!({"result": "${finish.output.result}"}))
        .task("fetch", "fetch_order")
            .param("orderId", "${workflow.input.orderId}")
            .field("optional", true)
            .build()
        .fork(
            "split",
            vec![
                vec![TaskDef::simple("left_a", "left"), TaskDef::simple("left_b", "left")],
                vec![TaskDef::simple("right", "right")],
            ],
        )
        .join("merge", &["left_b", "right"])
        .do_while(
            "retry",
            "if ($.retry['iteration'] < 3) { true; } else { false; }",
            vec![
                TaskDef::simple("attempt", "attempt"),
                TaskDef::decision(
                    "check",
                    vec![
                        ("ok", vec![TaskDef::simple("celebrate", "celebrate")]),
                        ("retry", vec![]),
                    ],
                    Some(vec![TaskDef::simple("alert", "alert")]),
                )
                .with("caseValueParam", "status"),
            ],
        )
        .push(
            TaskDef::new("route", "SWITCH")
                .with("evaluatorType", "value-param")
                .with("expression", "region")
                .with(
                    "decisionCases",
                    json!({
                        "eu": [{"name": "eu_ship", "taskReferenceName": "eu_ship", "type": "SIMPLE"}],
                        "us": [{"name": "us_ship", "taskReferenceName": "us_ship"}]
                    }),
                ),
        )
        .inline_sub_workflow("embedded", child)
        .sub_workflow("billing", "billing_flow", 3)
        .human("approve")
        .push(TaskDef::new("notify", "KAFKA_PUBLISH").with("kafka_request", json!({"topic": "done"})))
        .task("finish", "finish").build()
        .build()
}

#[test]
fn test_round_trip_is_lossless() {
    let def = kitchen_sink();
    assert_eq!(round_trip(&def), def);
}

#[test]
fn test_round_trip_through_json_text() {
    let def = kitchen_sink();
    let text = serde_json::to_string_pretty(&def).expect("Failed to encode");
    let decoded: WorkflowDef = serde_json::from_str(&text).expect("Failed to decode");

    let out = round_trip(&decoded);

    assert_eq!(
        serde_json::to_value(&out).expect("Failed to encode"),
        serde_json::to_value(&def).expect("Failed to encode")
    );
}

#[test]
fn test_markers_and_back_references_are_never_written() {
    let def = kitchen_sink();
    let text = serde_json::to_string(&round_trip(&def)).expect("Failed to encode");

    assert!(!text.contains("__start__"));
    assert!(!text.contains("__end__"));
    assert!(!text.contains("forkId"));
    assert!(!text.contains("joinId"));
}

#[test]
fn test_order_is_preserved_at_every_level() {
    let def = kitchen_sink();
    let out = round_trip(&def);

    let top: Vec<&str> = out.tasks.iter().map(|t| t.task_reference_name.as_str()).collect();
    assert_eq!(
        top,
        ["fetch", "split", "merge", "retry", "route", "embedded", "billing", "approve", "notify", "finish"]
    );

    let branches = &out.tasks[1].fields["forkTasks"];
    let left: Vec<&str> = branches[0]
        .as_array()
        .expect("branch is a list")
        .iter()
        .filter_map(|t| t["taskReferenceName"].as_str())
        .collect();
    assert_eq!(left, ["left_a", "left_b"]);
}

#[test]
fn test_join_is_written_from_its_own_references() {
    let def = WorkflowBuilder::new("join_on")
        .fork("f", vec![vec![TaskDef::simple("a", "a")], vec![TaskDef::simple("b", "b")]])
        // Waits on one branch only; that choice must survive.
        .join("j", &["a"])
        .build();

    let out = round_trip(&def);

    assert_eq!(out.tasks[1].fields["joinOn"], json!(["a"]));
    assert_eq!(out, def);
}

#[test]
fn test_decision_default_case_layout() {
    let def = WorkflowBuilder::new("defaults")
        .decision("d", vec![("a", vec![TaskDef::simple("x", "x")])], Some(vec![TaskDef::simple("y", "y")]))
        .build();

    let out = round_trip(&def);
    let fields = &out.tasks[0].fields;

    assert!(fields["decisionCases"].get("default").is_none());
    assert_eq!(fields["defaultCase"][0]["taskReferenceName"], Value::from("y"));
    assert_eq!(out, def);
}

#[test]
fn test_decision_with_clashing_default_is_left_alone() {
    let def = WorkflowBuilder::new("clash")
        .push(
            TaskDef::new("d", "DECISION")
                .with("decisionCases", json!({"default": [{"name": "p", "taskReferenceName": "p"}]}))
                .with("defaultCase", json!([{"name": "q", "taskReferenceName": "q"}])),
        )
        .build();

    let tree = WorkflowTree::build(def.clone(), Arc::new(VariantRegistry::standard()));

    assert!(!tree.contains("p"));
    assert!(!tree.contains("q"));
    assert_eq!(tree.serialize().expect("Serialization failed"), def);
}

#[test]
fn test_entries_without_list_fields_round_trip() {
    let def = WorkflowBuilder::new("sparse")
        .push(TaskDef::new("f", "FORK_JOIN").with("forkTasks", json!([[{"name": "a", "taskReferenceName": "a"}]])))
        .push(TaskDef::new("j", "JOIN"))
        .push(TaskDef::new("g", "FORK_JOIN"))
        .push(TaskDef::new("k", "JOIN"))
        .push(TaskDef::new("l", "DO_WHILE").with("loopCondition", "false"))
        .push(TaskDef::new("d", "DECISION").with("caseValueParam", "x"))
        .push(TaskDef::new("s", "SWITCH").with("defaultCase", json!([{"name": "b", "taskReferenceName": "b"}])))
        .build();

    let out = round_trip(&def);

    assert!(!out.tasks[1].fields.contains_key("joinOn"));
    assert!(!out.tasks[4].fields.contains_key("loopOver"));
    assert!(!out.tasks[5].fields.contains_key("decisionCases"));
    assert!(!out.tasks[6].fields.contains_key("decisionCases"));
    assert_eq!(out, def);
}

#[test]
fn test_empty_lists_that_were_present_stay() {
    let def = WorkflowBuilder::new("explicit")
        .push(TaskDef::new("l", "DO_WHILE").with("loopCondition", "false").with("loopOver", json!([])))
        .push(TaskDef::new("d", "DECISION").with("decisionCases", json!({})))
        .build();

    let out = round_trip(&def);

    assert_eq!(out.tasks[0].fields["loopOver"], json!([]));
    assert_eq!(out.tasks[1].fields["decisionCases"], json!({}));
    assert_eq!(out, def);
}
