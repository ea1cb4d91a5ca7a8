use flowtree::compiler::loader;
use flowtree::config::{Backend, load_config};
use flowtree::dsl::builder::WorkflowBuilder;
use flowtree::dsl::TaskDef;
use flowtree::nodes::registry::VariantRegistry;
use flowtree::runtime::catalog::{StaticCatalog, TaskCatalog};
use flowtree::tree::WorkflowTree;
use serde_json::{Value, json};
use std::fs;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_load_yaml_workflow() {
    let yaml_content = r#"
name: order_flow
version: 3
description: "Ship an order"
tasks:
  - name: validate
    taskReferenceName: validate
    type: SIMPLE
    inputParameters:
      orderId: "${workflow.input.orderId}"
  - name: split
    taskReferenceName: split
    type: FORK_JOIN
    forkTasks:
      - - name: pack
          taskReferenceName: pack
      - - name: invoice
          taskReferenceName: invoice
  - name: merge
    taskReferenceName: merge
    type: JOIN
    joinOn: [pack, invoice]
"#;

    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let file_path = temp_dir.path().join("order_flow.yaml");
    fs::write(&file_path, yaml_content).expect("Failed to write temp file");

    let loaded = loader::load_workflow(&file_path).expect("Failed to load workflow from YAML");

    let expected = WorkflowBuilder::new("order_flow")
        .version(3)
        .field("description", "Ship an order")
        .task("validate", "validate")
            .param("orderId", "${workflow.input.orderId}")
            .build()
        .push(TaskDef::fork_join(
            "split",
            vec![
                vec![TaskDef { task_type: None, ..TaskDef::new("pack", "SIMPLE") }],
                vec![TaskDef { task_type: None, ..TaskDef::new("invoice", "SIMPLE") }],
            ],
        ))
        .join("merge", &["pack", "invoice"])
        .build();

    assert_eq!(loaded, expected);
}

#[test]
fn test_save_and_reload_json() {
    let def = WorkflowBuilder::new("saved")
        .do_while("loop", "true", vec![TaskDef::simple("step", "step")])
        .build();
    let tree = WorkflowTree::build(def.clone(), Arc::new(VariantRegistry::standard()));

    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let file_path = temp_dir.path().join("saved.json");
    loader::save_workflow(&file_path, &tree.serialize().expect("Serialization failed"))
        .expect("Failed to save workflow");

    let content = fs::read_to_string(&file_path).expect("Failed to read back");
    let raw: Value = serde_json::from_str(&content).expect("Saved file is not JSON");
    assert_eq!(raw["tasks"][0]["loopOver"][0]["taskReferenceName"], json!("step"));

    let reloaded = loader::load_workflow(&file_path).expect("Failed to reload");
    assert_eq!(reloaded, def);
}

#[test]
fn test_load_reports_the_file() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let file_path = temp_dir.path().join("broken.json");
    fs::write(&file_path, "{ not json").expect("Failed to write temp file");

    let err = loader::load_workflow(&file_path).expect_err("Broken file loaded");
    assert!(format!("{}", err).contains("broken.json"));

    let missing = temp_dir.path().join("missing.yaml");
    assert!(loader::load_workflow(&missing).is_err());
}

#[test]
fn test_load_config() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let file_path = temp_dir.path().join("flowtree.yaml");
    fs::write(
        &file_path,
        r#"
store:
  backend: http
  url: http://localhost:8080/api
feed:
  poll_interval_ms: 250
"#,
    )
    .expect("Failed to write temp file");

    let config = load_config(&file_path).expect("Failed to load config");

    assert_eq!(config.store.backend, Backend::Http);
    assert_eq!(config.store.url.as_deref(), Some("http://localhost:8080/api"));
    assert_eq!(config.store.prefix, "flowtree");
    assert_eq!(config.feed.poll_interval(), Duration::from_millis(250));
    assert!(config.catalog.is_none());
    assert!(config.open_store().is_ok());
}

#[test]
fn test_config_defaults_and_missing_url() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let file_path = temp_dir.path().join("redis.yaml");
    fs::write(&file_path, "store:\n  backend: redis\n").expect("Failed to write temp file");

    let config = load_config(&file_path).expect("Failed to load config");

    assert_eq!(config.store.backend, Backend::Redis);
    assert_eq!(config.feed.poll_interval(), Duration::from_millis(1000));
    assert!(config.open_store().is_err());
}

#[test]
fn test_task_catalog() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let file_path = temp_dir.path().join("tasks.yaml");
    fs::write(
        &file_path,
        r#"
tasks:
  - name: send_email
    displayName: Send email
    description: Sends one email
    inputKeys: [to, subject]
  - name: wait_for_payment
"#,
    )
    .expect("Failed to write temp file");

    let catalog = StaticCatalog::load(&file_path).expect("Failed to load catalog");
    assert_eq!(catalog.len(), 2);

    let metadata = catalog.lookup("send_email").expect("send_email missing");
    assert_eq!(metadata.display_name.as_deref(), Some("Send email"));

    let task = catalog.template("mail", "send_email");
    assert_eq!(task.fields["inputParameters"], json!({"to": null, "subject": null}));
    let bare = catalog.template("pay", "wait_for_payment");
    assert!(!bare.fields.contains_key("inputParameters"));

    // The render view picks up labels from the catalog.
    let tree = WorkflowTree::build(
        WorkflowBuilder::new("mailer").push(task).build(),
        Arc::new(VariantRegistry::standard()),
    );
    let view = tree.render_view(Some(&catalog));
    let mail = view.iter().find(|n| n.id == "mail").expect("mail not rendered");
    assert_eq!(mail.label, "Send email");
    assert_eq!(mail.description.as_deref(), Some("Sends one email"));
    assert_eq!(mail.parameters, ["to", "subject"]);
}
