pub mod builder;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fields of a persisted entry that the tree model does not interpret.
pub type RawFields = Map<String, Value>;

pub const SIMPLE: &str = "SIMPLE";
pub const HUMAN: &str = "HUMAN";
pub const FORK_JOIN: &str = "FORK_JOIN";
pub const JOIN: &str = "JOIN";
pub const DO_WHILE: &str = "DO_WHILE";
pub const DECISION: &str = "DECISION";
pub const SWITCH: &str = "SWITCH";
pub const SUB_WORKFLOW: &str = "SUB_WORKFLOW";

pub const FORK_TASKS: &str = "forkTasks";
pub const JOIN_ON: &str = "joinOn";
pub const LOOP_OVER: &str = "loopOver";
pub const LOOP_CONDITION: &str = "loopCondition";
pub const DECISION_CASES: &str = "decisionCases";
pub const DEFAULT_CASE: &str = "defaultCase";
pub const SUB_WORKFLOW_PARAM: &str = "subWorkflowParam";
pub const WORKFLOW_DEFINITION: &str = "workflowDefinition";

/// Fields that hold nested task lists.
pub const NESTED_FIELDS: &[&str] = &[FORK_TASKS, LOOP_OVER, DECISION_CASES, DEFAULT_CASE, SUB_WORKFLOW_PARAM];

/// Fields that are written back even when their list is empty, as long as
/// the entry had them when it was loaded.
pub const LIST_FIELDS: &[&str] = &[FORK_TASKS, JOIN_ON, LOOP_OVER, DECISION_CASES];

/// A workflow definition as the engine stores it.
///
/// Each level is a flat list of tasks; control-flow tasks carry their bodies
/// inline (`forkTasks`, `loopOver`, `decisionCases`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(default)]
    pub tasks: Vec<TaskDef>,
    #[serde(flatten)]
    pub extra: RawFields,
}

/// One entry of a task list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskDef {
    pub task_reference_name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    #[serde(flatten)]
    pub fields: RawFields,
}

impl WorkflowDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: None,
            tasks: Vec::new(),
            extra: RawFields::new(),
        }
    }
}

impl TaskDef {
    pub fn new(reference: &str, task_type: &str) -> Self {
        let mut fields = RawFields::new();
        fields.insert("name".to_string(), Value::String(reference.to_string()));
        Self {
            task_reference_name: reference.to_string(),
            task_type: Some(task_type.to_string()),
            fields,
        }
    }

    /// A plain worker task named `name`.
    pub fn simple(reference: &str, name: &str) -> Self {
        Self::new(reference, SIMPLE).with("name", name)
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// The engine task type, `SIMPLE` when the entry omits it.
    pub fn kind(&self) -> &str {
        self.task_type.as_deref().unwrap_or(SIMPLE)
    }

    pub fn name(&self) -> Option<&str> {
        self.fields.get("name").and_then(Value::as_str)
    }
}

impl From<TaskDef> for Value {
    fn from(task: TaskDef) -> Self {
        let mut map = task.fields;
        map.insert(
            "taskReferenceName".to_string(),
            Value::String(task.task_reference_name),
        );
        if let Some(task_type) = task.task_type {
            map.insert("type".to_string(), Value::String(task_type));
        }
        Value::Object(map)
    }
}

impl From<WorkflowDef> for Value {
    fn from(def: WorkflowDef) -> Self {
        let mut map = def.extra;
        map.insert("name".to_string(), Value::String(def.name));
        if let Some(version) = def.version {
            map.insert("version".to_string(), Value::from(version));
        }
        map.insert("tasks".to_string(), tasks_to_value(def.tasks));
        Value::Object(map)
    }
}

pub fn tasks_to_value(tasks: Vec<TaskDef>) -> Value {
    Value::Array(tasks.into_iter().map(Value::from).collect())
}
