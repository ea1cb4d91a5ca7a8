use crate::dsl::{
    DECISION, DECISION_CASES, DEFAULT_CASE, DO_WHILE, FORK_JOIN, FORK_TASKS, HUMAN, JOIN, JOIN_ON,
    LOOP_CONDITION, LOOP_OVER, RawFields, SUB_WORKFLOW, SUB_WORKFLOW_PARAM, TaskDef,
    WORKFLOW_DEFINITION, WorkflowDef, tasks_to_value,
};
use serde_json::{Map, Value};

/// Fluent construction of a flat task list, in persisted order.
pub struct WorkflowBuilder {
    name: String,
    version: Option<u32>,
    extra: RawFields,
    pub tasks: Vec<TaskDef>,
}

impl WorkflowBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: None,
            extra: RawFields::new(),
            tasks: Vec::new(),
        }
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    pub fn task(self, reference: &str, name: &str) -> TaskBuilder {
        TaskBuilder {
            workflow_builder: self,
            task: TaskDef::simple(reference, name),
            params: Map::new(),
        }
    }

    pub fn push(mut self, task: TaskDef) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn human(self, reference: &str) -> Self {
        self.push(TaskDef::human(reference))
    }

    pub fn fork(self, reference: &str, branches: Vec<Vec<TaskDef>>) -> Self {
        self.push(TaskDef::fork_join(reference, branches))
    }

    pub fn join(self, reference: &str, join_on: &[&str]) -> Self {
        self.push(TaskDef::join(reference, join_on))
    }

    pub fn do_while(self, reference: &str, condition: &str, body: Vec<TaskDef>) -> Self {
        self.push(TaskDef::do_while(reference, condition, body))
    }

    pub fn decision(
        self,
        reference: &str,
        cases: Vec<(&str, Vec<TaskDef>)>,
        default: Option<Vec<TaskDef>>,
    ) -> Self {
        self.push(TaskDef::decision(reference, cases, default))
    }

    pub fn sub_workflow(self, reference: &str, name: &str, version: u32) -> Self {
        self.push(TaskDef::sub_workflow(reference, name, version))
    }

    pub fn inline_sub_workflow(self, reference: &str, definition: WorkflowDef) -> Self {
        self.push(TaskDef::inline_sub_workflow(reference, definition))
    }

    pub fn build(self) -> WorkflowDef {
        WorkflowDef {
            name: self.name,
            version: self.version,
            tasks: self.tasks,
            extra: self.extra,
        }
    }
}

pub struct TaskBuilder {
    workflow_builder: WorkflowBuilder,
    task: TaskDef,
    params: Map<String, Value>,
}

impl TaskBuilder {
    /// Adds an entry to `inputParameters`.
    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.task.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn build(mut self) -> WorkflowBuilder {
        if !self.params.is_empty() {
            self.task
                .fields
                .insert("inputParameters".to_string(), Value::Object(self.params));
        }
        self.workflow_builder.tasks.push(self.task);
        self.workflow_builder
    }
}

impl TaskDef {
    pub fn human(reference: &str) -> Self {
        Self::new(reference, HUMAN)
    }

    pub fn fork_join(reference: &str, branches: Vec<Vec<TaskDef>>) -> Self {
        let branches = branches.into_iter().map(tasks_to_value).collect();
        Self::new(reference, FORK_JOIN).with(FORK_TASKS, Value::Array(branches))
    }

    pub fn join(reference: &str, join_on: &[&str]) -> Self {
        let join_on: Vec<Value> = join_on.iter().map(|id| Value::from(*id)).collect();
        Self::new(reference, JOIN).with(JOIN_ON, join_on)
    }

    pub fn do_while(reference: &str, condition: &str, body: Vec<TaskDef>) -> Self {
        Self::new(reference, DO_WHILE)
            .with(LOOP_CONDITION, condition)
            .with(LOOP_OVER, tasks_to_value(body))
    }

    pub fn decision(
        reference: &str,
        cases: Vec<(&str, Vec<TaskDef>)>,
        default: Option<Vec<TaskDef>>,
    ) -> Self {
        let cases: Map<String, Value> = cases
            .into_iter()
            .map(|(label, body)| (label.to_string(), tasks_to_value(body)))
            .collect();
        let task = Self::new(reference, DECISION).with(DECISION_CASES, Value::Object(cases));
        match default {
            Some(body) => task.with(DEFAULT_CASE, tasks_to_value(body)),
            None => task,
        }
    }

    pub fn sub_workflow(reference: &str, name: &str, version: u32) -> Self {
        let mut param = Map::new();
        param.insert("name".to_string(), Value::from(name));
        param.insert("version".to_string(), Value::from(version));
        Self::new(reference, SUB_WORKFLOW).with(SUB_WORKFLOW_PARAM, Value::Object(param))
    }

    pub fn inline_sub_workflow(reference: &str, definition: WorkflowDef) -> Self {
        let mut param = Map::new();
        param.insert("name".to_string(), Value::from(definition.name.clone()));
        param.insert(WORKFLOW_DEFINITION.to_string(), Value::from(definition));
        Self::new(reference, SUB_WORKFLOW).with(SUB_WORKFLOW_PARAM, Value::Object(param))
    }
}
