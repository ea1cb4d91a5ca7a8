pub mod common;
pub mod flow;
pub mod registry;
pub mod subworkflow;

use crate::dsl::{self, RawFields};
use crate::overlay::ExecutionSummary;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const START_ID: &str = "__start__";
pub const END_ID: &str = "__end__";
pub const DEFAULT_LABEL: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariantTag {
    Simple,
    ForkJoin,
    Join,
    DoWhile,
    Decision,
    SubWorkflow,
    Human,
    StartMarker,
    EndMarker,
}

impl VariantTag {
    pub fn is_marker(self) -> bool {
        matches!(self, VariantTag::StartMarker | VariantTag::EndMarker)
    }
}

/// Names one child body of a node (or the top-level sequence).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum BodyKey {
    Root,
    Branch(usize),
    Loop,
    Case(String),
    Inline,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecisionCase {
    pub label: String,
    pub body: Vec<Node>,
    /// Persisted as `defaultCase` rather than under `decisionCases`.
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubWorkflowRef {
    pub name: String,
    pub version: Option<u32>,
}

/// Where a sub-workflow's steps come from. One or the other, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum SubWorkflowSource {
    /// `definition` holds the nested definition's own fields minus its tasks.
    Inline { definition: RawFields, body: Vec<Node> },
    External(SubWorkflowRef),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Simple,
    Human,
    ForkJoin {
        branches: Vec<Vec<Node>>,
        join_id: Option<String>,
    },
    Join {
        fork_id: Option<String>,
        join_on: Vec<String>,
    },
    DoWhile {
        body: Vec<Node>,
        condition: Option<String>,
    },
    Decision {
        cases: Vec<DecisionCase>,
    },
    SubWorkflow {
        /// Remaining `subWorkflowParam` fields.
        params: RawFields,
        source: SubWorkflowSource,
    },
    StartMarker,
    EndMarker,
}

/// A step of the editable tree.
///
/// Nodes are only produced by the tree builder (`compiler::core`) so the
/// structural fields always agree with the registry that built them.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub(crate) id: String,
    pub(crate) task_type: Option<String>,
    pub(crate) raw: RawFields,
    pub(crate) kind: NodeKind,
    pub(crate) execution: Option<ExecutionSummary>,
    /// List fields the loaded entry did not have. They stay out of the
    /// output while their list is empty.
    pub(crate) absent: Vec<&'static str>,
}

impl Node {
    pub(crate) fn new(id: String, task_type: Option<String>, raw: RawFields, kind: NodeKind) -> Self {
        Self {
            id,
            task_type,
            raw,
            kind,
            execution: None,
            absent: Vec::new(),
        }
    }

    pub(crate) fn marker(tag: VariantTag) -> Self {
        let (id, kind) = match tag {
            VariantTag::EndMarker => (END_ID, NodeKind::EndMarker),
            _ => (START_ID, NodeKind::StartMarker),
        };
        Self::new(id.to_string(), None, RawFields::new(), kind)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn task_type(&self) -> Option<&str> {
        self.task_type.as_deref()
    }

    /// The opaque part of the persisted entry.
    pub fn raw(&self) -> &RawFields {
        &self.raw
    }

    pub fn name(&self) -> Option<&str> {
        self.raw.get("name").and_then(Value::as_str)
    }

    /// Whether `field` should be written for a list of `len` items.
    pub(crate) fn writes_list(&self, field: &str, len: usize) -> bool {
        len > 0 || !self.absent.iter().any(|absent| *absent == field)
    }

    pub fn execution(&self) -> Option<&ExecutionSummary> {
        self.execution.as_ref()
    }

    pub fn tag(&self) -> VariantTag {
        match &self.kind {
            NodeKind::Simple => VariantTag::Simple,
            NodeKind::Human => VariantTag::Human,
            NodeKind::ForkJoin { .. } => VariantTag::ForkJoin,
            NodeKind::Join { .. } => VariantTag::Join,
            NodeKind::DoWhile { .. } => VariantTag::DoWhile,
            NodeKind::Decision { .. } => VariantTag::Decision,
            NodeKind::SubWorkflow { .. } => VariantTag::SubWorkflow,
            NodeKind::StartMarker => VariantTag::StartMarker,
            NodeKind::EndMarker => VariantTag::EndMarker,
        }
    }

    /// The other half of a fork/join pair, if any.
    pub fn partner(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::ForkJoin { join_id, .. } => join_id.as_deref(),
            NodeKind::Join { fork_id, .. } => fork_id.as_deref(),
            _ => None,
        }
    }

    pub fn body(&self, key: &BodyKey) -> Option<&Vec<Node>> {
        match (&self.kind, key) {
            (NodeKind::ForkJoin { branches, .. }, BodyKey::Branch(i)) => branches.get(*i),
            (NodeKind::DoWhile { body, .. }, BodyKey::Loop) => Some(body),
            (NodeKind::Decision { cases }, BodyKey::Case(label)) => {
                cases.iter().find(|c| &c.label == label).map(|c| &c.body)
            }
            (
                NodeKind::SubWorkflow {
                    source: SubWorkflowSource::Inline { body, .. },
                    ..
                },
                BodyKey::Inline,
            ) => Some(body),
            _ => None,
        }
    }

    pub fn body_mut(&mut self, key: &BodyKey) -> Option<&mut Vec<Node>> {
        match (&mut self.kind, key) {
            (NodeKind::ForkJoin { branches, .. }, BodyKey::Branch(i)) => branches.get_mut(*i),
            (NodeKind::DoWhile { body, .. }, BodyKey::Loop) => Some(body),
            (NodeKind::Decision { cases }, BodyKey::Case(label)) => cases
                .iter_mut()
                .find(|c| &c.label == label)
                .map(|c| &mut c.body),
            (
                NodeKind::SubWorkflow {
                    source: SubWorkflowSource::Inline { body, .. },
                    ..
                },
                BodyKey::Inline,
            ) => Some(body),
            _ => None,
        }
    }

    /// All owned bodies, in serialization order.
    pub fn bodies(&self) -> Vec<(BodyKey, &Vec<Node>)> {
        match &self.kind {
            NodeKind::ForkJoin { branches, .. } => branches
                .iter()
                .enumerate()
                .map(|(i, b)| (BodyKey::Branch(i), b))
                .collect(),
            NodeKind::DoWhile { body, .. } => vec![(BodyKey::Loop, body)],
            NodeKind::Decision { cases } => cases
                .iter()
                .map(|c| (BodyKey::Case(c.label.clone()), &c.body))
                .collect(),
            NodeKind::SubWorkflow {
                source: SubWorkflowSource::Inline { body, .. },
                ..
            } => vec![(BodyKey::Inline, body)],
            _ => Vec::new(),
        }
    }

    pub fn bodies_mut(&mut self) -> Vec<&mut Vec<Node>> {
        match &mut self.kind {
            NodeKind::ForkJoin { branches, .. } => branches.iter_mut().collect(),
            NodeKind::DoWhile { body, .. } => vec![body],
            NodeKind::Decision { cases } => cases.iter_mut().map(|c| &mut c.body).collect(),
            NodeKind::SubWorkflow {
                source: SubWorkflowSource::Inline { body, .. },
                ..
            } => vec![body],
            _ => Vec::new(),
        }
    }

    /// Ids of this node and everything it owns, depth-first.
    pub fn subtree_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        collect_ids(std::slice::from_ref(self), &mut ids);
        ids
    }
}

/// Reference names held inside nested fields that were kept opaque, at
/// every depth of `nodes`. They are not nodes but their ids are taken.
pub(crate) fn collect_opaque_ids(nodes: &[Node], ids: &mut Vec<String>) {
    for node in nodes {
        opaque_ids(&node.raw, ids);
        for (_, body) in node.bodies() {
            collect_opaque_ids(body, ids);
        }
    }
}

pub(crate) fn opaque_ids(raw: &RawFields, ids: &mut Vec<String>) {
    for field in dsl::NESTED_FIELDS {
        if let Some(value) = raw.get(*field) {
            references(value, ids);
        }
    }
}

fn references(value: &Value, ids: &mut Vec<String>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| references(item, ids)),
        Value::Object(map) => {
            if let Some(Value::String(id)) = map.get("taskReferenceName") {
                ids.push(id.clone());
            }
            map.values().for_each(|item| references(item, ids));
        }
        _ => {}
    }
}

pub(crate) fn collect_ids(nodes: &[Node], ids: &mut Vec<String>) {
    for node in nodes {
        ids.push(node.id.clone());
        for (_, body) in node.bodies() {
            collect_ids(body, ids);
        }
    }
}
