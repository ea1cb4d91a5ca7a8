use crate::dsl::{TaskDef, WorkflowDef};
use crate::error::SerializeError;
use crate::nodes::registry::VariantRegistry;
use crate::nodes::{Node, VariantTag};
use crate::tree::WorkflowTree;
use serde_json::Value;

/// Re-flattens a tree into the persisted definition.
pub struct Serializer<'a> {
    tree: &'a WorkflowTree,
    registry: &'a VariantRegistry,
}

impl<'a> Serializer<'a> {
    pub fn new(tree: &'a WorkflowTree) -> Self {
        Self {
            tree,
            registry: tree.registry(),
        }
    }

    pub fn serialize(&self) -> Result<WorkflowDef, SerializeError> {
        let mut tasks = Vec::with_capacity(self.tree.root().len());
        for node in self.tree.root() {
            // Start/End exist only at the top level and are never written.
            if node.tag().is_marker() {
                continue;
            }
            tasks.push(self.serialize_node(node)?);
        }
        Ok(WorkflowDef {
            name: self.tree.name().to_string(),
            version: self.tree.version(),
            tasks,
            extra: self.tree.meta().clone(),
        })
    }

    /// A nested body as the JSON list the engine expects inline.
    pub fn serialize_body(&self, nodes: &[Node]) -> Result<Value, SerializeError> {
        let mut tasks = Vec::with_capacity(nodes.len());
        for node in nodes {
            tasks.push(Value::from(self.serialize_node(node)?));
        }
        Ok(Value::Array(tasks))
    }

    fn serialize_node(&self, node: &Node) -> Result<TaskDef, SerializeError> {
        let tag = node.tag();
        if matches!(tag, VariantTag::ForkJoin | VariantTag::Join) && !self.is_paired(node) {
            return Err(SerializeError::Unpaired(node.id().to_string()));
        }
        let fields = self.registry.variant_for(node).to_raw(node, self)?;
        Ok(TaskDef {
            task_reference_name: node.id().to_string(),
            task_type: node.task_type().map(str::to_string),
            fields,
        })
    }

    fn is_paired(&self, node: &Node) -> bool {
        node.partner()
            .and_then(|partner| self.tree.node(partner))
            .is_some_and(|other| other.partner() == Some(node.id()))
    }
}
