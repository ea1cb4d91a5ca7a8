use crate::compiler::core::TreeBuilder;
use crate::compiler::serializer::Serializer;
use crate::dsl::{self, RawFields, TaskDef};
use crate::error::SerializeError;
use crate::nodes::registry::Variant;
use crate::nodes::{Node, NodeKind, SubWorkflowRef, SubWorkflowSource, VariantTag};
use serde_json::Value;
use tracing::warn;

pub struct SubWorkflowVariant;

impl Variant for SubWorkflowVariant {
    fn tag(&self) -> VariantTag {
        VariantTag::SubWorkflow
    }

    fn build(&self, id: &str, raw: &mut RawFields, builder: &mut TreeBuilder<'_>) -> NodeKind {
        let mut params = match raw.get(dsl::SUB_WORKFLOW_PARAM) {
            Some(Value::Object(param)) => param.clone(),
            _ => {
                warn!(node_id = %id, "sub-workflow has no subWorkflowParam object");
                return opaque();
            }
        };

        if let Some(definition) = params.remove(dsl::WORKFLOW_DEFINITION) {
            let Value::Object(mut definition) = definition else {
                warn!(node_id = %id, "workflowDefinition is not an object; keeping it opaque");
                return opaque();
            };
            let tasks = match definition.remove("tasks") {
                None => Vec::new(),
                Some(tasks) => match serde_json::from_value::<Vec<TaskDef>>(tasks) {
                    Ok(tasks) => tasks,
                    Err(e) => {
                        warn!(node_id = %id, error = %e, "inline workflow tasks are malformed; keeping them opaque");
                        return opaque();
                    }
                },
            };
            raw.remove(dsl::SUB_WORKFLOW_PARAM);
            let body = builder.build_sequence(tasks);
            return NodeKind::SubWorkflow {
                params,
                source: SubWorkflowSource::Inline { definition, body },
            };
        }

        let name = match params.remove("name") {
            Some(Value::String(name)) => name,
            Some(other) => {
                params.insert("name".to_string(), other);
                warn!(node_id = %id, "sub-workflow name is not a string; keeping it opaque");
                return opaque();
            }
            None => String::new(),
        };
        let version = match params.get("version").and_then(Value::as_u64) {
            Some(v) => match u32::try_from(v) {
                Ok(v) => {
                    params.remove("version");
                    Some(v)
                }
                Err(_) => None,
            },
            None => None,
        };
        raw.remove(dsl::SUB_WORKFLOW_PARAM);
        NodeKind::SubWorkflow {
            params,
            source: SubWorkflowSource::External(SubWorkflowRef { name, version }),
        }
    }

    fn to_raw(&self, node: &Node, serializer: &Serializer<'_>) -> Result<RawFields, SerializeError> {
        let mut raw = node.raw.clone();
        // Still present means it was never taken apart.
        if raw.contains_key(dsl::SUB_WORKFLOW_PARAM) {
            return Ok(raw);
        }
        let NodeKind::SubWorkflow { params, source } = &node.kind else {
            return Ok(raw);
        };

        let mut param = params.clone();
        match source {
            SubWorkflowSource::Inline { definition, body } => {
                let mut definition = definition.clone();
                definition.insert("tasks".to_string(), serializer.serialize_body(body)?);
                param.insert(dsl::WORKFLOW_DEFINITION.to_string(), Value::Object(definition));
            }
            SubWorkflowSource::External(reference) => {
                if reference.name.is_empty() && reference.version.is_none() && params.is_empty() {
                    return Ok(raw);
                }
                param.insert("name".to_string(), Value::from(reference.name.as_str()));
                if let Some(version) = reference.version {
                    param.insert("version".to_string(), Value::from(version));
                }
            }
        }
        raw.insert(dsl::SUB_WORKFLOW_PARAM.to_string(), Value::Object(param));
        Ok(raw)
    }
}

fn opaque() -> NodeKind {
    NodeKind::SubWorkflow {
        params: RawFields::new(),
        source: SubWorkflowSource::External(SubWorkflowRef {
            name: String::new(),
            version: None,
        }),
    }
}

/// A new inline sub-workflow named after its own id, owning `body`.
pub(crate) fn inline_node(id: String, body: Vec<Node>) -> Node {
    let mut raw = RawFields::new();
    raw.insert("name".to_string(), Value::String(id.clone()));

    // Name and version belong to the inline definition only.
    let mut definition = RawFields::new();
    definition.insert("name".to_string(), Value::String(id.clone()));
    definition.insert("version".to_string(), Value::from(1));

    Node::new(
        id,
        Some(dsl::SUB_WORKFLOW.to_string()),
        raw,
        NodeKind::SubWorkflow {
            params: RawFields::new(),
            source: SubWorkflowSource::Inline { definition, body },
        },
    )
}
