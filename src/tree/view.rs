use crate::nodes::{BodyKey, Node, NodeKind, SubWorkflowSource, VariantTag};
use crate::overlay::{ExecutionStatus, ExecutionSummary};
use crate::runtime::catalog::TaskCatalog;
use crate::tree::WorkflowTree;
use serde::Serialize;
use std::fmt::Write;

/// One visible node as handed to the canvas.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderNode {
    pub id: String,
    pub tag: VariantTag,
    pub task_type: Option<String>,
    pub label: String,
    pub description: Option<String>,
    pub parameters: Vec<String>,
    pub status: Option<ExecutionStatus>,
    pub iteration_count: usize,
    pub bodies: Vec<RenderBody>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderBody {
    pub key: BodyKey,
    pub nodes: Vec<RenderNode>,
}

impl WorkflowTree {
    /// The renderable nodes of the top level, in order. Joins and any other
    /// non-renderable variant are left out at every depth.
    pub fn render_view(&self, catalog: Option<&dyn TaskCatalog>) -> Vec<RenderNode> {
        self.render_body(&self.root, catalog)
    }

    fn render_body(&self, nodes: &[Node], catalog: Option<&dyn TaskCatalog>) -> Vec<RenderNode> {
        nodes
            .iter()
            .filter(|node| self.registry().is_renderable(node))
            .map(|node| self.render_node(node, catalog))
            .collect()
    }

    fn render_node(&self, node: &Node, catalog: Option<&dyn TaskCatalog>) -> RenderNode {
        let metadata = node
            .name()
            .and_then(|name| catalog.and_then(|c| c.lookup(name)));
        let label = metadata
            .and_then(|m| m.display_name.clone())
            .or_else(|| node.name().map(str::to_string))
            .unwrap_or_else(|| node.id().to_string());

        RenderNode {
            id: node.id().to_string(),
            tag: node.tag(),
            task_type: node.task_type().map(str::to_string),
            label,
            description: metadata.and_then(|m| m.description.clone()),
            parameters: metadata.map(|m| m.input_keys.clone()).unwrap_or_default(),
            status: node.execution().and_then(ExecutionSummary::status),
            iteration_count: node.execution().map_or(0, ExecutionSummary::iteration_count),
            bodies: node
                .bodies()
                .into_iter()
                .map(|(key, body)| RenderBody {
                    key,
                    nodes: self.render_body(body, catalog),
                })
                .collect(),
        }
    }

    /// An indented text rendering of the whole tree, joins included.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        outline_body(&self.root, 0, &mut out);
        out
    }
}

fn outline_body(nodes: &[Node], depth: usize, out: &mut String) {
    for node in nodes {
        let indent = "  ".repeat(depth);
        let _ = write!(out, "{}{} [{:?}]", indent, node.id(), node.tag());
        match node.kind() {
            NodeKind::Join { join_on, .. } if !join_on.is_empty() => {
                let _ = write!(out, " on {}", join_on.join(", "));
            }
            NodeKind::SubWorkflow {
                source: SubWorkflowSource::External(reference),
                ..
            } => {
                let _ = write!(out, " -> {}", reference.name);
                if let Some(version) = reference.version {
                    let _ = write!(out, " v{}", version);
                }
            }
            _ => {}
        }
        if let Some(status) = node.execution().and_then(ExecutionSummary::status) {
            let _ = write!(out, " ({}", status);
            let count = node.execution().map_or(0, ExecutionSummary::iteration_count);
            if count > 1 {
                let _ = write!(out, " x{}", count);
            }
            out.push(')');
        }
        out.push('\n');

        for (key, body) in node.bodies() {
            let _ = writeln!(out, "{}  {}", indent, body_label(&key));
            outline_body(body, depth + 2, out);
        }
    }
}

fn body_label(key: &BodyKey) -> String {
    match key {
        BodyKey::Root => "root:".to_string(),
        BodyKey::Branch(i) => format!("branch {}:", i + 1),
        BodyKey::Loop => "loop:".to_string(),
        BodyKey::Case(label) => format!("case {}:", label),
        BodyKey::Inline => "inline:".to_string(),
    }
}
