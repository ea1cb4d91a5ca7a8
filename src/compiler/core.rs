use crate::compiler::pairing;
use crate::dsl::{self, RawFields, TaskDef, WorkflowDef};
use crate::nodes::registry::VariantRegistry;
use crate::nodes::{END_ID, Node, START_ID, VariantTag, opaque_ids};
use crate::tree::WorkflowTree;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Turns persisted task lists into nodes.
///
/// One builder is used for a whole definition so that ids stay unique across
/// every nesting level, including inline sub-workflows.
pub struct TreeBuilder<'a> {
    registry: &'a VariantRegistry,
    seen: HashSet<String>,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(registry: &'a VariantRegistry) -> Self {
        let mut seen = HashSet::new();
        seen.insert(START_ID.to_string());
        seen.insert(END_ID.to_string());
        Self { registry, seen }
    }

    /// Builds the full tree: Start, the top-level tasks, End.
    pub fn build(definition: WorkflowDef, registry: Arc<VariantRegistry>) -> WorkflowTree {
        let WorkflowDef {
            name,
            version,
            tasks,
            extra,
        } = definition;

        let mut root = Vec::with_capacity(tasks.len() + 2);
        root.push(Node::marker(VariantTag::StartMarker));
        root.extend(TreeBuilder::new(&registry).build_sequence(tasks));
        root.push(Node::marker(VariantTag::EndMarker));

        let mut tree = WorkflowTree::from_parts(name, version, extra, root, registry);
        tree.consistency_pass();
        debug!(workflow = %tree.name(), nodes = tree.len(), "built workflow tree");
        tree
    }

    /// Builds one nesting level, pairing each Join with the fork before it.
    pub fn build_sequence(&mut self, tasks: Vec<TaskDef>) -> Vec<Node> {
        let mut nodes = Vec::with_capacity(tasks.len());
        let mut open_forks: Vec<usize> = Vec::new();

        for task in tasks {
            let mut node = self.create(task);
            match node.tag() {
                VariantTag::ForkJoin => {
                    open_forks.push(nodes.len());
                    nodes.push(node);
                }
                VariantTag::Join => match open_forks.pop() {
                    Some(fork_at) => {
                        pairing::pair(&mut nodes[fork_at], &mut node);
                        nodes.push(node);
                    }
                    None => {
                        warn!(node_id = %node.id(), "join has no open fork at its level; dropping it");
                    }
                },
                _ => nodes.push(node),
            }
        }

        pairing::close_open_forks(&mut nodes, open_forks, |base| {
            let id = self.unique_id(base);
            self.seen.insert(id.clone());
            id
        });
        nodes
    }

    /// Instantiates the registered variant for one task.
    pub fn create(&mut self, task: TaskDef) -> Node {
        let TaskDef {
            task_reference_name,
            task_type,
            mut fields,
        } = task;
        let id = self.claim(task_reference_name);

        let registry = self.registry;
        let kind_name = task_type.as_deref().unwrap_or(dsl::SIMPLE);
        let variant = match registry.resolve(kind_name) {
            Some(variant) => variant,
            None => {
                warn!(node_id = %id, task_type = %kind_name, "unknown task type; treating it as a simple step");
                registry.fallback()
            }
        };
        let absent: Vec<&'static str> = dsl::LIST_FIELDS
            .iter()
            .copied()
            .filter(|field| !fields.contains_key(*field))
            .collect();
        let kind = variant.build(&id, &mut fields, self);

        // Ids inside bodies that stayed opaque are still taken.
        let mut reserved = Vec::new();
        opaque_ids(&fields, &mut reserved);
        self.seen.extend(reserved);

        let mut node = Node::new(id, task_type, fields, kind);
        node.absent = absent;
        node
    }

    /// Removes `field` from `raw` and builds it as a nested task list. A value
    /// that is not a task list is put back untouched.
    pub fn take_body(&mut self, owner: &str, raw: &mut RawFields, field: &str) -> Vec<Node> {
        let Some(value) = raw.remove(field) else {
            return Vec::new();
        };
        match serde_json::from_value::<Vec<TaskDef>>(value.clone()) {
            Ok(tasks) => self.build_sequence(tasks),
            Err(e) => {
                warn!(node_id = %owner, field, error = %e, "nested body is not a task list; keeping it opaque");
                raw.insert(field.to_string(), value);
                Vec::new()
            }
        }
    }

    fn claim(&mut self, id: String) -> String {
        if self.seen.insert(id.clone()) {
            return id;
        }
        let renamed = self.unique_id(&id);
        warn!(node_id = %id, renamed = %renamed, "duplicate task reference name; renaming");
        self.seen.insert(renamed.clone());
        renamed
    }

    fn unique_id(&self, base: &str) -> String {
        if !self.seen.contains(base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{}_{}", base, n))
            .find(|candidate| !self.seen.contains(candidate))
            .unwrap_or_else(|| base.to_string())
    }
}
