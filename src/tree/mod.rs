pub mod check;
pub mod editor;
pub mod view;

use crate::compiler::core::TreeBuilder;
use crate::compiler::serializer::Serializer;
use crate::dsl::{RawFields, TaskDef, WorkflowDef};
use crate::error::SerializeError;
use crate::nodes::registry::VariantRegistry;
use crate::nodes::{BodyKey, Node, VariantTag, opaque_ids};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One step of a path from the root: which body, and where in it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Slot {
    pub body: BodyKey,
    pub index: usize,
}

#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub path: Vec<Slot>,
    pub tag: VariantTag,
    pub partner: Option<String>,
}

/// Id → position lookup over the whole tree, nested bodies included.
///
/// Fork/join pairs refer to each other by id and are resolved through here,
/// so a vanished partner shows up as a missing entry.
#[derive(Debug, Clone, Default)]
pub struct IdIndex {
    entries: HashMap<String, IndexEntry>,
    /// Ids found inside opaque nested fields. Not addressable, but taken.
    reserved: HashSet<String>,
}

impl IdIndex {
    fn build(root: &[Node]) -> Self {
        let mut index = Self::default();
        let mut path = Vec::new();
        index.index_body(root, BodyKey::Root, &mut path);
        index
    }

    fn index_body(&mut self, nodes: &[Node], key: BodyKey, path: &mut Vec<Slot>) {
        for (index, node) in nodes.iter().enumerate() {
            path.push(Slot {
                body: key.clone(),
                index,
            });
            self.entries.insert(
                node.id().to_string(),
                IndexEntry {
                    path: path.clone(),
                    tag: node.tag(),
                    partner: node.partner().map(str::to_string),
                },
            );
            let mut reserved = Vec::new();
            opaque_ids(node.raw(), &mut reserved);
            self.reserved.extend(reserved);
            for (child_key, body) in node.bodies() {
                self.index_body(body, child_key, path);
            }
            path.pop();
        }
    }

    pub fn get(&self, id: &str) -> Option<&IndexEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Whether `id` is used anywhere, opaque bodies included.
    pub fn is_taken(&self, id: &str) -> bool {
        self.entries.contains_key(id) || self.reserved.contains(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// `base` if it is free, otherwise `base_2`, `base_3`, ...
    pub fn unique_id(&self, base: &str) -> String {
        if !self.is_taken(base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{}_{}", base, n))
            .find(|candidate| !self.is_taken(candidate))
            .unwrap_or_else(|| base.to_string())
    }
}

/// The editable node tree of one workflow definition.
///
/// Every instance is self-contained: it carries its own registry handle and id
/// index, so any number of workflows can be open side by side.
pub struct WorkflowTree {
    name: String,
    version: Option<u32>,
    meta: RawFields,
    pub(crate) root: Vec<Node>,
    registry: Arc<VariantRegistry>,
    pub(crate) index: IdIndex,
}

impl WorkflowTree {
    pub fn build(definition: WorkflowDef, registry: Arc<VariantRegistry>) -> Self {
        TreeBuilder::build(definition, registry)
    }

    pub(crate) fn from_parts(
        name: String,
        version: Option<u32>,
        meta: RawFields,
        root: Vec<Node>,
        registry: Arc<VariantRegistry>,
    ) -> Self {
        let index = IdIndex::build(&root);
        Self {
            name,
            version,
            meta,
            root,
            registry,
            index,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<u32> {
        self.version
    }

    /// Top-level definition fields other than name, version and tasks.
    pub fn meta(&self) -> &RawFields {
        &self.meta
    }

    /// The top-level sequence, Start and End included.
    pub fn root(&self) -> &[Node] {
        &self.root
    }

    pub fn registry(&self) -> &VariantRegistry {
        &self.registry
    }

    pub fn index(&self) -> &IdIndex {
        &self.index
    }

    /// Number of nodes at every depth.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        let entry = self.index.get(id)?;
        self.node_at(&entry.path)
    }

    /// The node owning `id`'s body, `None` for top-level nodes.
    pub fn parent_of(&self, id: &str) -> Option<&Node> {
        let entry = self.index.get(id)?;
        let (_, owner) = entry.path.split_last()?;
        if owner.is_empty() {
            return None;
        }
        self.node_at(owner)
    }

    /// A body's node sequence; `parent: None` is the top level.
    pub fn sequence(&self, parent: Option<&str>, body: &BodyKey) -> Option<&[Node]> {
        match parent {
            None => (*body == BodyKey::Root).then_some(self.root.as_slice()),
            Some(id) => self.node(id)?.body(body).map(Vec::as_slice),
        }
    }

    pub fn serialize(&self) -> Result<WorkflowDef, SerializeError> {
        Serializer::new(self).serialize()
    }

    /// Builds detached nodes for later insertion, with the same variant
    /// lookup and fork/join pairing as a full load.
    pub fn create_nodes(&self, tasks: Vec<TaskDef>) -> Vec<Node> {
        TreeBuilder::new(&self.registry).build_sequence(tasks)
    }

    pub(crate) fn reindex(&mut self) {
        self.index = IdIndex::build(&self.root);
    }

    pub(crate) fn node_at(&self, path: &[Slot]) -> Option<&Node> {
        let (last, owner) = path.split_last()?;
        self.body_at(owner, &last.body)?.get(last.index)
    }

    pub(crate) fn node_at_mut(&mut self, path: &[Slot]) -> Option<&mut Node> {
        let (last, owner) = path.split_last()?;
        self.body_at_mut(owner, &last.body)?.get_mut(last.index)
    }

    pub(crate) fn body_at(&self, owner: &[Slot], key: &BodyKey) -> Option<&Vec<Node>> {
        if owner.is_empty() {
            return (*key == BodyKey::Root).then_some(&self.root);
        }
        self.node_at(owner)?.body(key)
    }

    pub(crate) fn body_at_mut(&mut self, owner: &[Slot], key: &BodyKey) -> Option<&mut Vec<Node>> {
        if owner.is_empty() {
            return if *key == BodyKey::Root {
                Some(&mut self.root)
            } else {
                None
            };
        }
        self.node_at_mut(owner)?.body_mut(key)
    }
}
