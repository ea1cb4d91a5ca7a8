use crate::error::EditError;
use crate::nodes::subworkflow::inline_node;
use crate::nodes::{
    BodyKey, Node, NodeKind, SubWorkflowSource, VariantTag, collect_ids, collect_opaque_ids,
};
use crate::tree::{Slot, WorkflowTree};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Before,
    After,
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placement::Before => write!(f, "before"),
            Placement::After => write!(f, "after"),
        }
    }
}

/// Where a moved node goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Next to an existing node, in that node's body.
    Beside { anchor: String, placement: Placement },
    /// At `index` of a body; `parent: None` is the top level.
    Into {
        parent: Option<String>,
        body: BodyKey,
        index: usize,
    },
}

/// A resolved insertion point.
struct Location {
    owner: Vec<Slot>,
    body: BodyKey,
    index: usize,
}

/// A node's position split into the body it lives in and its index there.
struct Position {
    owner: Vec<Slot>,
    body: BodyKey,
    index: usize,
}

impl WorkflowTree {
    /// Inserts `nodes` next to `target`. After a fork the nodes land after
    /// its join; before a join they land before its fork.
    pub fn insert_child(
        &mut self,
        target: &str,
        nodes: Vec<Node>,
        placement: Placement,
    ) -> Result<(), EditError> {
        self.validate_new(&nodes)?;
        let location = self.beside(target, placement)?;
        self.transact("insert", |tree| tree.place(location, nodes))
    }

    /// Inserts `nodes` at `index` of one of `parent`'s bodies, which may be
    /// empty. `parent: None` addresses the top level, where the index counts
    /// the Start marker.
    pub fn insert_into(
        &mut self,
        parent: Option<&str>,
        body: BodyKey,
        index: usize,
        nodes: Vec<Node>,
    ) -> Result<(), EditError> {
        self.validate_new(&nodes)?;
        let location = self.into_body(parent, body, index)?;
        self.transact("insert", |tree| tree.place(location, nodes))
    }

    /// Removes a node with everything it owns and returns it detached. A fork
    /// and its join always go together, whichever of the two is named.
    pub fn delete_node(&mut self, id: &str) -> Result<Vec<Node>, EditError> {
        self.editable(id)?;
        self.transact("delete", |tree| tree.detach_group(id))
    }

    pub fn move_node(&mut self, id: &str, destination: Destination) -> Result<(), EditError> {
        self.editable(id)?;

        let mut moved = Vec::new();
        for member in self.group(id)? {
            if let Some(node) = self.node(&member) {
                moved.extend(node.subtree_ids());
            }
        }
        let anchor = match &destination {
            Destination::Beside { anchor, .. } => Some(anchor.as_str()),
            Destination::Into { parent, .. } => parent.as_deref(),
        };
        if let Some(anchor) = anchor {
            if moved.iter().any(|m| m == anchor) {
                return Err(EditError::CyclicMove(id.to_string()));
            }
        }

        self.transact("move", |tree| {
            let nodes = tree.detach_group(id)?;
            tree.reindex();
            let location = match destination {
                Destination::Beside { anchor, placement } => tree.beside(&anchor, placement)?,
                Destination::Into {
                    parent,
                    body,
                    index,
                } => tree.into_body(parent.as_deref(), body, index)?,
            };
            tree.place(location, nodes)
        })
    }

    /// Replaces a contiguous run of siblings with a new inline sub-workflow
    /// owning them in their original order. Paired forks and joins are pulled
    /// in implicitly. Returns the new node's id.
    pub fn wrap_in_sub_workflow(&mut self, ids: &[&str]) -> Result<String, EditError> {
        let (first, rest) = ids.split_first().ok_or(EditError::EmptySelection)?;
        self.editable(first)?;
        let anchor = self.position(first)?;

        let mut indices = Vec::new();
        for id in ids {
            self.editable(id)?;
            let position = self.position(id)?;
            if position.owner != anchor.owner || position.body != anchor.body {
                return Err(EditError::NotSiblings(first.to_string(), id.to_string()));
            }
            for member in self.group(id)? {
                indices.push(self.position(&member)?.index);
            }
        }
        indices.sort_unstable();
        indices.dedup();
        let (start, end) = match (indices.first(), indices.last()) {
            (Some(start), Some(end)) => (*start, *end),
            _ => return Err(EditError::EmptySelection),
        };
        if end - start + 1 != indices.len() {
            return Err(EditError::NotContiguous);
        }
        debug!(first = %first, selected = rest.len() + 1, "wrapping nodes");

        let suffix = Uuid::new_v4().simple().to_string();
        let wrapper_id = self
            .index
            .unique_id(&format!("sub_workflow_{}", &suffix[..8]));

        let new_id = wrapper_id.clone();
        self.transact("wrap", move |tree| {
            let body = tree
                .body_at_mut(&anchor.owner, &anchor.body)
                .ok_or_else(|| EditError::TargetNotFound(first.to_string()))?;
            let run: Vec<Node> = body.drain(start..=end).collect();
            body.insert(start, inline_node(wrapper_id, run));
            Ok(())
        })?;
        Ok(new_id)
    }

    /// Replaces an inline sub-workflow with its body. Returns the ids of the
    /// nodes that took its place.
    pub fn unwrap_sub_workflow(&mut self, id: &str) -> Result<Vec<String>, EditError> {
        self.editable(id)?;
        let is_inline = self.node(id).is_some_and(|node| {
            matches!(
                node.kind(),
                NodeKind::SubWorkflow {
                    source: SubWorkflowSource::Inline { .. },
                    ..
                }
            )
        });
        if !is_inline {
            return Err(EditError::NotInlineSubWorkflow(id.to_string()));
        }
        let position = self.position(id)?;

        self.transact("unwrap", |tree| {
            let body = tree
                .body_at_mut(&position.owner, &position.body)
                .ok_or_else(|| EditError::TargetNotFound(id.to_string()))?;
            let wrapper = body.remove(position.index);
            let inner = match wrapper.kind {
                NodeKind::SubWorkflow {
                    source: SubWorkflowSource::Inline { body: inner, .. },
                    ..
                } => inner,
                _ => return Err(EditError::NotInlineSubWorkflow(id.to_string())),
            };
            let ids = inner.iter().map(|n| n.id().to_string()).collect();
            body.splice(position.index..position.index, inner);
            Ok(ids)
        })
    }

    /// Runs `edit` against the tree. On error the tree is restored to exactly
    /// what it was; on success the consistency pass runs.
    fn transact<T>(
        &mut self,
        operation: &str,
        edit: impl FnOnce(&mut Self) -> Result<T, EditError>,
    ) -> Result<T, EditError> {
        let snapshot = self.root.clone();
        match edit(self) {
            Ok(value) => {
                self.reindex();
                self.consistency_pass();
                info!(workflow = %self.name(), operation, nodes = self.len(), "edit applied");
                Ok(value)
            }
            Err(e) => {
                self.root = snapshot;
                self.reindex();
                debug!(workflow = %self.name(), operation, error = %e, "edit rejected");
                Err(e)
            }
        }
    }

    fn validate_new(&self, nodes: &[Node]) -> Result<(), EditError> {
        if nodes.is_empty() {
            return Err(EditError::EmptySelection);
        }
        let mut ids = Vec::new();
        collect_ids(nodes, &mut ids);
        collect_opaque_ids(nodes, &mut ids);
        let mut seen = HashSet::new();
        for node in nodes {
            if node.tag().is_marker() {
                return Err(EditError::MarkerNotEditable(node.id().to_string()));
            }
        }
        for id in ids {
            if self.index.is_taken(&id) || !seen.insert(id.clone()) {
                return Err(EditError::DuplicateId(id));
            }
        }
        Ok(())
    }

    fn editable(&self, id: &str) -> Result<(), EditError> {
        let entry = self
            .index
            .get(id)
            .ok_or_else(|| EditError::TargetNotFound(id.to_string()))?;
        if entry.tag.is_marker() {
            return Err(EditError::MarkerNotEditable(id.to_string()));
        }
        Ok(())
    }

    fn position(&self, id: &str) -> Result<Position, EditError> {
        let entry = self
            .index
            .get(id)
            .ok_or_else(|| EditError::TargetNotFound(id.to_string()))?;
        let (last, owner) = entry
            .path
            .split_last()
            .ok_or_else(|| EditError::TargetNotFound(id.to_string()))?;
        Ok(Position {
            owner: owner.to_vec(),
            body: last.body.clone(),
            index: last.index,
        })
    }

    /// `id` plus its fork/join partner, in body order.
    fn group(&self, id: &str) -> Result<Vec<String>, EditError> {
        let node = self
            .node(id)
            .ok_or_else(|| EditError::TargetNotFound(id.to_string()))?;
        let mut members = vec![(self.position(id)?.index, id.to_string())];
        if let Some(partner) = node.partner() {
            if let Ok(position) = self.position(partner) {
                members.push((position.index, partner.to_string()));
            }
        }
        members.sort();
        Ok(members.into_iter().map(|(_, id)| id).collect())
    }

    fn beside(&self, anchor: &str, placement: Placement) -> Result<Location, EditError> {
        let entry = self
            .index
            .get(anchor)
            .ok_or_else(|| EditError::TargetNotFound(anchor.to_string()))?;
        let invalid = || EditError::InvalidPlacement {
            anchor: anchor.to_string(),
            placement: placement.to_string(),
        };
        match (entry.tag, placement) {
            (VariantTag::StartMarker, Placement::Before)
            | (VariantTag::EndMarker, Placement::After) => return Err(invalid()),
            _ => {}
        }

        let group = self.group(anchor)?;
        let edge = match placement {
            Placement::Before => group.first(),
            Placement::After => group.last(),
        }
        .ok_or_else(invalid)?;
        let position = self.position(edge)?;
        let index = match placement {
            Placement::Before => position.index,
            Placement::After => position.index + 1,
        };
        Ok(Location {
            owner: position.owner,
            body: position.body,
            index,
        })
    }

    fn into_body(
        &self,
        parent: Option<&str>,
        body: BodyKey,
        index: usize,
    ) -> Result<Location, EditError> {
        let not_found = |parent: &str| EditError::BodyNotFound {
            parent: parent.to_string(),
            body: format!("{:?}", body),
        };
        let (owner, nodes) = match parent {
            None => {
                if body != BodyKey::Root {
                    return Err(not_found("root"));
                }
                (Vec::new(), self.root())
            }
            Some(id) => {
                let entry = self
                    .index
                    .get(id)
                    .ok_or_else(|| EditError::TargetNotFound(id.to_string()))?;
                let nodes = self.sequence(Some(id), &body).ok_or_else(|| not_found(id))?;
                (entry.path.clone(), nodes)
            }
        };

        let invalid = || EditError::InvalidPlacement {
            anchor: parent.unwrap_or("root").to_string(),
            placement: format!("at index {} of", index),
        };
        if index > nodes.len() {
            return Err(invalid());
        }
        // Start stays first and End stays last.
        if parent.is_none() && (index == 0 || index == nodes.len()) {
            return Err(invalid());
        }
        // Never between a fork and the join right after it.
        if index > 0 && index < nodes.len() && nodes[index - 1].partner() == Some(nodes[index].id())
        {
            return Err(invalid());
        }
        Ok(Location {
            owner,
            body,
            index,
        })
    }

    fn place(&mut self, location: Location, nodes: Vec<Node>) -> Result<(), EditError> {
        let body = self
            .body_at_mut(&location.owner, &location.body)
            .ok_or_else(|| EditError::BodyNotFound {
                parent: "root".to_string(),
                body: format!("{:?}", location.body),
            })?;
        let index = location.index.min(body.len());
        body.splice(index..index, nodes);
        Ok(())
    }

    /// Removes `id` and its partner from their body. Members are taken out
    /// back to front so the earlier index stays valid.
    fn detach_group(&mut self, id: &str) -> Result<Vec<Node>, EditError> {
        let mut positions = Vec::new();
        for member in self.group(id)? {
            positions.push(self.position(&member)?);
        }
        let mut detached = Vec::with_capacity(positions.len());
        for position in positions.into_iter().rev() {
            let body = self
                .body_at_mut(&position.owner, &position.body)
                .ok_or_else(|| EditError::TargetNotFound(id.to_string()))?;
            detached.push(body.remove(position.index));
        }
        detached.reverse();
        Ok(detached)
    }
}
