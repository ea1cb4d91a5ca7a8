use crate::nodes::registry::{VariantRegistry, Verdict};
use crate::nodes::Node;
use crate::tree::{IdIndex, IndexEntry, WorkflowTree};
use tracing::{debug, warn};

/// A pass rarely needs more than two rounds (drop a join, then settle).
const MAX_ROUNDS: usize = 16;

impl WorkflowTree {
    /// Runs every node's `check` hook over the whole tree, repeating until no
    /// hook changes anything. Returns whether the tree changed.
    pub fn consistency_pass(&mut self) -> bool {
        let registry = self.registry.clone();
        let mut changed_any = false;

        for round in 0..MAX_ROUNDS {
            self.reindex();
            let mut index = std::mem::take(&mut self.index);
            let changed = check_body(&mut self.root, &registry, &mut index);
            self.index = index;
            if !changed {
                self.reindex();
                return changed_any;
            }
            debug!(workflow = %self.name, round, "consistency pass changed the tree");
            changed_any = true;
        }

        warn!(workflow = %self.name, rounds = MAX_ROUNDS, "consistency pass did not settle");
        self.reindex();
        changed_any
    }
}

/// Children are checked before their owner so an owner always sees settled
/// bodies.
fn check_body(nodes: &mut Vec<Node>, registry: &VariantRegistry, index: &mut IdIndex) -> bool {
    let mut changed = false;
    let mut i = 0;
    while i < nodes.len() {
        for body in nodes[i].bodies_mut() {
            changed |= check_body(body, registry, index);
        }

        let verdict = registry.variant_for(&nodes[i]).check(&mut nodes[i], index);
        match verdict {
            Verdict::Keep => i += 1,
            Verdict::Remove => {
                nodes.remove(i);
                changed = true;
            }
            Verdict::FollowWith(node) => {
                // Reserve the new id so a later hook in this round cannot reuse it.
                index.reserve(
                    node.id().to_string(),
                    IndexEntry {
                        path: Vec::new(),
                        tag: node.tag(),
                        partner: node.partner().map(str::to_string),
                    },
                );
                nodes.insert(i + 1, node);
                changed = true;
                i += 2;
            }
        }
    }
    changed
}

impl IdIndex {
    pub(crate) fn reserve(&mut self, id: String, entry: IndexEntry) {
        self.entries.insert(id, entry);
    }
}
