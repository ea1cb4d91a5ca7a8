use crate::nodes::flow::synthesize_join;
use crate::nodes::{Node, NodeKind};
use tracing::warn;

/// Links a fork and its join through each other's ids.
///
/// The link is bookkeeping only: the persisted Join entry does not name its
/// fork, so it is rebuilt from list position every time a definition loads.
pub(crate) fn pair(fork: &mut Node, join: &mut Node) {
    if let NodeKind::ForkJoin { join_id, .. } = &mut fork.kind {
        *join_id = Some(join.id.clone());
    }
    if let NodeKind::Join { fork_id, .. } = &mut join.kind {
        *fork_id = Some(fork.id.clone());
    }
}

/// Gives every fork still waiting for its join a synthesized one, placed
/// directly after it.
pub(crate) fn close_open_forks(
    nodes: &mut Vec<Node>,
    open_forks: Vec<usize>,
    mut next_id: impl FnMut(&str) -> String,
) {
    // Back to front so earlier positions stay valid while inserting.
    for fork_at in open_forks.into_iter().rev() {
        let join_id = next_id(&format!("{}_join", nodes[fork_at].id));
        warn!(node_id = %nodes[fork_at].id, join_id = %join_id, "fork has no join at its level; synthesizing one");
        let mut join = synthesize_join(&nodes[fork_at], join_id);
        pair(&mut nodes[fork_at], &mut join);
        nodes.insert(fork_at + 1, join);
    }
}
