use crate::nodes::{Node, NodeKind};
use crate::overlay::{ExecutionSnapshot, ExecutionStatus, ExecutionSummary};
use std::collections::BTreeSet;

/// Recomputes every join's summary from its fork's branch terminals.
///
/// Bodies are handled before the level that owns them, so a join closing a
/// nested fork at the end of a branch is settled before the outer join reads
/// it.
pub(crate) fn roll_up_joins(nodes: &mut [Node]) {
    for node in nodes.iter_mut() {
        for body in node.bodies_mut() {
            roll_up_joins(body);
        }
    }

    for i in 0..nodes.len() {
        let fork_id = match &nodes[i].kind {
            NodeKind::Join {
                fork_id: Some(fork_id),
                ..
            } => fork_id.clone(),
            _ => continue,
        };
        let summary = nodes
            .iter()
            .find(|n| n.id == fork_id)
            .and_then(join_summary);
        nodes[i].execution = summary;
    }
}

fn join_summary(fork: &Node) -> Option<ExecutionSummary> {
    let NodeKind::ForkJoin { branches, .. } = &fork.kind else {
        return None;
    };
    let terminals: Vec<Option<&ExecutionSummary>> = branches
        .iter()
        .filter_map(|branch| branch.last())
        .map(|node| node.execution.as_ref())
        .collect();

    let iterations: BTreeSet<u32> = terminals
        .iter()
        .flatten()
        .flat_map(|summary| summary.iterations.keys().copied())
        .collect();

    let mut summary = ExecutionSummary::default();
    for iteration in iterations {
        let snapshots: Vec<Option<&ExecutionSnapshot>> = terminals
            .iter()
            .map(|t| t.and_then(|s| s.iterations.get(&iteration)))
            .collect();
        if let Some(snapshot) = roll_up(&snapshots) {
            summary.iterations.insert(iteration, snapshot);
        }
    }
    if summary.iterations.is_empty() {
        None
    } else {
        Some(summary)
    }
}

/// Running until every branch has finished; after that, whatever the branch
/// that finished last ended with.
fn roll_up(snapshots: &[Option<&ExecutionSnapshot>]) -> Option<ExecutionSnapshot> {
    let present: Vec<&ExecutionSnapshot> = snapshots.iter().flatten().copied().collect();
    if present.is_empty() {
        return None;
    }
    let start_time = present.iter().filter_map(|s| s.start_time).min();

    let finished = present.len() == snapshots.len() && present.iter().all(|s| s.status.is_terminal());
    if !finished {
        return Some(ExecutionSnapshot {
            status: ExecutionStatus::Running,
            start_time,
            end_time: None,
            input: None,
            output: None,
        });
    }

    let slowest = present.iter().max_by_key(|s| s.end_time)?;
    Some(ExecutionSnapshot {
        status: slowest.status,
        start_time,
        end_time: slowest.end_time,
        input: None,
        output: slowest.output.clone(),
    })
}
