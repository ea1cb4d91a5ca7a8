mod rollup;

use crate::error::UnknownStatus;
use crate::nodes::VariantTag;
use crate::tree::WorkflowTree;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ExecutionStatus {
    Scheduled,
    Running,
    Completed,
    Failed,
    Skipped,
    Terminated,
    TimedOut,
}

impl ExecutionStatus {
    /// The step will not change status again.
    pub fn is_terminal(self) -> bool {
        !matches!(self, ExecutionStatus::Scheduled | ExecutionStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Scheduled => "scheduled",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Skipped => "skipped",
            ExecutionStatus::Terminated => "terminated",
            ExecutionStatus::TimedOut => "timed_out",
        }
    }
}

impl FromStr for ExecutionStatus {
    type Err = UnknownStatus;

    /// Accepts both the lower-case names and the engine's upper-case task
    /// states.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        let status = match normalized.as_str() {
            "SCHEDULED" | "PENDING" => ExecutionStatus::Scheduled,
            "RUNNING" | "IN_PROGRESS" | "PAUSED" => ExecutionStatus::Running,
            "COMPLETED" | "COMPLETED_WITH_ERRORS" => ExecutionStatus::Completed,
            "FAILED" | "FAILED_WITH_TERMINAL_ERROR" => ExecutionStatus::Failed,
            "SKIPPED" => ExecutionStatus::Skipped,
            "TERMINATED" | "CANCELED" | "CANCELLED" => ExecutionStatus::Terminated,
            "TIMED_OUT" => ExecutionStatus::TimedOut,
            _ => return Err(UnknownStatus(s.to_string())),
        };
        Ok(status)
    }
}

impl TryFrom<String> for ExecutionStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ExecutionStatus> for String {
    fn from(status: ExecutionStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One executed occurrence of a node, as the feed reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub node_id: String,
    #[serde(default)]
    pub iteration: u32,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub start_time: Option<u64>,
    #[serde(default)]
    pub end_time: Option<u64>,
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default)]
    pub output: Option<Value>,
}

impl ExecutionRecord {
    pub fn new(node_id: &str, iteration: u32, status: ExecutionStatus) -> Self {
        Self {
            node_id: node_id.to_string(),
            iteration,
            status,
            start_time: None,
            end_time: None,
            input: None,
            output: None,
        }
    }

    pub fn timed(mut self, start_time: u64, end_time: Option<u64>) -> Self {
        self.start_time = Some(start_time);
        self.end_time = end_time;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSnapshot {
    pub status: ExecutionStatus,
    pub start_time: Option<u64>,
    pub end_time: Option<u64>,
    pub input: Option<Value>,
    pub output: Option<Value>,
}

impl From<ExecutionRecord> for ExecutionSnapshot {
    fn from(record: ExecutionRecord) -> Self {
        Self {
            status: record.status,
            start_time: record.start_time,
            end_time: record.end_time,
            input: record.input,
            output: record.output,
        }
    }
}

/// Everything observed for one node: a snapshot per iteration.
///
/// Loop bodies run many times against a single node, so nothing is
/// overwritten except a later report for the same iteration.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub iterations: BTreeMap<u32, ExecutionSnapshot>,
}

impl ExecutionSummary {
    pub fn record(&mut self, record: ExecutionRecord) {
        self.iterations.insert(record.iteration, record.into());
    }

    /// The snapshot of the highest iteration seen.
    pub fn latest(&self) -> Option<&ExecutionSnapshot> {
        self.iterations.values().next_back()
    }

    pub fn status(&self) -> Option<ExecutionStatus> {
        self.latest().map(|s| s.status)
    }

    pub fn iteration_count(&self) -> usize {
        self.iterations.len()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverlayReport {
    pub applied: usize,
    /// Records for ids the tree does not contain.
    pub discarded: usize,
    /// Records for joins, whose status is always derived.
    pub derived: usize,
}

impl WorkflowTree {
    /// Merges a batch of records onto the tree. Structure is never touched;
    /// unknown ids are logged and skipped.
    pub fn apply_execution(&mut self, records: Vec<ExecutionRecord>) -> OverlayReport {
        let mut report = OverlayReport::default();
        for record in records {
            let Some(entry) = self.index.get(&record.node_id) else {
                warn!(workflow = %self.name(), node_id = %record.node_id, "execution record for unknown node; discarding");
                report.discarded += 1;
                continue;
            };
            match entry.tag {
                VariantTag::Join => {
                    debug!(node_id = %record.node_id, "join status is rolled up from its branches");
                    report.derived += 1;
                    continue;
                }
                tag if tag.is_marker() => {
                    warn!(node_id = %record.node_id, "execution record for a marker; discarding");
                    report.discarded += 1;
                    continue;
                }
                _ => {}
            }
            let path = entry.path.clone();
            if let Some(node) = self.node_at_mut(&path) {
                node.execution.get_or_insert_with(Default::default).record(record);
                report.applied += 1;
            }
        }
        rollup::roll_up_joins(&mut self.root);
        debug!(
            workflow = %self.name(),
            applied = report.applied,
            discarded = report.discarded,
            "applied execution records"
        );
        report
    }

    pub fn clear_execution(&mut self) {
        clear(&mut self.root);
    }

    /// Summaries of every node that has one, by id.
    pub fn execution_summaries(&self) -> BTreeMap<String, ExecutionSummary> {
        let mut summaries = BTreeMap::new();
        for id in self.index.ids() {
            if let Some(summary) = self.node(id).and_then(|n| n.execution()) {
                summaries.insert(id.to_string(), summary.clone());
            }
        }
        summaries
    }
}

fn clear(nodes: &mut [crate::nodes::Node]) {
    for node in nodes {
        node.execution = None;
        for body in node.bodies_mut() {
            clear(body);
        }
    }
}
