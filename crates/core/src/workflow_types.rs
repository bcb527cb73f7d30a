//! Workflow progress and statistics types

use crate::run_types::FailureCause;
use crate::types::{ProgramType, RunId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// State of one node inside a workflow run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeStatus {
    /// Node is being launched
    Starting,
    /// Node is executing
    Running,
    /// Node finished successfully
    Completed,
    /// Node failed
    Failed,
    /// Node was killed
    Killed,
}

/// Per-node progress record of a workflow run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowNodeStateDetail {
    /// Node id within the workflow
    pub node_id: String,
    /// Current node status
    pub node_status: NodeStatus,
    /// Run id of the program the node launched, if any
    #[serde(default)]
    pub run_id: Option<String>,
    /// Failure detail for failed nodes
    #[serde(default)]
    pub failure_cause: Option<FailureCause>,
}

impl WorkflowNodeStateDetail {
    /// Detail without a run or failure
    pub fn new(node_id: impl Into<String>, node_status: NodeStatus) -> Self {
        WorkflowNodeStateDetail {
            node_id: node_id.into(),
            node_status,
            run_id: None,
            failure_cause: None,
        }
    }

    /// Attach the launched run id
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }
}

/// One value written to a workflow token, tagged with its writer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeValue {
    /// Node that wrote the value
    pub node: String,
    /// Written value
    pub value: String,
}

/// Key/value token passed between the nodes of a workflow run
///
/// Each key keeps every write in order; reads default to the latest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowToken {
    entries: BTreeMap<String, Vec<NodeValue>>,
}

impl WorkflowToken {
    /// Empty token
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` for `key` as written by `node`
    ///
    /// A node writing the same key twice replaces its earlier value.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>, node: impl Into<String>) {
        let node = node.into();
        let values = self.entries.entry(key.into()).or_default();
        values.retain(|nv| nv.node != node);
        values.push(NodeValue {
            node,
            value: value.into(),
        });
    }

    /// Latest value for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .and_then(|values| values.last())
            .map(|nv| nv.value.as_str())
    }

    /// Value written for `key` by `node`
    pub fn get_from_node(&self, key: &str, node: &str) -> Option<&str> {
        self.entries
            .get(key)?
            .iter()
            .find(|nv| nv.node == node)
            .map(|nv| nv.value.as_str())
    }

    /// Every write for `key`, oldest first
    pub fn all(&self, key: &str) -> &[NodeValue] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Keys present in the token
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// True when nothing has been written
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Timing of one node program within a completed workflow run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramRun {
    /// Node id within the workflow
    pub node_id: String,
    /// Run id of the node program
    pub run_id: RunId,
    /// Program type of the node
    pub program_type: ProgramType,
    /// Node run duration in milliseconds
    pub duration_ms: u64,
}

/// Summary of one completed workflow run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRunRecord {
    /// Run id of the workflow
    pub workflow_run_id: RunId,
    /// Start time of the workflow run, seconds since epoch
    pub start_time: u64,
    /// Workflow run duration in seconds
    pub time_taken_secs: u64,
    /// Node runs, ordered by node id
    pub program_runs: Vec<ProgramRun>,
}

/// Value at one percentile of workflow run times
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentileInformation {
    /// Requested percentile, 0..=100
    pub percentile: f64,
    /// Run time at that percentile, seconds
    pub value: u64,
    /// Runs at or above the percentile rank
    pub run_ids_over_percentile: Vec<RunId>,
}

/// Duration distribution of one workflow node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStatistics {
    /// Program type of the node
    pub program_type: ProgramType,
    /// Number of runs containing the node
    pub runs: usize,
    /// Mean duration in milliseconds
    pub avg_duration_ms: f64,
    /// (percentile, duration ms) pairs, in request order
    pub percentiles: Vec<(f64, u64)>,
}

/// Aggregate statistics over completed runs of one workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStatistics {
    /// Window start, inclusive
    pub start_time: u64,
    /// Window end, exclusive
    pub end_time: u64,
    /// Completed runs in the window
    pub runs: usize,
    /// Mean run time in seconds
    pub avg_run_time_secs: f64,
    /// Workflow run time percentiles
    pub percentiles: Vec<PercentileInformation>,
    /// Node id → node statistics
    pub nodes: BTreeMap<String, NodeStatistics>,
}
