//! Run lifecycle types
//!
//! ## Status Transitions
//!
//! Valid transitions:
//! - (absent) → Running
//! - Running → Running (idempotent re-start)
//! - Running → Suspended, Completed, Killed, Failed
//! - Suspended → Running (resume), Completed, Killed, Failed
//!
//! Invalid transitions (will error):
//! - Completed/Killed/Failed → * (terminal)
//! - Suspended → Suspended, Running → Running via resume
//!
//! A record carries `stop_time` exactly when its status is terminal. Every
//! transition below builds a new record from the old one, so that invariant
//! is checked in one place.

use crate::error::{Error, Result};
use crate::types::{ProgramId, ProgramType, RunId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// System argument naming the parent workflow of a node run
pub const WORKFLOW_NAME_ARG: &str = "workflowName";
/// System argument carrying the parent workflow's run id
pub const WORKFLOW_RUN_ID_ARG: &str = "workflowRunId";
/// System argument carrying the node id inside the parent workflow
pub const WORKFLOW_NODE_ID_ARG: &str = "workflowNodeId";

/// Run lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RunStatus {
    /// Run is executing
    Running,
    /// Run is paused and may resume
    Suspended,
    /// Run finished successfully
    Completed,
    /// Run was killed
    Killed,
    /// Run failed
    Failed,
}

impl RunStatus {
    /// Every status, in index byte order
    pub const ALL: [RunStatus; 5] = [
        RunStatus::Running,
        RunStatus::Suspended,
        RunStatus::Completed,
        RunStatus::Killed,
        RunStatus::Failed,
    ];

    /// Check if this is a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Killed | RunStatus::Failed
        )
    }

    /// Check if transition from current to target is valid
    pub fn can_transition_to(&self, target: RunStatus) -> bool {
        match (self, target) {
            (RunStatus::Running, _) => true,
            (RunStatus::Suspended, RunStatus::Suspended) => false,
            (RunStatus::Suspended, _) => true,
            (RunStatus::Completed, _) | (RunStatus::Killed, _) | (RunStatus::Failed, _) => false,
        }
    }

    /// Byte used in status-index keys
    pub fn as_byte(&self) -> u8 {
        match self {
            RunStatus::Running => 0x01,
            RunStatus::Suspended => 0x02,
            RunStatus::Completed => 0x03,
            RunStatus::Killed => 0x04,
            RunStatus::Failed => 0x05,
        }
    }

    /// Decode an index byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        RunStatus::ALL.iter().copied().find(|s| s.as_byte() == byte)
    }

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Suspended => "SUSPENDED",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Killed => "KILLED",
            RunStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status predicate for run queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    /// Any status
    #[default]
    Any,
    /// Exactly this status
    Is(RunStatus),
}

impl StatusFilter {
    /// Whether `status` passes the filter
    pub fn matches(&self, status: RunStatus) -> bool {
        match self {
            StatusFilter::Any => true,
            StatusFilter::Is(s) => *s == status,
        }
    }

    /// Statuses the filter admits
    pub fn statuses(&self) -> Vec<RunStatus> {
        match self {
            StatusFilter::Any => RunStatus::ALL.to_vec(),
            StatusFilter::Is(s) => vec![*s],
        }
    }
}

impl From<RunStatus> for StatusFilter {
    fn from(status: RunStatus) -> Self {
        StatusFilter::Is(status)
    }
}

/// Structured cause of a failed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCause {
    /// Error type name as reported by the runtime
    pub class_name: String,
    /// Error message
    pub message: String,
    /// Stack frames, outermost first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stack_trace: Vec<String>,
}

impl FailureCause {
    /// Cause with just a message
    pub fn message(message: impl Into<String>) -> Self {
        FailureCause {
            class_name: "Error".to_string(),
            message: message.into(),
            stack_trace: Vec::new(),
        }
    }
}

/// A node program launched by a workflow run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeProgramRun {
    /// Program type of the node
    pub program_type: ProgramType,
    /// Program name of the node
    pub program: String,
    /// Run id of the node's own run record
    pub run_id: RunId,
}

/// One execution attempt of one program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Program this run belongs to
    pub program: ProgramId,
    /// Time-ordered run id
    pub run_id: RunId,
    /// Current status
    pub status: RunStatus,
    /// Start time, seconds since epoch
    pub start_time: u64,
    /// Stop time, set iff status is terminal
    #[serde(default)]
    pub stop_time: Option<u64>,
    /// Last suspend time
    #[serde(default)]
    pub suspend_time: Option<u64>,
    /// Last resume time
    #[serde(default)]
    pub resume_time: Option<u64>,
    /// User arguments
    #[serde(default)]
    pub runtime_args: BTreeMap<String, String>,
    /// Platform arguments
    #[serde(default)]
    pub system_args: BTreeMap<String, String>,
    /// External execution handle
    #[serde(default)]
    pub twill_run_id: Option<String>,
    /// Failure detail for failed runs
    #[serde(default)]
    pub failure_cause: Option<FailureCause>,
    /// Node id → node run, only populated on workflow runs
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub workflow_nodes: BTreeMap<String, NodeProgramRun>,
}

impl RunRecord {
    /// New record in the Running state
    pub fn started(
        program: ProgramId,
        run_id: RunId,
        start_time: u64,
        twill_run_id: Option<String>,
        runtime_args: BTreeMap<String, String>,
        system_args: BTreeMap<String, String>,
    ) -> Self {
        RunRecord {
            program,
            run_id,
            status: RunStatus::Running,
            start_time,
            stop_time: None,
            suspend_time: None,
            resume_time: None,
            runtime_args,
            system_args,
            twill_run_id,
            failure_cause: None,
            workflow_nodes: BTreeMap::new(),
        }
    }

    /// Re-apply a start to an existing record
    ///
    /// Allowed from any non-terminal state; node registrations survive.
    pub fn restarted(&self, fresh: RunRecord) -> Result<RunRecord> {
        self.check(RunStatus::Running)?;
        Ok(RunRecord {
            workflow_nodes: self.workflow_nodes.clone(),
            ..fresh
        })
    }

    /// Suspend a running record
    pub fn suspended(&self, at: u64) -> Result<RunRecord> {
        if self.status != RunStatus::Running {
            return Err(self.invalid(RunStatus::Suspended));
        }
        Ok(RunRecord {
            status: RunStatus::Suspended,
            suspend_time: Some(at),
            ..self.clone()
        })
    }

    /// Resume a suspended record
    pub fn resumed(&self, at: u64) -> Result<RunRecord> {
        if self.status != RunStatus::Suspended {
            return Err(self.invalid(RunStatus::Running));
        }
        Ok(RunRecord {
            status: RunStatus::Running,
            resume_time: Some(at),
            ..self.clone()
        })
    }

    /// Move into a terminal state
    ///
    /// Returns `Ok(None)` when the record already holds the same terminal
    /// status, which makes repeated stops no-ops.
    pub fn stopped(
        &self,
        at: u64,
        status: RunStatus,
        failure_cause: Option<FailureCause>,
    ) -> Result<Option<RunRecord>> {
        if !status.is_terminal() {
            return Err(Error::InvalidInput(format!(
                "stop requires a terminal status, got {}",
                status
            )));
        }
        if self.status.is_terminal() {
            if self.status == status {
                return Ok(None);
            }
            return Err(Error::ConflictingTerminalStatus {
                run_id: self.run_id.to_string(),
                recorded: self.status,
                requested: status,
            });
        }
        Ok(Some(RunRecord {
            status,
            stop_time: Some(at),
            failure_cause,
            ..self.clone()
        }))
    }

    /// Parent workflow named by the system arguments, if any
    pub fn parent_workflow(&self) -> Option<(ProgramId, String, String)> {
        let name = self.system_args.get(WORKFLOW_NAME_ARG)?;
        let run = self.system_args.get(WORKFLOW_RUN_ID_ARG)?;
        let node = self.system_args.get(WORKFLOW_NODE_ID_ARG)?;
        Some((
            self.program.sibling(ProgramType::Workflow, name.clone()),
            run.clone(),
            node.clone(),
        ))
    }

    /// Check the terminal/stop-time invariant
    pub fn is_consistent(&self) -> bool {
        self.status.is_terminal() == self.stop_time.is_some()
    }

    fn check(&self, target: RunStatus) -> Result<()> {
        if self.status.can_transition_to(target) {
            Ok(())
        } else {
            Err(self.invalid(target))
        }
    }

    fn invalid(&self, to: RunStatus) -> Error {
        Error::InvalidTransition {
            run_id: self.run_id.to_string(),
            from: self.status,
            to,
        }
    }
}
