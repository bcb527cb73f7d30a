//! Core types and traits for runstore
//!
//! This crate defines the foundational types used throughout the system:
//! - ProgramId / ProgramType / RunId: identity of programs and runs
//! - RunStatus / RunRecord: the per-run state machine
//! - Workflow types: node states, tokens, completed-run summaries, statistics
//! - Key: order-preserving composite keys and their layouts
//! - Value: stored payloads
//! - Error: Error type hierarchy
//! - Traits: Core trait definitions (Storage, SnapshotView)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod key;
pub mod run_types;
pub mod traits;
pub mod types;
pub mod value;
pub mod workflow_types;

pub use error::{Error, Result};
pub use key::{Key, KeyBuilder, KeyReader, Table, TypeTag};
pub use run_types::{
    FailureCause, NodeProgramRun, RunRecord, RunStatus, StatusFilter, WORKFLOW_NAME_ARG,
    WORKFLOW_NODE_ID_ARG, WORKFLOW_RUN_ID_ARG,
};
pub use traits::{SnapshotView, Storage};
pub use types::{ProgramId, ProgramType, RunId, Scope};
pub use value::{Value, VersionedValue};
pub use workflow_types::{
    NodeStatistics, NodeStatus, NodeValue, PercentileInformation, ProgramRun,
    WorkflowNodeStateDetail, WorkflowRunRecord, WorkflowStatistics, WorkflowToken,
};
