//! runstore - transactional run-state tracking for program executions
//!
//! runstore records the lifecycle of program runs (start, suspend, resume,
//! stop), keeps a status index over them, tracks workflow progress and
//! aggregates completed workflow runs into duration statistics.
//!
//! # Quick Start
//!
//! ```text
//! use runstore::prelude::*;
//!
//! let store = RunStore::ephemeral();
//! let program = ProgramId::workflow("default", "purchases", "nightly");
//! let run_id = RunId::new();
//! let started = run_id.time_secs();
//!
//! store.set_start(&program, &run_id, started, None, BTreeMap::new(), BTreeMap::new())?;
//! let running = store.get_runs_by_status(StatusFilter::Is(RunStatus::Running), 10, None)?;
//! ```
//!
//! # Architecture
//!
//! - `runstore-core`: identities, run records, key layout, errors
//! - `runstore-storage`: MVCC ordered store and snapshots
//! - `runstore-concurrency`: OCC transactions and commit validation
//! - `runstore-engine`: `Database`, retries, `runstore.toml`
//! - `runstore-primitives`: `AppMetadataStore` and `WorkflowDataset`
//!
//! [`RunStore`] is the only entry point most callers need.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod store;

pub use store::RunStore;

pub use runstore_core::{
    Error, FailureCause, NodeStatistics, NodeStatus, PercentileInformation, ProgramId,
    ProgramRun, ProgramType, Result, RunId, RunRecord, RunStatus, Scope, StatusFilter,
    WorkflowNodeStateDetail, WorkflowRunRecord, WorkflowStatistics, WorkflowToken,
    WORKFLOW_NAME_ARG, WORKFLOW_NODE_ID_ARG, WORKFLOW_RUN_ID_ARG,
};
pub use runstore_engine::{Database, RetryConfig, StoreConfig, CONFIG_FILE_NAME};
pub use runstore_primitives::{RunFilter, CAS_FAILURE_MESSAGE};

/// Commonly used types in one import
pub mod prelude {
    pub use crate::{
        Error, FailureCause, NodeStatus, ProgramId, ProgramType, Result, RunId, RunRecord,
        RunStatus, RunStore, StatusFilter, StoreConfig, WorkflowNodeStateDetail, WorkflowToken,
    };
    pub use std::collections::BTreeMap;
}
