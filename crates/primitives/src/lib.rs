//! Primitives layer for runstore
//!
//! Provides the run-metadata primitives as stateless handles that operate on
//! a caller-supplied `TransactionContext`:
//! - **AppMetadataStore**: run records, status index, workflow tokens and node states
//! - **WorkflowDataset**: per-run summaries of completed workflows and statistics over them
//!
//! ## Design Principle: Stateless Handles
//!
//! Neither primitive holds data. Every method reads and writes through the
//! transaction it is given, so several calls compose into one atomic unit:
//!
//! ```rust,ignore
//! db.transaction(|txn| {
//!     let record = meta.record_program_stop(txn, &program, &run_id, now, RunStatus::Completed, None)?;
//!     if let Some(summary) = dataset.summarize(txn, &meta, &record)? {
//!         dataset.write(txn, &record.program, &summary)?;
//!     }
//!     Ok(())
//! })?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod app_meta;
pub mod workflow_dataset;

pub use app_meta::{AppMetadataStore, RunFilter, CAS_FAILURE_MESSAGE};
pub use workflow_dataset::{nearest_rank_index, WorkflowDataset};
