//! Workflow Integration Tests
//!
//! Node registration, tokens and node states, aggregation of completed
//! workflow runs, statistics and scope deletes.

#[path = "../common/mod.rs"]
mod common;

mod aggregation;
mod deletes;
mod progress;
mod statistics;
