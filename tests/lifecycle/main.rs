//! Run Lifecycle Integration Tests
//!
//! Start/suspend/resume/stop through `RunStore`, the status index, range
//! queries and behavior under storage faults and corrupt records.

#[path = "../common/mod.rs"]
mod common;

mod config;
mod failures;
mod queries;
