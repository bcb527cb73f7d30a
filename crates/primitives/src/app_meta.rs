//! AppMetadataStore: authoritative run records and their indexes
//!
//! ## Layout
//!
//! - Primary record: `AppMeta/Run` keyed by program then run time, so a
//!   program's history is one contiguous, time-ordered range.
//! - Status index: `AppMeta/RunByStatus` keyed by status then run time. Its
//!   value points back at the primary record.
//! - Workflow progress: `AppMeta/NodeState` and `AppMeta/WorkflowToken`.
//!
//! ## Status Transitions
//!
//! - Running → Suspended, Completed, Killed, Failed
//! - Suspended → Running (resume), Completed, Killed, Failed
//! - Completed, Killed, Failed → (terminal, no transitions)
//!
//! ## Index Discipline
//!
//! The primary record and its status-index entry are written in the same
//! transaction: the old entry is deleted and the new one inserted whenever
//! the status changes. Readers of the index still re-check the primary
//! record and skip entries that disagree with it.

use std::collections::{BTreeMap, BTreeSet};

use runstore_concurrency::TransactionContext;
use runstore_core::{
    Error, FailureCause, Key, NodeProgramRun, ProgramId, Result, RunId, RunRecord, RunStatus,
    Scope, StatusFilter, Value, WorkflowNodeStateDetail, WorkflowToken,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Failure cause recorded when a compare-and-set marks a run as failed
pub const CAS_FAILURE_MESSAGE: &str = "Marking run record as failed since no running program found.";

/// Caller predicate applied to decoded records before they count toward a limit
pub type RunFilter<'a> = &'a dyn Fn(&RunRecord) -> bool;

/// Value of a status-index entry
#[derive(Debug, Serialize, Deserialize)]
struct StatusIndexEntry {
    program: ProgramId,
    run_id: RunId,
}

/// Run metadata operations over a transaction
///
/// Holds no state; see the crate docs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppMetadataStore;

impl AppMetadataStore {
    /// Create a handle
    pub fn new() -> Self {
        AppMetadataStore
    }

    // ========== Point Reads ==========

    /// Get a run record
    ///
    /// ## Errors
    /// - `Corruption` if the stored record does not decode
    pub fn get_run(
        &self,
        txn: &mut TransactionContext,
        program: &ProgramId,
        run_id: &RunId,
    ) -> Result<Option<RunRecord>> {
        match txn.get(&Key::run(program, run_id))? {
            Some(value) => Ok(Some(value.decode()?)),
            None => Ok(None),
        }
    }

    fn require_run(
        &self,
        txn: &mut TransactionContext,
        program: &ProgramId,
        run_id: &RunId,
    ) -> Result<RunRecord> {
        self.get_run(txn, program, run_id)?
            .ok_or_else(|| Error::not_found(format!("run {} of {}", run_id, program)))
    }

    /// Upsert a run record, moving its status-index entry if the status changed
    ///
    /// `previous_status` is the status currently stored, or None for a new record.
    pub fn write_run(
        &self,
        txn: &mut TransactionContext,
        record: &RunRecord,
        previous_status: Option<RunStatus>,
    ) -> Result<()> {
        txn.put(
            Key::run(&record.program, &record.run_id),
            Value::json(record)?,
        )?;

        if previous_status != Some(record.status) {
            if let Some(old) = previous_status {
                txn.delete(Key::status_index(old, &record.program, &record.run_id))?;
            }
            let entry = StatusIndexEntry {
                program: record.program.clone(),
                run_id: record.run_id,
            };
            txn.put(
                Key::status_index(record.status, &record.program, &record.run_id),
                Value::json(&entry)?,
            )?;
        }
        Ok(())
    }

    // ========== Lifecycle ==========

    /// Record that a run started
    ///
    /// Creates the record, or rewrites a non-terminal one as Running with the
    /// new arguments. When the system arguments name a parent workflow run,
    /// the node is registered on that run in the same transaction.
    ///
    /// Run keys are ordered by the run id's creation second, so `start_time`
    /// must equal `run_id.time_secs()`.
    ///
    /// ## Errors
    /// - `InvalidInput` if `start_time` differs from the run id's time
    /// - `InvalidTransition` if the run already reached a terminal state
    #[allow(clippy::too_many_arguments)]
    pub fn record_program_start(
        &self,
        txn: &mut TransactionContext,
        program: &ProgramId,
        run_id: &RunId,
        start_time: u64,
        twill_run_id: Option<String>,
        runtime_args: BTreeMap<String, String>,
        system_args: BTreeMap<String, String>,
    ) -> Result<RunRecord> {
        if start_time != run_id.time_secs() {
            return Err(Error::InvalidInput(format!(
                "start time {} does not match run {} created at {}",
                start_time,
                run_id,
                run_id.time_secs()
            )));
        }

        let fresh = RunRecord::started(
            program.clone(),
            *run_id,
            start_time,
            twill_run_id,
            runtime_args,
            system_args,
        );

        let (record, previous) = match self.get_run(txn, program, run_id)? {
            None => (fresh, None),
            Some(current) => (current.restarted(fresh)?, Some(current.status)),
        };
        self.write_run(txn, &record, previous)?;

        if let Some((workflow, workflow_run, node_id)) = record.parent_workflow() {
            self.register_node(txn, &workflow, &workflow_run, &node_id, &record)?;
        }
        Ok(record)
    }

    fn register_node(
        &self,
        txn: &mut TransactionContext,
        workflow: &ProgramId,
        workflow_run: &str,
        node_id: &str,
        node: &RunRecord,
    ) -> Result<()> {
        let workflow_run_id = match RunId::parse(workflow_run) {
            Ok(id) => id,
            Err(e) => {
                warn!(program = %node.program, run_id = %node.run_id, error = %e,
                    "Ignoring malformed parent workflow run id");
                return Ok(());
            }
        };

        let mut parent = match self.get_run(txn, workflow, &workflow_run_id)? {
            Some(parent) if !parent.status.is_terminal() => parent,
            Some(parent) => {
                warn!(program = %workflow, run_id = %workflow_run_id, status = %parent.status,
                    node = node_id, "Parent workflow run already finished, node not registered");
                return Ok(());
            }
            None => {
                warn!(program = %workflow, run_id = %workflow_run_id, node = node_id,
                    "Parent workflow run not found, node not registered");
                return Ok(());
            }
        };

        let entry = NodeProgramRun {
            program_type: node.program.program_type,
            program: node.program.program.clone(),
            run_id: node.run_id,
        };
        if parent.workflow_nodes.get(node_id) == Some(&entry) {
            return Ok(());
        }
        parent.workflow_nodes.insert(node_id.to_string(), entry);
        let status = parent.status;
        self.write_run(txn, &parent, Some(status))
    }

    /// Record that a running program was suspended
    ///
    /// ## Errors
    /// - `RecordNotFound` if the run does not exist
    /// - `InvalidTransition` unless the run is Running
    pub fn record_program_suspend(
        &self,
        txn: &mut TransactionContext,
        program: &ProgramId,
        run_id: &RunId,
        suspend_time: u64,
    ) -> Result<RunRecord> {
        let current = self.require_run(txn, program, run_id)?;
        let updated = current.suspended(suspend_time)?;
        self.write_run(txn, &updated, Some(current.status))?;
        Ok(updated)
    }

    /// Record that a suspended program resumed
    ///
    /// ## Errors
    /// - `RecordNotFound` if the run does not exist
    /// - `InvalidTransition` unless the run is Suspended
    pub fn record_program_resume(
        &self,
        txn: &mut TransactionContext,
        program: &ProgramId,
        run_id: &RunId,
        resume_time: u64,
    ) -> Result<RunRecord> {
        let current = self.require_run(txn, program, run_id)?;
        let updated = current.resumed(resume_time)?;
        self.write_run(txn, &updated, Some(current.status))?;
        Ok(updated)
    }

    /// Record that a run reached a terminal state
    ///
    /// Stopping again with the recorded status returns the stored record
    /// unchanged.
    ///
    /// ## Errors
    /// - `InvalidInput` if `status` is not terminal
    /// - `RecordNotFound` if the run does not exist
    /// - `ConflictingTerminalStatus` if a different terminal status is recorded
    pub fn record_program_stop(
        &self,
        txn: &mut TransactionContext,
        program: &ProgramId,
        run_id: &RunId,
        stop_time: u64,
        status: RunStatus,
        failure_cause: Option<FailureCause>,
    ) -> Result<RunRecord> {
        if !status.is_terminal() {
            return Err(Error::InvalidInput(format!(
                "stop requires a terminal status, got {}",
                status
            )));
        }

        let current = self.require_run(txn, program, run_id)?;
        match current.stopped(stop_time, status, failure_cause) {
            Ok(Some(updated)) => {
                self.write_run(txn, &updated, Some(current.status))?;
                Ok(updated)
            }
            Ok(None) => {
                debug!(program = %program, run_id = %run_id, status = %status, "Run already stopped");
                Ok(current)
            }
            Err(e @ Error::ConflictingTerminalStatus { .. }) => {
                warn!(program = %program, run_id = %run_id, recorded = %current.status,
                    requested = %status, "Ignoring stop with a different terminal status");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Apply `target` only if the run is currently in `expected`
    ///
    /// Returns `Ok(None)` without writing when the run is missing or its
    /// status differs from `expected`. Timestamps come from the wall clock.
    ///
    /// ## Errors
    /// - `InvalidTransition` if `target` is not reachable from `expected`
    pub fn compare_and_set_status(
        &self,
        txn: &mut TransactionContext,
        program: &ProgramId,
        run_id: &RunId,
        expected: RunStatus,
        target: RunStatus,
    ) -> Result<Option<RunRecord>> {
        let current = match self.get_run(txn, program, run_id)? {
            Some(record) if record.status == expected => record,
            Some(record) => {
                debug!(program = %program, run_id = %run_id, expected = %expected,
                    actual = %record.status, "Status mismatch, compare-and-set skipped");
                return Ok(None);
            }
            None => {
                debug!(program = %program, run_id = %run_id, "Run not found, compare-and-set skipped");
                return Ok(None);
            }
        };

        if !current.status.can_transition_to(target) {
            return Err(Error::InvalidTransition {
                run_id: run_id.to_string(),
                from: current.status,
                to: target,
            });
        }

        let now = chrono::Utc::now().timestamp().max(0) as u64;
        let updated = match target {
            RunStatus::Running if current.status == RunStatus::Running => return Ok(Some(current)),
            RunStatus::Running => current.resumed(now)?,
            RunStatus::Suspended => current.suspended(now)?,
            RunStatus::Completed | RunStatus::Killed | RunStatus::Failed => {
                let cause = match target {
                    RunStatus::Failed => Some(FailureCause::message(CAS_FAILURE_MESSAGE)),
                    _ => None,
                };
                match current.stopped(now, target, cause)? {
                    Some(updated) => updated,
                    None => return Ok(Some(current)),
                }
            }
        };
        self.write_run(txn, &updated, Some(current.status))?;
        Ok(Some(updated))
    }

    // ========== Queries ==========

    /// Runs of `program` whose run time falls in `[start_secs, end_secs)`
    ///
    /// Ascending by run time then run id. `filter` is applied after decoding
    /// and before counting toward `limit`. Undecodable records are skipped.
    #[allow(clippy::too_many_arguments)]
    pub fn get_runs(
        &self,
        txn: &mut TransactionContext,
        program: &ProgramId,
        status: StatusFilter,
        start_secs: u64,
        end_secs: u64,
        limit: usize,
        filter: Option<RunFilter<'_>>,
    ) -> Result<Vec<RunRecord>> {
        let mut runs = Vec::new();
        if start_secs >= end_secs || limit == 0 {
            return Ok(runs);
        }

        let start = Key::run_time_bound(program, start_secs);
        let end = Key::run_time_bound(program, end_secs);
        for (key, value) in txn.scan_range(&start, &end)? {
            let record: RunRecord = match value.decode() {
                Ok(record) => record,
                Err(e) => {
                    warn!(key = ?key, error = %e, "Skipping undecodable run record");
                    continue;
                }
            };
            if !status.matches(record.status) {
                continue;
            }
            if let Some(f) = filter {
                if !f(&record) {
                    continue;
                }
            }
            runs.push(record);
            if runs.len() >= limit {
                break;
            }
        }
        Ok(runs)
    }

    /// Runs in the given status across every program, via the status index
    ///
    /// Results are grouped by status, each group ascending by run time.
    /// Index entries whose primary record is missing, undecodable or in a
    /// different status are skipped.
    pub fn get_runs_by_status(
        &self,
        txn: &mut TransactionContext,
        status: StatusFilter,
        limit: usize,
        filter: Option<RunFilter<'_>>,
    ) -> Result<Vec<RunRecord>> {
        let mut runs = Vec::new();
        if limit == 0 {
            return Ok(runs);
        }

        for wanted in status.statuses() {
            for (key, value) in txn.scan_prefix(&Key::status_prefix(wanted))? {
                let entry: StatusIndexEntry = match value.decode() {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!(key = ?key, error = %e, "Skipping undecodable status index entry");
                        continue;
                    }
                };
                let record = match self.get_run(txn, &entry.program, &entry.run_id) {
                    Ok(Some(record)) if record.status == wanted => record,
                    Ok(_) => {
                        debug!(program = %entry.program, run_id = %entry.run_id,
                            status = %wanted, "Skipping stale status index entry");
                        continue;
                    }
                    Err(e) => {
                        warn!(program = %entry.program, run_id = %entry.run_id, error = %e,
                            "Skipping undecodable run record");
                        continue;
                    }
                };
                if let Some(f) = filter {
                    if !f(&record) {
                        continue;
                    }
                }
                runs.push(record);
                if runs.len() >= limit {
                    return Ok(runs);
                }
            }
        }
        Ok(runs)
    }

    /// Ids of runs active at some point in `[start_secs, end_secs]`
    ///
    /// A run qualifies if it started no later than `end_secs` and either has
    /// not stopped or stopped no earlier than `start_secs`.
    pub fn get_running_in_range(
        &self,
        txn: &mut TransactionContext,
        start_secs: u64,
        end_secs: u64,
    ) -> Result<BTreeSet<RunId>> {
        let mut ids = BTreeSet::new();
        for (key, value) in txn.scan_prefix(&Key::run_table_prefix())? {
            let record: RunRecord = match value.decode() {
                Ok(record) => record,
                Err(e) => {
                    warn!(key = ?key, error = %e, "Skipping undecodable run record");
                    continue;
                }
            };
            let started_in_time = record.start_time <= end_secs;
            let still_alive = record.stop_time.map_or(true, |stop| stop >= start_secs);
            if started_in_time && still_alive {
                ids.insert(record.run_id);
            }
        }
        Ok(ids)
    }

    /// Runtime arguments of a run; empty if the run does not exist
    pub fn get_runtime_arguments(
        &self,
        txn: &mut TransactionContext,
        program: &ProgramId,
        run_id: &RunId,
    ) -> Result<BTreeMap<String, String>> {
        match self.get_run(txn, program, run_id)? {
            Some(record) => Ok(record.runtime_args),
            None => {
                debug!(program = %program, run_id = %run_id, "Runtime arguments requested for unknown run");
                Ok(BTreeMap::new())
            }
        }
    }

    // ========== Workflow Progress ==========

    /// Replace the token of a workflow run
    ///
    /// ## Errors
    /// - `RecordNotFound` if the workflow run does not exist
    pub fn update_workflow_token(
        &self,
        txn: &mut TransactionContext,
        workflow: &ProgramId,
        run_id: &RunId,
        token: &WorkflowToken,
    ) -> Result<()> {
        self.require_run(txn, workflow, run_id)?;
        txn.put(Key::workflow_token(workflow, run_id), Value::json(token)?)
    }

    /// Token of a workflow run; empty if none was written yet
    ///
    /// ## Errors
    /// - `RecordNotFound` if the workflow run does not exist
    pub fn get_workflow_token(
        &self,
        txn: &mut TransactionContext,
        workflow: &ProgramId,
        run_id: &RunId,
    ) -> Result<WorkflowToken> {
        self.require_run(txn, workflow, run_id)?;
        match txn.get(&Key::workflow_token(workflow, run_id))? {
            Some(value) => value.decode(),
            None => Ok(WorkflowToken::default()),
        }
    }

    /// Write the state of one node; replaces any earlier state of that node
    ///
    /// ## Errors
    /// - `RecordNotFound` if the workflow run does not exist
    pub fn add_workflow_node_state(
        &self,
        txn: &mut TransactionContext,
        workflow: &ProgramId,
        run_id: &RunId,
        state: &WorkflowNodeStateDetail,
    ) -> Result<()> {
        self.require_run(txn, workflow, run_id)?;
        txn.put(
            Key::node_state(workflow, run_id, &state.node_id),
            Value::json(state)?,
        )
    }

    /// Every node state of a workflow run, ordered by node id
    pub fn get_workflow_node_states(
        &self,
        txn: &mut TransactionContext,
        workflow: &ProgramId,
        run_id: &RunId,
    ) -> Result<Vec<WorkflowNodeStateDetail>> {
        let mut states = Vec::new();
        for (key, value) in txn.scan_prefix(&Key::node_state_prefix(workflow, run_id))? {
            match value.decode() {
                Ok(state) => states.push(state),
                Err(e) => warn!(key = ?key, error = %e, "Skipping undecodable node state"),
            }
        }
        Ok(states)
    }

    // ========== Deletion ==========

    /// Delete up to `batch_size` runs under `scope` with everything keyed by them
    ///
    /// Removes the primary record, every status-index variant, node states
    /// and the workflow token. Returns how many runs were removed; zero means
    /// the scope is empty.
    pub fn delete_program_history_batch(
        &self,
        txn: &mut TransactionContext,
        scope: &Scope,
        batch_size: usize,
    ) -> Result<usize> {
        let rows = txn.scan_prefix(&Key::run_scope_prefix(scope))?;
        let mut deleted = 0;
        for (key, _) in rows.into_iter().take(batch_size) {
            match key.decode_run() {
                Ok((program, run_id)) => {
                    for status in RunStatus::ALL {
                        txn.delete(Key::status_index(status, &program, &run_id))?;
                    }
                    let node_prefix = Key::node_state_prefix(&program, &run_id);
                    for (node_key, _) in txn.scan_prefix(&node_prefix)? {
                        txn.delete(node_key)?;
                    }
                    txn.delete(Key::workflow_token(&program, &run_id))?;
                }
                Err(e) => {
                    warn!(key = ?key, error = %e, "Deleting run key that does not decode");
                }
            }
            txn.delete(key)?;
            deleted += 1;
        }
        Ok(deleted)
    }
}
