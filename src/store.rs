//! RunStore: the run lifecycle facade
//!
//! `RunStore` owns a shared [`Database`] and runs every operation as one
//! retried OCC transaction against it. The primitives underneath are
//! stateless, so the facade is cheap to clone and safe to share across
//! threads.
//!
//! ## Workflow aggregation
//!
//! A `set_stop(.., Completed)` on a workflow program is followed by a second
//! transaction that summarizes the run into the `WorkflowStats` table. The
//! summary is abandoned (and logged) when any node did not complete. A
//! failed summary never undoes or hides the committed stop.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use runstore_core::{
    FailureCause, ProgramId, ProgramType, Result, RunId, RunRecord, RunStatus, Scope,
    StatusFilter, WorkflowNodeStateDetail, WorkflowRunRecord, WorkflowStatistics, WorkflowToken,
};
use runstore_concurrency::TransactionContext;
use runstore_engine::{Database, StoreConfig};
use runstore_primitives::{AppMetadataStore, RunFilter, WorkflowDataset};
use tracing::{debug, info, warn};

/// Transactional store of program run state
///
/// # Example
///
/// ```text
/// use runstore::prelude::*;
///
/// let store = RunStore::ephemeral();
/// let program = ProgramId::new("default", "purchases", ProgramType::Mapreduce, "aggregate");
/// let run_id = RunId::new();
/// let started = run_id.time_secs();
///
/// store.set_start(&program, &run_id, started, None, BTreeMap::new(), BTreeMap::new())?;
/// store.set_stop(&program, &run_id, started + 60, RunStatus::Completed, None)?;
/// assert_eq!(store.get_run(&program, &run_id)?.unwrap().stop_time, Some(started + 60));
/// ```
#[derive(Debug, Clone)]
pub struct RunStore {
    db: Arc<Database>,
    config: StoreConfig,
    meta: AppMetadataStore,
    dataset: WorkflowDataset,
}

impl RunStore {
    /// In-memory store with default configuration
    pub fn ephemeral() -> Self {
        Self::from_database(Arc::new(Database::ephemeral()), StoreConfig::default())
    }

    /// In-memory store with explicit configuration
    ///
    /// ## Errors
    /// - `Config` if the configuration fails validation
    pub fn with_config(config: StoreConfig) -> Result<Self> {
        let db = Database::with_config(config.clone())?;
        Ok(Self::from_database(Arc::new(db), config))
    }

    /// Store configured from `runstore.toml` in `dir`
    ///
    /// The file is created with defaults if it does not exist yet.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let db = Database::open(dir)?;
        let config = db.config().clone();
        Ok(Self::from_database(Arc::new(db), config))
    }

    /// Store over an existing database
    ///
    /// ## Errors
    /// - `Config` if the configuration fails validation
    pub fn with_database(db: Arc<Database>, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_database(db, config))
    }

    fn from_database(db: Arc<Database>, config: StoreConfig) -> Self {
        RunStore {
            db,
            config,
            meta: AppMetadataStore::new(),
            dataset: WorkflowDataset::new(),
        }
    }

    /// Shared database handle
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Active configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // ========== Lifecycle ==========

    /// Record that a run started
    ///
    /// Re-starting a non-terminal run overwrites it. When `system_args` name
    /// a parent workflow run, the run is registered as one of its nodes.
    ///
    /// ## Errors
    /// - `InvalidInput` if `start_time` differs from `run_id.time_secs()`
    /// - `InvalidTransition` if the run is already terminal
    #[allow(clippy::too_many_arguments)]
    pub fn set_start(
        &self,
        program: &ProgramId,
        run_id: &RunId,
        start_time: u64,
        twill_run_id: Option<String>,
        runtime_args: BTreeMap<String, String>,
        system_args: BTreeMap<String, String>,
    ) -> Result<RunRecord> {
        self.db.transaction_with_retry(&self.config.retry, |txn| {
            self.meta.record_program_start(
                txn,
                program,
                run_id,
                start_time,
                twill_run_id.clone(),
                runtime_args.clone(),
                system_args.clone(),
            )
        })
    }

    /// Move a running run to Suspended
    pub fn set_suspend(
        &self,
        program: &ProgramId,
        run_id: &RunId,
        suspend_time: u64,
    ) -> Result<RunRecord> {
        self.db.transaction_with_retry(&self.config.retry, |txn| {
            self.meta.record_program_suspend(txn, program, run_id, suspend_time)
        })
    }

    /// Move a suspended run back to Running
    pub fn set_resume(
        &self,
        program: &ProgramId,
        run_id: &RunId,
        resume_time: u64,
    ) -> Result<RunRecord> {
        self.db.transaction_with_retry(&self.config.retry, |txn| {
            self.meta.record_program_resume(txn, program, run_id, resume_time)
        })
    }

    /// Record that a run reached a terminal status
    ///
    /// Repeating the same terminal status is a no-op. A completed workflow
    /// run is summarized into the statistics table afterwards; if that second
    /// transaction fails, the failure is logged and the stopped record is
    /// still returned.
    ///
    /// ## Errors
    /// - `InvalidInput` if `status` is not terminal
    /// - `RecordNotFound` if the run does not exist
    /// - `ConflictingTerminalStatus` if a different terminal status is recorded
    pub fn set_stop(
        &self,
        program: &ProgramId,
        run_id: &RunId,
        stop_time: u64,
        status: RunStatus,
        failure_cause: Option<FailureCause>,
    ) -> Result<RunRecord> {
        let record = self.db.transaction_with_retry(&self.config.retry, |txn| {
            self.meta.record_program_stop(
                txn,
                program,
                run_id,
                stop_time,
                status,
                failure_cause.clone(),
            )
        })?;

        if program.program_type == ProgramType::Workflow && record.status == RunStatus::Completed {
            if let Err(e) = self.aggregate_workflow_run(program, run_id) {
                warn!(program = %program, run_id = %run_id, error = %e,
                    "Workflow aggregation failed, run stays stopped without statistics");
            }
        }
        Ok(record)
    }

    /// Summarize a completed workflow run into `WorkflowStats`
    fn aggregate_workflow_run(&self, workflow: &ProgramId, run_id: &RunId) -> Result<()> {
        let written = self.db.transaction_with_retry(&self.config.retry, |txn| {
            let run = match self.meta.get_run(txn, workflow, run_id)? {
                Some(run) => run,
                None => return Ok(false),
            };
            match self.dataset.summarize(txn, &self.meta, &run)? {
                Some(summary) => {
                    self.dataset.write(txn, workflow, &summary)?;
                    Ok(true)
                }
                None => Ok(false),
            }
        })?;
        debug!(program = %workflow, run_id = %run_id, written, "Workflow aggregation finished");
        Ok(())
    }

    /// Apply `target` only if the run is currently in `expected`
    ///
    /// Returns `Ok(None)` when the run is missing or not in `expected`.
    ///
    /// ## Errors
    /// - `InvalidTransition` if `target` is not reachable from `expected`
    pub fn compare_and_set_status(
        &self,
        program: &ProgramId,
        run_id: &RunId,
        expected: RunStatus,
        target: RunStatus,
    ) -> Result<Option<RunRecord>> {
        self.db.transaction_with_retry(&self.config.retry, |txn| {
            self.meta.compare_and_set_status(txn, program, run_id, expected, target)
        })
    }

    // ========== Queries ==========

    /// Point lookup of one run
    ///
    /// ## Errors
    /// - `Corruption` if the stored record cannot be decoded
    pub fn get_run(&self, program: &ProgramId, run_id: &RunId) -> Result<Option<RunRecord>> {
        self.db.transaction_with_retry(&self.config.retry, |txn| {
            self.meta.get_run(txn, program, run_id)
        })
    }

    /// Runs of `program` whose run time is in `[start_secs, end_secs)`
    #[allow(clippy::too_many_arguments)]
    pub fn get_runs(
        &self,
        program: &ProgramId,
        status: StatusFilter,
        start_secs: u64,
        end_secs: u64,
        limit: usize,
        filter: Option<RunFilter<'_>>,
    ) -> Result<Vec<RunRecord>> {
        self.db.transaction_with_retry(&self.config.retry, |txn| {
            self.meta
                .get_runs(txn, program, status, start_secs, end_secs, limit, filter)
        })
    }

    /// Runs across all programs with a matching status
    pub fn get_runs_by_status(
        &self,
        status: StatusFilter,
        limit: usize,
        filter: Option<RunFilter<'_>>,
    ) -> Result<Vec<RunRecord>> {
        self.db.transaction_with_retry(&self.config.retry, |txn| {
            self.meta.get_runs_by_status(txn, status, limit, filter)
        })
    }

    /// Ids of runs that were active at some point in `[start_secs, end_secs]`
    pub fn get_running_in_range(&self, start_secs: u64, end_secs: u64) -> Result<BTreeSet<RunId>> {
        self.db.transaction_with_retry(&self.config.retry, |txn| {
            self.meta.get_running_in_range(txn, start_secs, end_secs)
        })
    }

    /// Runtime arguments of a run, empty if the run is unknown
    pub fn get_runtime_arguments(
        &self,
        program: &ProgramId,
        run_id: &RunId,
    ) -> Result<BTreeMap<String, String>> {
        self.db.transaction_with_retry(&self.config.retry, |txn| {
            self.meta.get_runtime_arguments(txn, program, run_id)
        })
    }

    // ========== Workflows ==========

    /// Replace the token of a workflow run
    ///
    /// ## Errors
    /// - `RecordNotFound` if the workflow run does not exist
    pub fn update_workflow_token(
        &self,
        workflow: &ProgramId,
        run_id: &RunId,
        token: &WorkflowToken,
    ) -> Result<()> {
        self.db.transaction_with_retry(&self.config.retry, |txn| {
            self.meta.update_workflow_token(txn, workflow, run_id, token)
        })
    }

    /// Token of a workflow run, empty if never written
    ///
    /// ## Errors
    /// - `RecordNotFound` if the workflow run does not exist
    pub fn get_workflow_token(
        &self,
        workflow: &ProgramId,
        run_id: &RunId,
    ) -> Result<WorkflowToken> {
        self.db.transaction_with_retry(&self.config.retry, |txn| {
            self.meta.get_workflow_token(txn, workflow, run_id)
        })
    }

    /// Upsert the state of one workflow node
    ///
    /// ## Errors
    /// - `RecordNotFound` if the workflow run does not exist
    pub fn add_workflow_node_state(
        &self,
        workflow: &ProgramId,
        run_id: &RunId,
        state: &WorkflowNodeStateDetail,
    ) -> Result<()> {
        self.db.transaction_with_retry(&self.config.retry, |txn| {
            self.meta.add_workflow_node_state(txn, workflow, run_id, state)
        })
    }

    /// Node states of a workflow run, ordered by node id
    pub fn get_workflow_node_states(
        &self,
        workflow: &ProgramId,
        run_id: &RunId,
    ) -> Result<Vec<WorkflowNodeStateDetail>> {
        self.db.transaction_with_retry(&self.config.retry, |txn| {
            self.meta.get_workflow_node_states(txn, workflow, run_id)
        })
    }

    /// Statistics over completed runs of `workflow` in `[start_secs, end_secs)`
    ///
    /// ## Errors
    /// - `InvalidInput` if a percentile is outside 0..=100
    pub fn get_workflow_statistics(
        &self,
        workflow: &ProgramId,
        start_secs: u64,
        end_secs: u64,
        percentiles: &[f64],
    ) -> Result<Option<WorkflowStatistics>> {
        self.db.transaction_with_retry(&self.config.retry, |txn| {
            self.dataset
                .get_statistics(txn, workflow, start_secs, end_secs, percentiles)
        })
    }

    /// Summary of one completed workflow run
    pub fn get_workflow_run(
        &self,
        workflow: &ProgramId,
        run_id: &RunId,
    ) -> Result<Option<WorkflowRunRecord>> {
        self.db.transaction_with_retry(&self.config.retry, |txn| {
            self.dataset.get_record(txn, workflow, run_id)
        })
    }

    /// Summaries spaced at least `interval_secs` apart around an anchor run
    pub fn retrieve_spaced_records(
        &self,
        workflow: &ProgramId,
        run_id: &RunId,
        limit: usize,
        interval_secs: u64,
    ) -> Result<Option<Vec<WorkflowRunRecord>>> {
        self.db.transaction_with_retry(&self.config.retry, |txn| {
            self.dataset
                .retrieve_spaced_records(txn, workflow, run_id, limit, interval_secs)
        })
    }

    /// Delete every workflow summary of one application
    pub fn delete_workflow_stats(&self, namespace: &str, application: &str) -> Result<usize> {
        let scope = Scope::application(namespace, application);
        let deleted = self.drain(|txn, batch| self.dataset.delete_batch(txn, &scope, batch))?;
        info!(scope = %scope, deleted, "Deleted workflow statistics");
        Ok(deleted)
    }

    // ========== Bulk Deletes ==========

    /// Delete run history and workflow statistics of one application
    pub fn remove_application(&self, namespace: &str, application: &str) -> Result<usize> {
        self.remove_scope(&Scope::application(namespace, application))
    }

    /// Delete run history and workflow statistics of every application in a namespace
    pub fn remove_all_applications(&self, namespace: &str) -> Result<usize> {
        self.remove_scope(&Scope::namespace(namespace))
    }

    /// Delete all run metadata of a namespace
    ///
    /// Equivalent to [`RunStore::remove_all_applications`]: this store keeps no
    /// namespace-level state beyond application history.
    pub fn remove_all(&self, namespace: &str) -> Result<usize> {
        self.remove_scope(&Scope::namespace(namespace))
    }

    fn remove_scope(&self, scope: &Scope) -> Result<usize> {
        let history = self.drain(|txn, batch| {
            self.meta.delete_program_history_batch(txn, scope, batch)
        })?;
        let stats = self.drain(|txn, batch| self.dataset.delete_batch(txn, scope, batch))?;
        info!(scope = %scope, history, stats, "Removed run metadata");
        Ok(history + stats)
    }

    /// Run batch deletes, one transaction each, until a batch deletes nothing
    fn drain<F>(&self, delete_batch: F) -> Result<usize>
    where
        F: Fn(&mut TransactionContext, usize) -> Result<usize>,
    {
        let batch_size = self.config.delete_batch_size;
        let mut total = 0;
        loop {
            let deleted = self.db.transaction_with_retry(&self.config.retry, |txn| {
                delete_batch(txn, batch_size)
            })?;
            if deleted == 0 {
                return Ok(total);
            }
            total += deleted;
        }
    }
}

impl Default for RunStore {
    fn default() -> Self {
        Self::ephemeral()
    }
}
