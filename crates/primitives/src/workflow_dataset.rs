//! WorkflowDataset: statistics over completed workflow runs
//!
//! One `WorkflowRunRecord` is kept per completed workflow run in the
//! `WorkflowStats` table, keyed by workflow then run time. A record exists
//! only if the workflow completed and every node it ran completed too.
//!
//! Percentiles use the nearest-rank method over ascending values:
//! `idx = clamp(ceil(p / 100 * n), 1, n) - 1`.

use std::collections::BTreeMap;

use runstore_concurrency::TransactionContext;
use runstore_core::{
    Error, Key, NodeStatistics, PercentileInformation, ProgramId, ProgramRun, ProgramType, Result,
    RunId, RunRecord, RunStatus, Scope, Value, WorkflowRunRecord, WorkflowStatistics,
};
use tracing::{info, warn};

use crate::app_meta::AppMetadataStore;

/// Index of the nearest-rank `percentile` in an ascending list of `n` values
///
/// `n` must be non-zero.
pub fn nearest_rank_index(percentile: f64, n: usize) -> usize {
    let rank = (percentile / 100.0 * n as f64).ceil() as usize;
    rank.clamp(1, n) - 1
}

fn validate_percentiles(percentiles: &[f64]) -> Result<()> {
    for p in percentiles {
        if !p.is_finite() || *p < 0.0 || *p > 100.0 {
            return Err(Error::InvalidInput(format!(
                "percentile {} is outside 0..=100",
                p
            )));
        }
    }
    Ok(())
}

/// Completed-workflow statistics over a transaction
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkflowDataset;

impl WorkflowDataset {
    /// Create a handle
    pub fn new() -> Self {
        WorkflowDataset
    }

    /// Build the summary of a completed workflow run from its node runs
    ///
    /// Returns `Ok(None)` when the workflow did not complete or any node run
    /// is missing or did not complete.
    pub fn summarize(
        &self,
        txn: &mut TransactionContext,
        meta: &AppMetadataStore,
        workflow_run: &RunRecord,
    ) -> Result<Option<WorkflowRunRecord>> {
        let stop_time = match (workflow_run.status, workflow_run.stop_time) {
            (RunStatus::Completed, Some(stop)) => stop,
            _ => return Ok(None),
        };

        let mut program_runs = Vec::with_capacity(workflow_run.workflow_nodes.len());
        for (node_id, node) in &workflow_run.workflow_nodes {
            let program = workflow_run
                .program
                .sibling(node.program_type, node.program.clone());
            let duration_secs = match meta.get_run(txn, &program, &node.run_id)? {
                Some(RunRecord {
                    status: RunStatus::Completed,
                    stop_time: Some(stop),
                    start_time,
                    ..
                }) => stop.saturating_sub(start_time),
                Some(other) => {
                    info!(program = %workflow_run.program, run_id = %workflow_run.run_id,
                        node = %node_id, node_status = %other.status,
                        "Node did not complete, workflow statistics not recorded");
                    return Ok(None);
                }
                None => {
                    info!(program = %workflow_run.program, run_id = %workflow_run.run_id,
                        node = %node_id, "Node run missing, workflow statistics not recorded");
                    return Ok(None);
                }
            };
            program_runs.push(ProgramRun {
                node_id: node_id.clone(),
                run_id: node.run_id,
                program_type: node.program_type,
                duration_ms: duration_secs.saturating_mul(1000),
            });
        }

        Ok(Some(WorkflowRunRecord {
            workflow_run_id: workflow_run.run_id,
            start_time: workflow_run.start_time,
            time_taken_secs: stop_time.saturating_sub(workflow_run.start_time),
            program_runs,
        }))
    }

    /// Store the summary of one completed run; rewriting the same run replaces it
    pub fn write(
        &self,
        txn: &mut TransactionContext,
        workflow: &ProgramId,
        record: &WorkflowRunRecord,
    ) -> Result<()> {
        txn.put(
            Key::workflow_run(workflow, &record.workflow_run_id),
            Value::json(record)?,
        )
    }

    /// Summary of one run
    ///
    /// ## Errors
    /// - `Corruption` if the stored summary does not decode
    pub fn get_record(
        &self,
        txn: &mut TransactionContext,
        workflow: &ProgramId,
        run_id: &RunId,
    ) -> Result<Option<WorkflowRunRecord>> {
        match txn.get(&Key::workflow_run(workflow, run_id))? {
            Some(value) => Ok(Some(value.decode()?)),
            None => Ok(None),
        }
    }

    fn decode_rows(rows: Vec<(Key, Value)>) -> Vec<WorkflowRunRecord> {
        rows.into_iter()
            .filter_map(|(key, value)| match value.decode() {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(key = ?key, error = %e, "Skipping undecodable workflow run summary");
                    None
                }
            })
            .collect()
    }

    fn scan(
        &self,
        txn: &mut TransactionContext,
        workflow: &ProgramId,
        start_secs: u64,
        end_secs: u64,
    ) -> Result<Vec<WorkflowRunRecord>> {
        if start_secs >= end_secs {
            return Ok(Vec::new());
        }
        let rows = txn.scan_range(
            &Key::workflow_run_time_bound(workflow, start_secs),
            &Key::workflow_run_time_bound(workflow, end_secs),
        )?;
        Ok(Self::decode_rows(rows))
    }

    /// Statistics over runs that started in `[start_secs, end_secs)`
    ///
    /// Returns `Ok(None)` when no run falls in the window.
    ///
    /// ## Errors
    /// - `InvalidInput` if a percentile is not a finite number in 0..=100
    pub fn get_statistics(
        &self,
        txn: &mut TransactionContext,
        workflow: &ProgramId,
        start_secs: u64,
        end_secs: u64,
        percentiles: &[f64],
    ) -> Result<Option<WorkflowStatistics>> {
        validate_percentiles(percentiles)?;

        let records = self.scan(txn, workflow, start_secs, end_secs)?;
        if records.is_empty() {
            return Ok(None);
        }

        let mut run_times: Vec<(u64, RunId)> = records
            .iter()
            .map(|r| (r.time_taken_secs, r.workflow_run_id))
            .collect();
        run_times.sort();
        let n = run_times.len();
        let total: u64 = run_times.iter().map(|(t, _)| *t).sum();

        let percentile_info = percentiles
            .iter()
            .map(|&p| {
                let idx = nearest_rank_index(p, n);
                PercentileInformation {
                    percentile: p,
                    value: run_times[idx].0,
                    run_ids_over_percentile: run_times[idx..].iter().map(|(_, id)| *id).collect(),
                }
            })
            .collect();

        let mut per_node: BTreeMap<String, (ProgramType, Vec<u64>)> = BTreeMap::new();
        for record in &records {
            for run in &record.program_runs {
                per_node
                    .entry(run.node_id.clone())
                    .or_insert_with(|| (run.program_type, Vec::new()))
                    .1
                    .push(run.duration_ms);
            }
        }

        let nodes = per_node
            .into_iter()
            .map(|(node_id, (program_type, mut durations))| {
                durations.sort_unstable();
                let count = durations.len();
                let sum: u64 = durations.iter().sum();
                let stats = NodeStatistics {
                    program_type,
                    runs: count,
                    avg_duration_ms: sum as f64 / count as f64,
                    percentiles: percentiles
                        .iter()
                        .map(|&p| (p, durations[nearest_rank_index(p, count)]))
                        .collect(),
                };
                (node_id, stats)
            })
            .collect();

        Ok(Some(WorkflowStatistics {
            start_time: start_secs,
            end_time: end_secs,
            runs: n,
            avg_run_time_secs: total as f64 / n as f64,
            percentiles: percentile_info,
            nodes,
        }))
    }

    /// A time-sparse sample of runs around `run_id`
    ///
    /// Walks away from the anchor in both directions, greedily keeping runs
    /// that started at least `interval_secs` after (or before) the last kept
    /// run, at most `limit` per direction. The anchor is included and the
    /// result is ascending by start time. Returns `Ok(None)` if the anchor
    /// has no summary.
    pub fn retrieve_spaced_records(
        &self,
        txn: &mut TransactionContext,
        workflow: &ProgramId,
        run_id: &RunId,
        limit: usize,
        interval_secs: u64,
    ) -> Result<Option<Vec<WorkflowRunRecord>>> {
        let anchor = match self.get_record(txn, workflow, run_id)? {
            Some(anchor) => anchor,
            None => return Ok(None),
        };

        let all = Self::decode_rows(txn.scan_prefix(&Key::workflow_run_prefix(workflow))?);
        let pos = match all.iter().position(|r| r.workflow_run_id == *run_id) {
            Some(pos) => pos,
            None => return Ok(Some(vec![anchor])),
        };

        let mut before = Vec::new();
        let mut last = all[pos].start_time;
        for record in all[..pos].iter().rev() {
            if before.len() >= limit {
                break;
            }
            if last.abs_diff(record.start_time) >= interval_secs {
                last = record.start_time;
                before.push(record.clone());
            }
        }

        let mut after = Vec::new();
        let mut last = all[pos].start_time;
        for record in &all[pos + 1..] {
            if after.len() >= limit {
                break;
            }
            if record.start_time.abs_diff(last) >= interval_secs {
                last = record.start_time;
                after.push(record.clone());
            }
        }

        before.reverse();
        before.push(anchor);
        before.extend(after);
        Ok(Some(before))
    }

    /// Delete up to `batch_size` summaries under `scope`; returns how many went
    pub fn delete_batch(
        &self,
        txn: &mut TransactionContext,
        scope: &Scope,
        batch_size: usize,
    ) -> Result<usize> {
        let rows = txn.scan_prefix(&Key::workflow_scope_prefix(scope))?;
        let mut deleted = 0;
        for (key, _) in rows.into_iter().take(batch_size) {
            txn.delete(key)?;
            deleted += 1;
        }
        Ok(deleted)
    }
}
