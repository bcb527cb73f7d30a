//! Deterministic interleavings of metadata transactions

use std::sync::Arc;

use crate::common::*;
use runstore_primitives::AppMetadataStore;

fn setup() -> (Arc<Database>, RunStore, ProgramId, RunId) {
    init_tracing();
    let db = Arc::new(Database::ephemeral());
    let store = RunStore::with_database(Arc::clone(&db), StoreConfig::default()).unwrap();
    let p = program("purchases", "aggregate");
    let run_id = start_run(&store, &p, 100);
    (db, store, p, run_id)
}

#[test]
fn second_stop_on_same_run_fails_validation() {
    let (db, store, p, run_id) = setup();
    let meta = AppMetadataStore::new();

    let mut first = db.begin_transaction();
    let mut second = db.begin_transaction();
    meta.record_program_stop(&mut first, &p, &run_id, 200, RunStatus::Completed, None)
        .unwrap();
    meta.record_program_stop(&mut second, &p, &run_id, 210, RunStatus::Killed, None)
        .unwrap();

    db.commit_transaction(&mut first).unwrap();
    let err = db.commit_transaction(&mut second).unwrap_err();
    assert!(err.is_conflict());
    assert!(err.is_retryable());

    // Re-running the losing operation from scratch sees the winner
    let mut retry = db.begin_transaction();
    let err = meta
        .record_program_stop(&mut retry, &p, &run_id, 210, RunStatus::Killed, None)
        .unwrap_err();
    assert!(matches!(err, Error::ConflictingTerminalStatus { .. }));

    let run = store.get_run(&p, &run_id).unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.stop_time, Some(200));
}

#[test]
fn losing_commit_leaves_no_partial_index_update() {
    let (db, store, p, run_id) = setup();
    let meta = AppMetadataStore::new();

    let mut suspend = db.begin_transaction();
    let mut stop = db.begin_transaction();
    meta.record_program_suspend(&mut suspend, &p, &run_id, 150).unwrap();
    meta.record_program_stop(&mut stop, &p, &run_id, 160, RunStatus::Failed, None)
        .unwrap();

    db.commit_transaction(&mut stop).unwrap();
    assert!(db.commit_transaction(&mut suspend).unwrap_err().is_conflict());

    assert!(store
        .get_runs_by_status(StatusFilter::Is(RunStatus::Suspended), 10, None)
        .unwrap()
        .is_empty());
    let failed = store
        .get_runs_by_status(StatusFilter::Is(RunStatus::Failed), 10, None)
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].run_id, run_id);
}

#[test]
fn operations_on_different_runs_commit_in_any_order() {
    let (db, store, p, first_run) = setup();
    let second_run = start_run(&store, &p, 101);
    let meta = AppMetadataStore::new();

    let mut a = db.begin_transaction();
    let mut b = db.begin_transaction();
    meta.record_program_stop(&mut a, &p, &first_run, 200, RunStatus::Completed, None)
        .unwrap();
    meta.record_program_stop(&mut b, &p, &second_run, 200, RunStatus::Killed, None)
        .unwrap();

    db.commit_transaction(&mut b).unwrap();
    db.commit_transaction(&mut a).unwrap();

    assert_eq!(
        store.get_run(&p, &first_run).unwrap().unwrap().status,
        RunStatus::Completed
    );
    assert_eq!(
        store.get_run(&p, &second_run).unwrap().unwrap().status,
        RunStatus::Killed
    );
}

#[test]
fn exhausted_retries_surface_write_conflict() {
    let (db, _store, p, run_id) = setup();
    let meta = AppMetadataStore::new();

    // Every attempt races a blind write to the same run and loses
    let err = db
        .transaction_with_retry(&RetryConfig::no_retry(), |txn| {
            let record = meta.get_run(txn, &p, &run_id)?.expect("run exists");
            db.transaction(|other| meta.write_run(other, &record, Some(record.status)))?;
            meta.record_program_suspend(txn, &p, &run_id, 150)
        })
        .unwrap_err();
    assert!(err.is_conflict());
}
