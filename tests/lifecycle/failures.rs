//! Substrate failures and corrupt records

use crate::common::*;

fn corrupt(store: &RunStore, p: &ProgramId, run_id: &RunId) {
    store
        .database()
        .transaction(|txn| {
            txn.put(Key::run(p, run_id), Value::String("{not a run record".into()))
        })
        .unwrap();
}

#[test]
fn failed_commit_surfaces_store_unavailable() {
    let (store, faults) = faulty_store();
    let p = program("purchases", "aggregate");
    let run_id = RunId::from_time(100);

    faults.fail_writes(true);
    let err = store
        .set_start(&p, &run_id, 100, None, BTreeMap::new(), BTreeMap::new())
        .unwrap_err();
    assert!(matches!(err, Error::StoreUnavailable { .. }));
    assert!(!err.is_retryable());
    assert_eq!(faults.injected_faults(), 1);

    // Nothing from the failed commit is visible
    faults.fail_writes(false);
    assert_eq!(store.get_run(&p, &run_id).unwrap(), None);
    assert!(store
        .get_runs_by_status(StatusFilter::Any, 10, None)
        .unwrap()
        .is_empty());
}

#[test]
fn failed_read_surfaces_store_unavailable() {
    let (store, faults) = faulty_store();
    let p = program("purchases", "aggregate");
    let run_id = start_run(&store, &p, 100);

    faults.fail_reads(true);
    assert!(matches!(
        store.get_run(&p, &run_id),
        Err(Error::StoreUnavailable { .. })
    ));
    assert!(matches!(
        store.set_stop(&p, &run_id, 200, RunStatus::Completed, None),
        Err(Error::StoreUnavailable { .. })
    ));

    faults.fail_reads(false);
    let run = store.get_run(&p, &run_id).unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Running);
}

#[test]
fn corrupt_record_errors_on_point_read() {
    let store = store();
    let p = program("purchases", "aggregate");
    let run_id = start_run(&store, &p, 100);
    corrupt(&store, &p, &run_id);

    assert!(matches!(store.get_run(&p, &run_id), Err(Error::Corruption(_))));
}

#[test]
fn corrupt_record_is_skipped_in_lists() {
    let store = store();
    let p = program("purchases", "aggregate");
    let bad = start_run(&store, &p, 100);
    let good = start_run(&store, &p, 200);
    corrupt(&store, &p, &bad);

    let runs = store
        .get_runs(&p, StatusFilter::Any, 0, u64::MAX, 10, None)
        .unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].run_id, good);

    let running = store
        .get_runs_by_status(StatusFilter::Is(RunStatus::Running), 10, None)
        .unwrap();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].run_id, good);

    let active = store.get_running_in_range(0, 1_000).unwrap();
    assert!(active.contains(&good));
    assert!(!active.contains(&bad));
}
