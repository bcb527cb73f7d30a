//! Range scans, status queries and running-in-range

use crate::common::*;
use runstore::RunFilter;

#[test]
fn get_runs_returns_window_in_time_order() {
    let store = store();
    let p = program("purchases", "aggregate");
    let ids: Vec<RunId> = [100, 300, 200, 500, 400]
        .iter()
        .map(|secs| start_run(&store, &p, *secs))
        .collect();

    let runs = store
        .get_runs(&p, StatusFilter::Any, 200, 500, 10, None)
        .unwrap();
    let times: Vec<u64> = runs.iter().map(|r| r.start_time).collect();
    assert_eq!(times, vec![200, 300, 400]);
    assert!(runs.iter().all(|r| ids.contains(&r.run_id)));
}

#[test]
fn get_runs_is_scoped_to_one_program() {
    let store = store();
    let a = program("purchases", "aggregate");
    let b = program("purchases", "aggregate2");
    start_run(&store, &a, 100);
    start_run(&store, &b, 100);
    start_run(&store, &b, 101);

    assert_eq!(
        store
            .get_runs(&a, StatusFilter::Any, 0, u64::MAX, 10, None)
            .unwrap()
            .len(),
        1
    );
    assert_eq!(
        store
            .get_runs(&b, StatusFilter::Any, 0, u64::MAX, 10, None)
            .unwrap()
            .len(),
        2
    );
}

#[test]
fn get_runs_applies_status_filter_and_limit() {
    let store = store();
    let p = program("purchases", "aggregate");
    for secs in 0..6u64 {
        let run_id = start_run(&store, &p, 100 + secs);
        if secs % 2 == 0 {
            store
                .set_stop(&p, &run_id, 200, RunStatus::Completed, None)
                .unwrap();
        }
    }

    let completed = store
        .get_runs(&p, StatusFilter::Is(RunStatus::Completed), 0, u64::MAX, 2, None)
        .unwrap();
    assert_eq!(completed.len(), 2);
    assert!(completed.iter().all(|r| r.status == RunStatus::Completed));
    assert_eq!(completed[0].start_time, 100);
    assert_eq!(completed[1].start_time, 102);
}

#[test]
fn get_runs_applies_predicate_before_limit() {
    let store = store();
    let p = program("purchases", "aggregate");
    for secs in 0..5u64 {
        let run_id = RunId::from_time(100 + secs);
        let mut args = BTreeMap::new();
        args.insert("tier".to_string(), if secs < 3 { "bronze" } else { "gold" }.to_string());
        store
            .set_start(&p, &run_id, 100 + secs, None, args, BTreeMap::new())
            .unwrap();
    }

    let gold: RunFilter =
        &|r: &RunRecord| r.runtime_args.get("tier").map(String::as_str) == Some("gold");
    let runs = store
        .get_runs(&p, StatusFilter::Any, 0, u64::MAX, 1, Some(gold))
        .unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].start_time, 103);
}

#[test]
fn empty_or_inverted_window_returns_nothing() {
    let store = store();
    let p = program("purchases", "aggregate");
    start_run(&store, &p, 100);

    assert!(store
        .get_runs(&p, StatusFilter::Any, 100, 100, 10, None)
        .unwrap()
        .is_empty());
    assert!(store
        .get_runs(&p, StatusFilter::Any, 200, 100, 10, None)
        .unwrap()
        .is_empty());
}

#[test]
fn runs_by_status_span_programs() {
    let store = store();
    let a = program("purchases", "aggregate");
    let b = program("billing", "invoice");
    let a1 = start_run(&store, &a, 100);
    let b1 = start_run(&store, &b, 110);
    let a2 = start_run(&store, &a, 120);
    store
        .set_stop(&a, &a2, 130, RunStatus::Killed, None)
        .unwrap();

    let running = store
        .get_runs_by_status(StatusFilter::Is(RunStatus::Running), 10, None)
        .unwrap();
    let ids: Vec<RunId> = running.iter().map(|r| r.run_id).collect();
    assert_eq!(ids, vec![a1, b1]);

    let killed = store
        .get_runs_by_status(StatusFilter::Is(RunStatus::Killed), 10, None)
        .unwrap();
    assert_eq!(killed.len(), 1);
    assert_eq!(killed[0].run_id, a2);
}

#[test]
fn running_in_range_includes_overlapping_runs() {
    let store = store();
    let p = program("purchases", "aggregate");

    // Finished before the window opens
    let early = start_run(&store, &p, 10);
    store
        .set_stop(&p, &early, 50, RunStatus::Completed, None)
        .unwrap();
    // Spans the window start
    let spanning = start_run(&store, &p, 80);
    store
        .set_stop(&p, &spanning, 120, RunStatus::Completed, None)
        .unwrap();
    // Still running
    let open = start_run(&store, &p, 150);
    // Starts after the window closes
    start_run(&store, &p, 300);

    let ids = store.get_running_in_range(100, 200).unwrap();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&spanning));
    assert!(ids.contains(&open));
    assert!(!ids.contains(&early));
}

#[test]
fn runtime_arguments_of_unknown_run_are_empty() {
    let store = store();
    let p = program("purchases", "aggregate");
    assert!(store
        .get_runtime_arguments(&p, &RunId::from_time(1))
        .unwrap()
        .is_empty());
}

#[test]
fn start_time_must_match_run_id_time() {
    let store = store();
    let p = program("purchases", "aggregate");
    let run_id = RunId::from_time(1_000);

    let err = store
        .set_start(&p, &run_id, 100, None, BTreeMap::new(), BTreeMap::new())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert!(store
        .get_runs(&p, StatusFilter::Any, 0, u64::MAX, 10, None)
        .unwrap()
        .is_empty());

    store
        .set_start(&p, &run_id, 1_000, None, BTreeMap::new(), BTreeMap::new())
        .unwrap();
    let runs = store
        .get_runs(&p, StatusFilter::Any, 900, 1_100, 10, None)
        .unwrap();
    assert_eq!(runs.len(), 1);
    assert!(runs.iter().all(|r| (900..1_100).contains(&r.start_time)));
    assert!(store
        .get_runs(&p, StatusFilter::Any, 50, 150, 10, None)
        .unwrap()
        .is_empty());
}
