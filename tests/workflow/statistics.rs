//! Percentile statistics and spaced records

use crate::common::*;

#[test]
fn statistics_over_window() {
    let store = store();
    let wf = workflow("purchases", "nightly");
    let mut ids = Vec::new();
    for (i, taken) in [40u64, 10, 30, 20, 50].iter().enumerate() {
        let start = 1_000 + i as u64 * 100;
        ids.push(complete_workflow(&store, &wf, start, &[("extract", taken / 2)], *taken));
    }

    let stats = store
        .get_workflow_statistics(&wf, 1_000, 2_000, &[50.0, 90.0])
        .unwrap()
        .unwrap();
    assert_eq!(stats.runs, 5);
    assert_eq!(stats.avg_run_time_secs, 30.0);

    // Sorted run times: 10 20 30 40 50
    assert_eq!(stats.percentiles[0].value, 30);
    assert_eq!(stats.percentiles[0].run_ids_over_percentile.len(), 3);
    assert_eq!(stats.percentiles[1].value, 50);
    assert_eq!(stats.percentiles[1].run_ids_over_percentile, vec![ids[4]]);

    let extract = &stats.nodes["extract"];
    assert_eq!(extract.runs, 5);
    assert_eq!(extract.program_type, ProgramType::Mapreduce);
    assert_eq!(extract.avg_duration_ms, 15_000.0);
    assert_eq!(extract.percentiles, vec![(50.0, 15_000), (90.0, 25_000)]);
}

#[test]
fn statistics_window_excludes_outside_runs() {
    let store = store();
    let wf = workflow("purchases", "nightly");
    complete_workflow(&store, &wf, 500, &[], 99);
    complete_workflow(&store, &wf, 1_000, &[], 10);
    complete_workflow(&store, &wf, 2_000, &[], 99);

    let stats = store
        .get_workflow_statistics(&wf, 1_000, 2_000, &[100.0])
        .unwrap()
        .unwrap();
    assert_eq!(stats.runs, 1);
    assert_eq!(stats.percentiles[0].value, 10);
}

#[test]
fn statistics_of_empty_window_are_absent() {
    let store = store();
    let wf = workflow("purchases", "nightly");
    complete_workflow(&store, &wf, 1_000, &[], 10);

    assert_eq!(
        store
            .get_workflow_statistics(&wf, 5_000, 6_000, &[50.0])
            .unwrap(),
        None
    );
}

#[test]
fn out_of_range_percentile_is_rejected() {
    let store = store();
    let wf = workflow("purchases", "nightly");
    complete_workflow(&store, &wf, 1_000, &[], 10);

    for bad in [-1.0, 100.5, f64::NAN] {
        let err = store
            .get_workflow_statistics(&wf, 0, 2_000, &[bad])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}

#[test]
fn spaced_records_skip_close_neighbours() {
    let store = store();
    let wf = workflow("purchases", "nightly");
    let ids: Vec<RunId> = [0u64, 10, 20, 30, 40]
        .iter()
        .map(|t| complete_workflow(&store, &wf, *t, &[], 5))
        .collect();

    let records = store
        .retrieve_spaced_records(&wf, &ids[2], 2, 15)
        .unwrap()
        .unwrap();
    let starts: Vec<u64> = records.iter().map(|r| r.start_time).collect();
    assert_eq!(starts, vec![0, 20, 40]);
}

#[test]
fn spaced_records_respect_limit() {
    let store = store();
    let wf = workflow("purchases", "nightly");
    let ids: Vec<RunId> = (0..7u64)
        .map(|i| complete_workflow(&store, &wf, i * 100, &[], 5))
        .collect();

    let records = store
        .retrieve_spaced_records(&wf, &ids[3], 1, 50)
        .unwrap()
        .unwrap();
    let starts: Vec<u64> = records.iter().map(|r| r.start_time).collect();
    assert_eq!(starts, vec![200, 300, 400]);
}

#[test]
fn spaced_records_without_anchor_are_absent() {
    let store = store();
    let wf = workflow("purchases", "nightly");
    complete_workflow(&store, &wf, 0, &[], 5);

    assert_eq!(
        store
            .retrieve_spaced_records(&wf, &RunId::from_time(10), 2, 15)
            .unwrap(),
        None
    );
}
