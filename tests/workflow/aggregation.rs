//! Summaries written when a workflow run completes

use crate::common::*;

#[test]
fn completed_workflow_with_completed_nodes_is_summarized() {
    let store = store();
    let wf = workflow("purchases", "nightly");
    let run_id = complete_workflow(&store, &wf, 1_000, &[("extract", 30), ("load", 20)], 60);

    let summary = store.get_workflow_run(&wf, &run_id).unwrap().unwrap();
    assert_eq!(summary.workflow_run_id, run_id);
    assert_eq!(summary.start_time, 1_000);
    assert_eq!(summary.time_taken_secs, 60);

    let nodes: Vec<(&str, u64)> = summary
        .program_runs
        .iter()
        .map(|r| (r.node_id.as_str(), r.duration_ms))
        .collect();
    assert_eq!(nodes, vec![("extract", 30_000), ("load", 20_000)]);
}

#[test]
fn failed_node_blocks_summary() {
    let store = store();
    let wf = workflow("purchases", "nightly");
    let w1 = start_run(&store, &wf, 1_000);

    let (a, a_run) = start_node(&store, &wf, &w1, "A", 1_000);
    store
        .set_stop(&a, &a_run, 1_010, RunStatus::Completed, None)
        .unwrap();
    let (b, b_run) = start_node(&store, &wf, &w1, "B", 1_010);
    store
        .set_stop(&b, &b_run, 1_020, RunStatus::Failed, None)
        .unwrap();
    store
        .set_stop(&wf, &w1, 1_025, RunStatus::Failed, None)
        .unwrap();

    assert_eq!(store.get_workflow_run(&wf, &w1).unwrap(), None);
    assert_eq!(
        store
            .get_workflow_statistics(&wf, 0, 2_000, &[50.0])
            .unwrap(),
        None
    );
}

#[test]
fn completed_workflow_with_failed_node_is_not_summarized() {
    let store = store();
    let wf = workflow("purchases", "nightly");
    let run_id = start_run(&store, &wf, 1_000);

    let (node, node_run) = start_node(&store, &wf, &run_id, "extract", 1_000);
    store
        .set_stop(&node, &node_run, 1_010, RunStatus::Failed, None)
        .unwrap();
    let stopped = store
        .set_stop(&wf, &run_id, 1_020, RunStatus::Completed, None)
        .unwrap();

    assert_eq!(stopped.status, RunStatus::Completed);
    assert_eq!(store.get_workflow_run(&wf, &run_id).unwrap(), None);
}

#[test]
fn running_node_blocks_summary() {
    let store = store();
    let wf = workflow("purchases", "nightly");
    let run_id = start_run(&store, &wf, 1_000);
    start_node(&store, &wf, &run_id, "extract", 1_000);

    store
        .set_stop(&wf, &run_id, 1_020, RunStatus::Completed, None)
        .unwrap();
    assert_eq!(store.get_workflow_run(&wf, &run_id).unwrap(), None);
}

#[test]
fn repeated_completion_rewrites_the_same_summary() {
    let store = store();
    let wf = workflow("purchases", "nightly");
    let run_id = complete_workflow(&store, &wf, 1_000, &[("extract", 30)], 45);
    let first = store.get_workflow_run(&wf, &run_id).unwrap().unwrap();

    store
        .set_stop(&wf, &run_id, 1_045, RunStatus::Completed, None)
        .unwrap();
    assert_eq!(store.get_workflow_run(&wf, &run_id).unwrap(), Some(first));
    assert_eq!(
        store
            .get_workflow_statistics(&wf, 0, 2_000, &[50.0])
            .unwrap()
            .unwrap()
            .runs,
        1
    );
}

#[test]
fn non_workflow_programs_are_never_summarized() {
    let store = store();
    let p = program("purchases", "aggregate");
    let run_id = start_run(&store, &p, 1_000);
    store
        .set_stop(&p, &run_id, 1_010, RunStatus::Completed, None)
        .unwrap();

    assert_eq!(store.get_workflow_run(&p, &run_id).unwrap(), None);
}

#[test]
fn failed_summary_does_not_fail_the_stop() {
    let store = store();
    let wf = workflow("purchases", "nightly");
    let run_id = start_run(&store, &wf, 1_000);
    let (node_program, node_run) = start_node(&store, &wf, &run_id, "extract", 1_001);

    // The node record no longer decodes, so summarizing the workflow errors
    store
        .database()
        .transaction(|txn| {
            txn.put(
                Key::run(&node_program, &node_run),
                Value::String("{not json".into()),
            )
        })
        .unwrap();

    let stopped = store
        .set_stop(&wf, &run_id, 1_060, RunStatus::Completed, None)
        .unwrap();
    assert_eq!(stopped.status, RunStatus::Completed);
    assert_eq!(stopped.stop_time, Some(1_060));
    assert_eq!(store.get_run(&wf, &run_id).unwrap(), Some(stopped));
    assert_eq!(store.get_workflow_run(&wf, &run_id).unwrap(), None);
}
