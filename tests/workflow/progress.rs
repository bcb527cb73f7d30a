//! Node registration, workflow tokens and node states

use crate::common::*;
use runstore::NodeStatus;

#[test]
fn node_runs_register_with_their_workflow() {
    let store = store();
    let wf = workflow("purchases", "nightly");
    let run_id = start_run(&store, &wf, 1_000);
    let (_, extract_run) = start_node(&store, &wf, &run_id, "extract", 1_001);
    let (_, load_run) = start_node(&store, &wf, &run_id, "load", 1_002);

    let parent = store.get_run(&wf, &run_id).unwrap().unwrap();
    assert_eq!(parent.workflow_nodes.len(), 2);
    assert_eq!(parent.workflow_nodes["extract"].run_id, extract_run);
    assert_eq!(parent.workflow_nodes["load"].run_id, load_run);
    assert_eq!(parent.workflow_nodes["load"].program, "load");
}

#[test]
fn node_registration_survives_workflow_restart() {
    let store = store();
    let wf = workflow("purchases", "nightly");
    let run_id = start_run(&store, &wf, 1_000);
    start_node(&store, &wf, &run_id, "extract", 1_001);

    store
        .set_start(&wf, &run_id, 1_000, None, BTreeMap::new(), BTreeMap::new())
        .unwrap();
    let parent = store.get_run(&wf, &run_id).unwrap().unwrap();
    assert!(parent.workflow_nodes.contains_key("extract"));
}

#[test]
fn node_of_missing_workflow_still_starts() {
    let store = store();
    let wf = workflow("purchases", "nightly");
    let ghost = RunId::from_time(999);

    let (node, node_run) = start_node(&store, &wf, &ghost, "extract", 1_000);
    assert_eq!(
        store.get_run(&node, &node_run).unwrap().unwrap().status,
        RunStatus::Running
    );
    assert_eq!(store.get_run(&wf, &ghost).unwrap(), None);
}

#[test]
fn node_of_finished_workflow_is_not_registered() {
    let store = store();
    let wf = workflow("purchases", "nightly");
    let run_id = start_run(&store, &wf, 1_000);
    store
        .set_stop(&wf, &run_id, 1_010, RunStatus::Killed, None)
        .unwrap();

    start_node(&store, &wf, &run_id, "late", 1_020);
    let parent = store.get_run(&wf, &run_id).unwrap().unwrap();
    assert!(parent.workflow_nodes.is_empty());
    assert_eq!(parent.status, RunStatus::Killed);
}

#[test]
fn token_round_trip() {
    let store = store();
    let wf = workflow("purchases", "nightly");
    let run_id = start_run(&store, &wf, 1_000);

    assert!(store.get_workflow_token(&wf, &run_id).unwrap().is_empty());

    let mut token = WorkflowToken::new();
    token.put("rows", "10", "extract");
    token.put("rows", "8", "filter");
    store.update_workflow_token(&wf, &run_id, &token).unwrap();

    let stored = store.get_workflow_token(&wf, &run_id).unwrap();
    assert_eq!(stored, token);
    assert_eq!(stored.get("rows"), Some("8"));
    assert_eq!(stored.get_from_node("rows", "extract"), Some("10"));
}

#[test]
fn token_of_unknown_run_is_not_found() {
    let store = store();
    let wf = workflow("purchases", "nightly");
    let ghost = RunId::from_time(1);

    assert!(store.get_workflow_token(&wf, &ghost).unwrap_err().is_not_found());
    assert!(store
        .update_workflow_token(&wf, &ghost, &WorkflowToken::new())
        .unwrap_err()
        .is_not_found());
}

#[test]
fn node_states_upsert_by_node_id() {
    let store = store();
    let wf = workflow("purchases", "nightly");
    let run_id = start_run(&store, &wf, 1_000);

    store
        .add_workflow_node_state(
            &wf,
            &run_id,
            &WorkflowNodeStateDetail::new("load", NodeStatus::Running),
        )
        .unwrap();
    store
        .add_workflow_node_state(
            &wf,
            &run_id,
            &WorkflowNodeStateDetail::new("extract", NodeStatus::Running).with_run_id("r-1"),
        )
        .unwrap();
    store
        .add_workflow_node_state(
            &wf,
            &run_id,
            &WorkflowNodeStateDetail::new("extract", NodeStatus::Completed).with_run_id("r-1"),
        )
        .unwrap();

    let states = store.get_workflow_node_states(&wf, &run_id).unwrap();
    let summary: Vec<(&str, NodeStatus)> = states
        .iter()
        .map(|s| (s.node_id.as_str(), s.node_status))
        .collect();
    assert_eq!(
        summary,
        vec![("extract", NodeStatus::Completed), ("load", NodeStatus::Running)]
    );
    assert_eq!(states[0].run_id.as_deref(), Some("r-1"));
}

#[test]
fn node_states_are_scoped_to_one_run() {
    let store = store();
    let wf = workflow("purchases", "nightly");
    let first = start_run(&store, &wf, 1_000);
    let second = start_run(&store, &wf, 2_000);

    store
        .add_workflow_node_state(
            &wf,
            &first,
            &WorkflowNodeStateDetail::new("extract", NodeStatus::Failed),
        )
        .unwrap();

    assert_eq!(store.get_workflow_node_states(&wf, &first).unwrap().len(), 1);
    assert!(store.get_workflow_node_states(&wf, &second).unwrap().is_empty());
}

#[test]
fn node_state_of_unknown_run_is_not_found() {
    let store = store();
    let wf = workflow("purchases", "nightly");
    let ghost = RunId::from_time(1);

    let err = store
        .add_workflow_node_state(
            &wf,
            &ghost,
            &WorkflowNodeStateDetail::new("extract", NodeStatus::Running),
        )
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(store.get_workflow_node_states(&wf, &ghost).unwrap().is_empty());
}
