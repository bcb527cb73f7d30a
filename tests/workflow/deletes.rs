//! Scope deletes across run history and workflow statistics

use std::sync::Arc;

use crate::common::*;
use runstore::NodeStatus;

fn seed(store: &RunStore, app: &str) -> (ProgramId, RunId) {
    let wf = ProgramId::workflow("default", app, "nightly");
    let run_id = complete_workflow(store, &wf, 1_000, &[("extract", 10)], 20);
    store
        .add_workflow_node_state(
            &wf,
            &run_id,
            &WorkflowNodeStateDetail::new("extract", NodeStatus::Completed),
        )
        .unwrap();
    (wf, run_id)
}

#[test]
fn delete_workflow_stats_keeps_run_history() {
    let store = store_with(RetryConfig::default(), 1);
    let (wf, run_id) = seed(&store, "purchases");
    let (other, other_run) = seed(&store, "billing");

    assert_eq!(store.delete_workflow_stats("default", "purchases").unwrap(), 1);
    assert_eq!(store.get_workflow_run(&wf, &run_id).unwrap(), None);
    assert!(store.get_run(&wf, &run_id).unwrap().is_some());
    assert!(store.get_workflow_run(&other, &other_run).unwrap().is_some());
}

#[test]
fn remove_application_clears_everything_keyed_by_its_runs() {
    let store = store_with(RetryConfig::default(), 2);
    let (wf, run_id) = seed(&store, "purchases");
    let (other, other_run) = seed(&store, "billing");

    // Workflow run, its node run, and one summary
    assert_eq!(store.remove_application("default", "purchases").unwrap(), 3);

    assert_eq!(store.get_run(&wf, &run_id).unwrap(), None);
    assert_eq!(store.get_workflow_run(&wf, &run_id).unwrap(), None);
    assert!(store.get_workflow_node_states(&wf, &run_id).unwrap().is_empty());
    assert!(store
        .get_runs_by_status(StatusFilter::Any, usize::MAX, None)
        .unwrap()
        .iter()
        .all(|r| r.program.application == "billing"));

    assert!(store.get_run(&other, &other_run).unwrap().is_some());
    assert!(store.get_workflow_run(&other, &other_run).unwrap().is_some());
}

#[test]
fn remove_all_applications_is_namespace_scoped() {
    let store = store();
    seed(&store, "purchases");
    seed(&store, "billing");
    let elsewhere = ProgramId::new("staging", "purchases", ProgramType::Spark, "train");
    let survivor = start_run(&store, &elsewhere, 1_000);

    assert_eq!(store.remove_all_applications("default").unwrap(), 6);
    assert_eq!(
        store
            .get_runs_by_status(StatusFilter::Any, usize::MAX, None)
            .unwrap()
            .len(),
        1
    );
    assert!(store.get_run(&elsewhere, &survivor).unwrap().is_some());
}

#[test]
fn remove_all_can_be_rerun() {
    let store = store();
    seed(&store, "purchases");

    assert_eq!(store.remove_all("default").unwrap(), 3);
    assert_eq!(store.remove_all("default").unwrap(), 0);
}

#[test]
fn scope_delete_leaves_no_node_states_behind() {
    let store = store();
    let wf = workflow("doomed", "nightly");
    let ghost = RunId::from_time(500);
    let state = WorkflowNodeStateDetail::new("extract", NodeStatus::Running);

    assert!(store
        .add_workflow_node_state(&wf, &ghost, &state)
        .unwrap_err()
        .is_not_found());
    let run_id = start_run(&store, &wf, 1_000);
    store.add_workflow_node_state(&wf, &run_id, &state).unwrap();

    assert_eq!(store.remove_application("default", "doomed").unwrap(), 1);
    assert!(store.get_workflow_node_states(&wf, &run_id).unwrap().is_empty());
    assert!(store.get_workflow_node_states(&wf, &ghost).unwrap().is_empty());
}

#[test]
fn remove_application_frees_storage() {
    init_tracing();
    let substrate = Arc::new(OrderedStore::new());
    let storage: Arc<dyn Storage> = substrate.clone();
    let db = Database::with_storage(storage, StoreConfig::default()).unwrap();
    let store = RunStore::with_database(Arc::new(db), StoreConfig::default()).unwrap();

    let doomed = program("doomed", "aggregate");
    for secs in 0..50u64 {
        let run_id = start_run(&store, &doomed, 1_000 + secs);
        store
            .set_stop(&doomed, &run_id, 2_000, RunStatus::Completed, None)
            .unwrap();
    }
    let kept = program("kept", "aggregate");
    let survivor = start_run(&store, &kept, 1_000);

    let before = substrate.key_count();
    assert!(before >= 100);

    assert_eq!(store.remove_application("default", "doomed").unwrap(), 50);
    // Only the survivor's record and its status-index entry remain
    assert_eq!(substrate.key_count(), 2);
    assert!(store.get_run(&kept, &survivor).unwrap().is_some());
}
