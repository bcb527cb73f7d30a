//! Opening a store from `runstore.toml`

use crate::common::*;
use runstore::CONFIG_FILE_NAME;

#[test]
fn open_writes_default_config() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();

    let store = RunStore::open(dir.path()).unwrap();
    assert_eq!(store.config(), &StoreConfig::default());
    assert!(dir.path().join(CONFIG_FILE_NAME).exists());

    let p = program("purchases", "aggregate");
    let run_id = start_run(&store, &p, 100);
    assert!(store.get_run(&p, &run_id).unwrap().is_some());
}

#[test]
fn open_reads_existing_config() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(CONFIG_FILE_NAME),
        "delete_batch_size = 7\n\n[retry]\nmax_retries = 1\nbase_delay_ms = 5\nmax_delay_ms = 20\n",
    )
    .unwrap();

    let store = RunStore::open(dir.path()).unwrap();
    assert_eq!(store.config().delete_batch_size, 7);
    assert_eq!(
        store.config().retry,
        RetryConfig::new()
            .with_max_retries(1)
            .with_base_delay_ms(5)
            .with_max_delay_ms(20)
    );
}

#[test]
fn open_rejects_invalid_config() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(CONFIG_FILE_NAME), "delete_batch_size = 0\n").unwrap();

    assert!(matches!(RunStore::open(dir.path()), Err(Error::Config(_))));
}

#[test]
fn with_database_validates_config() {
    init_tracing();
    let db = std::sync::Arc::new(Database::ephemeral());
    let config = StoreConfig {
        retry: RetryConfig::new().with_base_delay_ms(500).with_max_delay_ms(10),
        ..StoreConfig::default()
    };
    assert!(matches!(
        RunStore::with_database(db, config),
        Err(Error::Config(_))
    ));
}
