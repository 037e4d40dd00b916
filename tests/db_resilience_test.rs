mod helpers;

use helpers::{add_memory, tenant};
use recallgate::db::{self, migrations::CURRENT_SCHEMA_VERSION};
use recallgate::memory::types::MemoryType;
use recallgate::rollout::types::{RolloutActor, RolloutMode};
use recallgate::storage::{SqliteStorage, Storage};

#[test]
fn on_disk_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("recallgate.db");

    {
        let storage = SqliteStorage::open(&path).unwrap();
        add_memory(&storage, &tenant("acme"), "Use conventional commits", MemoryType::Rule, &[]);
        storage
            .set_rollout_config(
                &tenant("acme"),
                RolloutMode::Shadow,
                &RolloutActor::Operator("ops".into()),
            )
            .unwrap();
    }

    let storage = SqliteStorage::open(&path).unwrap();
    let report = storage.health().unwrap();
    assert!(report.integrity_ok);
    assert_eq!(report.schema_version, CURRENT_SCHEMA_VERSION);
    assert_eq!(report.memory_count, 1);
    assert_eq!(report.tenant_configs, 1);
    assert_eq!(storage.get_rollout_config(&tenant("acme")).unwrap().mode, RolloutMode::Shadow);
}

#[test]
fn open_sets_busy_timeout_and_wal() {
    let dir = tempfile::tempdir().unwrap();
    let conn = db::open_database(dir.path().join("recallgate.db")).unwrap();

    let timeout: i64 = conn.query_row("PRAGMA busy_timeout", [], |row| row.get(0)).unwrap();
    assert_eq!(timeout, 5000);
    let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0)).unwrap();
    assert_eq!(mode.to_lowercase(), "wal");
}

#[test]
fn migrations_are_idempotent() {
    let mut conn = db::open_memory_database().unwrap();
    db::migrations::run_migrations(&mut conn).unwrap();
    db::schema::init_schema(&conn).unwrap();
    assert_eq!(db::migrations::get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
}

#[test]
fn concurrent_upserts_leave_one_config_row() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("recallgate.db");
    // Initialize once so the writers race on data, not schema
    drop(SqliteStorage::open(&path).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let path = path.clone();
            std::thread::spawn(move || {
                let storage = SqliteStorage::open(&path).unwrap();
                let mode = if i % 2 == 0 { RolloutMode::Shadow } else { RolloutMode::Off };
                let actor = RolloutActor::Operator(format!("op-{i}"));
                storage.set_rollout_config(&tenant("acme"), mode, &actor).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let storage = SqliteStorage::open(&path).unwrap();
    assert_eq!(storage.health().unwrap().tenant_configs, 1);
    assert_eq!(storage.config_history(&tenant("acme")).unwrap().len(), 4);
}

#[test]
fn link_memory_requires_existing_memory() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let acme = tenant("acme");
    let err = storage.link_memory(&acme, "missing", "repo", "acme/api", "related_to").unwrap_err();
    assert_eq!(err.kind(), "not_found_error");

    let id = add_memory(&storage, &acme, "API uses axum", MemoryType::Fact, &[]);
    let first = storage.link_memory(&acme, &id, "repo", "acme/api", "related_to").unwrap();
    assert!(first.created);
    assert_eq!(first.node, "repo:acme/api");
    let again = storage.link_memory(&acme, &id, "repo", "acme/api", "related_to").unwrap();
    assert!(!again.created);
}

#[test]
fn link_memory_rejects_memory_from_another_tenant() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let id = add_memory(&storage, &tenant("acme"), "Billing runs on Stripe", MemoryType::Fact, &[]);

    let err = storage
        .link_memory(&tenant("globex"), &id, "repo", "globex/web", "related_to")
        .unwrap_err();
    assert_eq!(err.kind(), "not_found_error");

    // The rejected attempt left no edge behind
    let owner = storage
        .link_memory(&tenant("acme"), &id, "repo", "globex/web", "related_to")
        .unwrap();
    assert!(owner.created);
}
