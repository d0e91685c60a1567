//! Concurrency tests over both store backends.

use rowsync_server::SyncServer;
use rowsync_testkit::prelude::*;
use std::sync::Arc;

fn last_mutation_id(server: &SyncServer, client_id: &str) -> u64 {
    let txn = server.store().begin().unwrap();
    txn.get_client(client_id)
        .unwrap()
        .map_or(0, |client| client.last_mutation_id)
}

fn small_config(shared_group: bool) -> StressConfig {
    StressConfig {
        mutations_per_client: 25,
        threads: 4,
        shared_group,
    }
}

#[test]
fn concurrent_clients_in_one_group() {
    let server = TestServer::memory();
    let config = small_config(true);

    let result = stress_concurrent_push_pull(Arc::clone(&server.server), &config);
    result.print_summary("concurrent push/pull, shared group");

    assert_eq!(result.failed_ops, 0);
    for t in 0..config.threads {
        assert_eq!(
            last_mutation_id(&server, &format!("stress-client-{t}")),
            config.mutations_per_client as u64 + 1
        );
        let rows = server.visible_rows(&format!("stress-user-{t}"));
        assert_eq!(rows.len(), config.mutations_per_client + 1);
    }
}

#[test]
fn concurrent_clients_in_separate_groups_on_sqlite() {
    let server = TestServer::sqlite();
    let config = small_config(false);

    let result = stress_concurrent_push_pull(Arc::clone(&server.server), &config);

    assert_eq!(result.failed_ops, 0);
    for t in 0..config.threads {
        assert_eq!(
            last_mutation_id(&server, &format!("stress-client-{t}")),
            config.mutations_per_client as u64 + 1
        );
    }
}

#[test]
fn duplicate_delivery_applies_once() {
    let server = TestServer::memory();
    let config = small_config(true);

    let result = stress_duplicate_delivery(Arc::clone(&server.server), &config, 5);
    result.print_summary("duplicate delivery");

    assert_eq!(result.failed_ops, 0);
    for t in 0..config.threads {
        assert_eq!(
            last_mutation_id(&server, &format!("dup-client-{t}")),
            config.mutations_per_client as u64
        );
        let rows = server.visible_rows(&format!("dup-user-{t}"));
        assert_eq!(rows.len(), config.mutations_per_client);
    }
}

#[test]
fn group_version_counts_every_applied_mutation() {
    let server = TestServer::memory();
    let config = small_config(true);
    stress_concurrent_push_pull(Arc::clone(&server.server), &config);

    let txn = server.store().begin().unwrap();
    let group = txn.get_client_group(&config.group_for(0)).unwrap().unwrap();
    assert_eq!(
        group.client_group_version,
        (config.threads * (config.mutations_per_client + 1)) as u64
    );
}
