//! End-to-end push/pull tests against in-process servers.

use rowsync_protocol::{Cookie, PatchOperation, PullRequest, PushRequest, TodoUpdate};
use rowsync_server::{ServerConfig, ServerError, SyncServer};
use rowsync_store::{CvrVersion, SqliteStore, SyncStore};
use rowsync_testkit::prelude::*;
use serde_json::json;
use std::sync::Arc;

fn last_mutation_id(server: &SyncServer, client_id: &str) -> u64 {
    let txn = server.store().begin().unwrap();
    txn.get_client(client_id)
        .unwrap()
        .map_or(0, |client| client.last_mutation_id)
}

fn list_version(server: &SyncServer, list_id: &str) -> Option<u64> {
    let txn = server.store().begin().unwrap();
    txn.fetch_lists(&[list_id.to_string()])
        .unwrap()
        .first()
        .map(|row| row.row_version)
}

fn patch_summary(patch: &[PatchOperation]) -> Vec<String> {
    patch
        .iter()
        .map(|op| match op {
            PatchOperation::Clear => "clear".to_string(),
            PatchOperation::Put { key, .. } => format!("put {key}"),
            PatchOperation::Del { key } => format!("del {key}"),
        })
        .collect()
}

#[test]
fn create_list_then_pull_twice() {
    let server = TestServer::memory();
    server
        .handle_push(
            "u1",
            PushRequest::new(
                "g1",
                vec![rowsync_protocol::Mutation::new(
                    1,
                    "c1",
                    "createList",
                    json!({"id": "L1", "ownerID": "u1", "name": "Work"}),
                )],
            ),
        )
        .unwrap();

    let first = server.handle_pull("u1", PullRequest::new("g1", None)).unwrap();
    assert_eq!(first.cookie, Cookie::new("g1", 1));
    assert_eq!(patch_summary(&first.patch), vec!["clear", "put list/L1"]);
    match &first.patch[1] {
        PatchOperation::Put { value, .. } => {
            assert_eq!(value, &json!({"id": "L1", "ownerID": "u1", "name": "Work"}));
        }
        other => panic!("expected a put, got {:?}", other),
    }
    assert_eq!(first.last_mutation_id_changes.get("c1"), Some(&1));

    let second = server
        .handle_pull("u1", PullRequest::new("g1", Some(first.cookie.clone())))
        .unwrap();
    assert!(second.patch.is_empty());
    assert!(second.last_mutation_id_changes.is_empty());
    assert_eq!(second.cookie, Cookie::new("g1", 2));
}

#[test]
fn duplicate_push_is_a_no_op() {
    let server = TestServer::memory();
    let push = PushRequest::new("g1", vec![mutations::create_list(1, "c1", "L1", "u1")]);

    server.handle_push("u1", push.clone()).unwrap();
    let version = list_version(&server, "L1");
    let response = server.handle_push("u1", push).unwrap();

    assert!(response.mutation_failures.is_empty());
    assert_eq!(last_mutation_id(&server, "c1"), 1);
    assert_eq!(list_version(&server, "L1"), version);
}

#[test]
fn retried_batch_applies_only_new_mutations() {
    let server = TestServer::memory();
    server
        .handle_push(
            "u1",
            PushRequest::new("g1", vec![mutations::create_list(1, "c1", "L1", "u1")]),
        )
        .unwrap();

    let batch = vec![
        mutations::create_list(1, "c1", "L1", "u1"),
        mutations::create_todo(2, "c1", "T1", "L1", "milk"),
    ];
    let response = server.handle_push("u1", PushRequest::new("g1", batch)).unwrap();

    assert!(response.mutation_failures.is_empty());
    assert_eq!(last_mutation_id(&server, "c1"), 2);
    assert_eq!(
        server.visible_rows("u1").keys().collect::<Vec<_>>(),
        vec!["list/L1", "todo/T1"]
    );
}

#[test]
fn future_mutation_halts_batch() {
    let server = TestServer::memory();
    let batch = vec![
        mutations::create_list(1, "c1", "L1", "u1"),
        mutations::create_list(3, "c1", "L2", "u1"),
        mutations::create_list(4, "c1", "L3", "u1"),
    ];

    let err = server.handle_push("u1", PushRequest::new("g1", batch)).unwrap_err();
    match err {
        ServerError::FutureMutation {
            mutation_id,
            expected,
            ..
        } => {
            assert_eq!(mutation_id, 3);
            assert_eq!(expected, 2);
        }
        other => panic!("expected FutureMutation, got {other}"),
    }

    // Mutations before the gap stay applied.
    assert_eq!(last_mutation_id(&server, "c1"), 1);
    assert!(list_version(&server, "L1").is_some());
    assert!(list_version(&server, "L2").is_none());
}

#[test]
fn rejected_mutation_is_skipped_and_reported() {
    let server = TestServer::memory();
    let batch = vec![
        mutations::create_todo(1, "c1", "T1", "missing", "orphan"),
        mutations::create_list(2, "c1", "L1", "u1"),
    ];

    let response = server.handle_push("u1", PushRequest::new("g1", batch)).unwrap();

    assert_eq!(response.mutation_failures.len(), 1);
    let failure = &response.mutation_failures[0];
    assert_eq!(failure.client_id, "c1");
    assert_eq!(failure.mutation_id, 1);
    assert_eq!(failure.name, "createTodo");
    assert_eq!(last_mutation_id(&server, "c1"), 2);
    assert!(list_version(&server, "L1").is_some());

    // The skipped mutation is acknowledged, so it reads as a duplicate now.
    let retry = PushRequest::new("g1", vec![mutations::create_todo(1, "c1", "T1", "missing", "orphan")]);
    assert!(server.handle_push("u1", retry).unwrap().mutation_failures.is_empty());
}

#[test]
fn rejected_mutation_halts_when_not_skipping() {
    let server = TestServer::memory_with(ServerConfig::default().with_skip_failed_mutations(false));
    let batch = vec![
        mutations::create_todo(1, "c1", "T1", "missing", "orphan"),
        mutations::create_list(2, "c1", "L1", "u1"),
    ];

    let err = server.handle_push("u1", PushRequest::new("g1", batch)).unwrap_err();
    assert!(matches!(err, ServerError::Mutation { mutation_id: 1, .. }));
    assert_eq!(last_mutation_id(&server, "c1"), 0);
    assert!(list_version(&server, "L1").is_none());
}

#[test]
fn client_cannot_switch_groups() {
    let server = TestServer::memory();
    server
        .handle_push(
            "u1",
            PushRequest::new("g1", vec![mutations::create_list(1, "c1", "L1", "u1")]),
        )
        .unwrap();

    let err = server
        .handle_push(
            "u1",
            PushRequest::new("g2", vec![mutations::create_list(2, "c1", "L2", "u1")]),
        )
        .unwrap_err();
    assert!(matches!(err, ServerError::ClientGroupMismatch { .. }));
}

#[test]
fn oversized_batch_is_rejected() {
    let server = TestServer::memory_with(ServerConfig::default().with_max_push_batch(2));
    let batch = (1..=3)
        .map(|i| mutations::create_list(i, "c1", &format!("L{i}"), "u1"))
        .collect();

    let err = server.handle_push("u1", PushRequest::new("g1", batch)).unwrap_err();
    assert!(matches!(err, ServerError::InvalidRequest(_)));
    assert_eq!(last_mutation_id(&server, "c1"), 0);
}

#[test]
fn incremental_pulls_carry_only_changes() {
    let server = TestServer::memory();
    let mut replica = Replica::new("g1", "c1", "u1");
    replica
        .push(&server, "createList", json!({"id": "L1", "ownerID": "u1", "name": "Home"}))
        .unwrap();
    replica
        .push(&server, "createTodo", json!({"id": "T1", "listID": "L1", "text": "a", "complete": false}))
        .unwrap();
    replica
        .push(&server, "createTodo", json!({"id": "T2", "listID": "L1", "text": "b", "complete": false}))
        .unwrap();
    replica.pull(&server).unwrap();

    replica
        .push(&server, "updateTodo", json!(TodoUpdate::new("T1").with_complete(true)))
        .unwrap();
    let response = replica.pull(&server).unwrap();

    assert_eq!(patch_summary(&response.patch), vec!["put todo/T1"]);
    assert_eq!(replica.get("todo/T1").unwrap()["complete"], true);
    assert_eq!(response.last_mutation_id_changes.get("c1"), Some(&4));
}

#[test]
fn deletes_propagate_in_section_order() {
    let server = TestServer::memory();
    let mut replica = Replica::new("g1", "c1", "u1");
    for list in ["L1", "L2"] {
        replica
            .push(&server, "createList", json!({"id": list, "ownerID": "u1", "name": list}))
            .unwrap();
    }
    replica
        .push(&server, "createTodo", json!({"id": "T1", "listID": "L1", "text": "a", "complete": false}))
        .unwrap();
    replica
        .push(&server, "createTodo", json!({"id": "T2", "listID": "L2", "text": "b", "complete": false}))
        .unwrap();
    replica.pull(&server).unwrap();

    replica.push(&server, "deleteList", json!("L1")).unwrap();
    replica
        .push(&server, "updateTodo", json!(TodoUpdate::new("T2").with_text("bb")))
        .unwrap();
    let response = replica.pull(&server).unwrap();

    assert_eq!(
        patch_summary(&response.patch),
        vec!["del list/L1", "del todo/T1", "put todo/T2"]
    );
    assert_eq!(replica.keys(), vec!["list/L2", "todo/T2"]);
    assert_eq!(replica.rows, server.visible_rows("u1"));
}

#[test]
fn todo_sort_is_assigned_by_server() {
    let server = TestServer::memory();
    let mut replica = Replica::new("g1", "c1", "u1");
    replica
        .push(&server, "createList", json!({"id": "L1", "ownerID": "u1", "name": "x"}))
        .unwrap();
    for todo in ["T1", "T2", "T3"] {
        replica
            .push(&server, "createTodo", json!({"id": todo, "listID": "L1", "text": todo, "complete": false, "sort": 99}))
            .unwrap();
    }
    replica.pull(&server).unwrap();

    let sorts: Vec<_> = ["todo/T1", "todo/T2", "todo/T3"]
        .iter()
        .map(|key| replica.get(key).unwrap()["sort"].as_i64().unwrap())
        .collect();
    assert_eq!(sorts, vec![1, 2, 3]);
}

#[test]
fn exhausted_sort_position_fails_only_that_mutation() {
    let server = TestServer::memory();
    let mut replica = Replica::new("g1", "c1", "u1");
    replica
        .push(&server, "createList", json!({"id": "L1", "ownerID": "u1", "name": "x"}))
        .unwrap();
    replica
        .push(&server, "createTodo", json!({"id": "T1", "listID": "L1", "text": "a", "complete": false}))
        .unwrap();
    replica
        .push(&server, "updateTodo", json!(TodoUpdate::new("T1").with_sort(i64::MAX)))
        .unwrap();

    let response = replica
        .push(&server, "createTodo", json!({"id": "T2", "listID": "L1", "text": "b", "complete": false}))
        .unwrap();

    assert_eq!(response.mutation_failures.len(), 1);
    assert_eq!(response.mutation_failures[0].mutation_id, 4);
    assert!(response.mutation_failures[0].error.contains("out of range"));
    assert_eq!(last_mutation_id(&server, "c1"), 4);
    assert_eq!(
        server.visible_rows("u1").keys().collect::<Vec<_>>(),
        vec!["list/L1", "todo/T1"]
    );
}

#[test]
fn other_users_rows_are_invisible_and_protected() {
    let server = TestServer::memory();
    let mut alice = Replica::new("g-alice", "c-alice", "alice");
    let mut bob = Replica::new("g-bob", "c-bob", "bob");
    alice
        .push(&server, "createList", json!({"id": "L1", "ownerID": "alice", "name": "a"}))
        .unwrap();

    let response = bob.pull(&server).unwrap();
    assert_eq!(response.patch, vec![PatchOperation::Clear]);

    let response = bob.push(&server, "deleteList", json!("L1")).unwrap();
    assert_eq!(response.mutation_failures.len(), 1);
    assert!(response.mutation_failures[0].error.contains("authorization"));

    let response = bob
        .push(&server, "createList", json!({"id": "L2", "ownerID": "alice", "name": "spoof"}))
        .unwrap();
    assert_eq!(response.mutation_failures.len(), 1);

    alice.pull(&server).unwrap();
    assert_eq!(alice.keys(), vec!["list/L1"]);
}

#[test]
fn sibling_clients_see_each_others_acknowledgements() {
    let server = TestServer::memory();
    let mut first = Replica::new("g1", "c1", "u1");
    let mut second = Replica::new("g1", "c2", "u1");

    first
        .push(&server, "createList", json!({"id": "L1", "ownerID": "u1", "name": "shared"}))
        .unwrap();
    first.pull(&server).unwrap();
    second.pull(&server).unwrap();
    assert_eq!(second.confirmed.get("c1"), Some(&1));

    second
        .push(&server, "createTodo", json!({"id": "T1", "listID": "L1", "text": "x", "complete": false}))
        .unwrap();
    let response = first.pull(&server).unwrap();

    assert_eq!(response.last_mutation_id_changes.len(), 1);
    assert_eq!(response.last_mutation_id_changes.get("c2"), Some(&1));
    assert_eq!(patch_summary(&response.patch), vec!["put todo/T1"]);
}

#[test]
fn cookie_order_strictly_increases() {
    let server = TestServer::memory();
    let mut replica = Replica::new("g1", "c1", "u1");
    let mut orders = Vec::new();
    for i in 0..5 {
        if i % 2 == 0 {
            replica
                .push(&server, "createList", json!({"id": format!("L{i}"), "ownerID": "u1", "name": "n"}))
                .unwrap();
        }
        orders.push(replica.pull(&server).unwrap().cookie.order);
    }
    assert!(orders.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn evicted_base_forces_full_resync() {
    let server = TestServer::memory_with(ServerConfig::default().with_cvr_cache_capacity(1));
    let mut first = Replica::new("g1", "c1", "u1");
    let mut other = Replica::new("g2", "c2", "u2");

    first
        .push(&server, "createList", json!({"id": "L1", "ownerID": "u1", "name": "a"}))
        .unwrap();
    first.pull(&server).unwrap();
    // Pushes the only slot over to g2.
    other.pull(&server).unwrap();
    assert_eq!(server.cvr_cache().len(), 1);

    // A local-only row the server never saw must vanish on resync.
    first.rows.insert("list/ghost".into(), json!({}));
    let response = first.pull(&server).unwrap();

    assert_eq!(patch_summary(&response.patch), vec!["clear", "put list/L1"]);
    assert_eq!(response.cookie.order, 2);
    assert_eq!(first.keys(), vec!["list/L1"]);
}

#[test]
fn unknown_cookie_seeds_order() {
    let server = TestServer::memory();
    let response = server
        .handle_pull("u1", PullRequest::new("g1", Some(Cookie::new("g1", 41))))
        .unwrap();

    assert_eq!(response.cookie, Cookie::new("g1", 42));
    assert_eq!(response.patch, vec![PatchOperation::Clear]);
}

#[test]
fn unrepresentable_cookie_order_does_not_wedge_sqlite_group() {
    let server = TestServer::sqlite();
    for order in [u64::MAX, i64::MAX as u64 + 1, CvrVersion::MAX_SEED_ORDER + 1] {
        let group = format!("g-{order}");
        let response = server
            .handle_pull("u1", PullRequest::new(group.as_str(), Some(Cookie::new(group.as_str(), order))))
            .unwrap();
        assert_eq!(response.cookie.order, 1);
        assert_eq!(response.patch, vec![PatchOperation::Clear]);

        let next = server
            .handle_pull("u1", PullRequest::new(group.as_str(), Some(response.cookie)))
            .unwrap();
        assert_eq!(next.cookie.order, 2);
    }
}

#[test]
fn foreign_cookie_is_ignored() {
    let server = TestServer::memory();
    let mut replica = Replica::new("g1", "c1", "u1");
    replica
        .push(&server, "createList", json!({"id": "L1", "ownerID": "u1", "name": "a"}))
        .unwrap();
    replica.pull(&server).unwrap();

    let response = server
        .handle_pull("u1", PullRequest::new("g1", Some(Cookie::new("g2", 1))))
        .unwrap();
    assert_eq!(patch_summary(&response.patch), vec!["clear", "put list/L1"]);
    assert_eq!(response.cookie, Cookie::new("g1", 2));
}

#[test]
fn pushes_poke_affected_channels() {
    let server = TestServer::memory();
    let mut pokes = server.notifier.subscribe();
    let mut replica = Replica::new("g1", "c1", "u1");

    replica
        .push(&server, "createList", json!({"id": "L1", "ownerID": "u1", "name": "a"}))
        .unwrap();
    replica
        .push(&server, "createTodo", json!({"id": "T1", "listID": "L1", "text": "x", "complete": false}))
        .unwrap();
    // Duplicates and failures have no effect to announce.
    replica
        .push_batch(&server, vec![mutations::create_list(1, "c1", "L1", "u1")])
        .unwrap();

    let mut received = Vec::new();
    while let Ok(key) = pokes.try_recv() {
        received.push(key);
    }
    assert_eq!(received, vec!["user/u1", "list/L1"]);
}

#[test]
fn sqlite_store_end_to_end() {
    let server = TestServer::sqlite();
    let mut replica = Replica::new("g1", "c1", "u1");
    replica
        .push(&server, "createList", json!({"id": "L1", "ownerID": "u1", "name": "a"}))
        .unwrap();
    replica
        .push(&server, "createTodo", json!({"id": "T1", "listID": "L1", "text": "x", "complete": false}))
        .unwrap();
    replica.pull(&server).unwrap();
    replica.push(&server, "deleteTodo", json!("T1")).unwrap();
    let response = replica.pull(&server).unwrap();

    assert_eq!(patch_summary(&response.patch), vec!["del todo/T1"]);
    assert_eq!(replica.rows, server.visible_rows("u1"));
    assert_eq!(last_mutation_id(&server, "c1"), 3);
}

#[test]
fn sqlite_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rowsync.db");
    let mut replica = Replica::new("g1", "c1", "u1");

    {
        let server = SyncServer::builder(ServerConfig::default())
            .store(Arc::new(SqliteStore::open(&path).unwrap()))
            .build();
        replica
            .push(&server, "createList", json!({"id": "L1", "ownerID": "u1", "name": "a"}))
            .unwrap();
        replica.pull(&server).unwrap();
    }

    let store: Arc<dyn SyncStore> = Arc::new(SqliteStore::open(&path).unwrap());
    let server = SyncServer::builder(ServerConfig::default())
        .store(store)
        .build();

    // Already-applied mutations are still recognized.
    replica
        .push_batch(&server, vec![mutations::create_list(1, "c1", "L1", "u1")])
        .unwrap();
    assert_eq!(last_mutation_id(&server, "c1"), 1);

    // The view cache is gone, so the next pull is a full resync that keeps
    // counting from the stored order.
    let response = replica.pull(&server).unwrap();
    assert_eq!(patch_summary(&response.patch), vec!["clear", "put list/L1"]);
    assert_eq!(response.cookie.order, 2);
}
