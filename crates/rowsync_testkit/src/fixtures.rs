//! Test fixtures: servers with throwaway stores and simulated clients.

use rowsync_protocol::{
    Cookie, List, Mutation, PatchOperation, PullRequest, PullResponse, PushRequest, PushResponse,
    Todo, TodoUpdate,
};
use rowsync_server::{BroadcastNotifier, ServerConfig, ServerResult, SyncServer};
use rowsync_store::{SqliteStore, SyncStore};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;

/// A sync server with automatic cleanup.
pub struct TestServer {
    /// The server instance.
    pub server: Arc<SyncServer>,
    /// Poke channel the server publishes to.
    pub notifier: BroadcastNotifier,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestServer {
    /// Creates a server over an in-memory store.
    pub fn memory() -> Self {
        Self::memory_with(ServerConfig::default())
    }

    /// Creates a server over an in-memory store with the given config.
    pub fn memory_with(config: ServerConfig) -> Self {
        let notifier = BroadcastNotifier::default();
        let server = SyncServer::builder(config)
            .notifier(Arc::new(notifier.clone()))
            .build();
        Self {
            server: Arc::new(server),
            notifier,
            _temp_dir: None,
        }
    }

    /// Creates a server over a SQLite file in a temporary directory.
    pub fn sqlite() -> Self {
        Self::sqlite_with(ServerConfig::default())
    }

    /// Creates a server over a SQLite file with the given config.
    pub fn sqlite_with(config: ServerConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = SqliteStore::open(&temp_dir.path().join("rowsync.db"))
            .expect("Failed to open SQLite store");
        let notifier = BroadcastNotifier::default();
        let server = SyncServer::builder(config)
            .store(Arc::new(store))
            .notifier(Arc::new(notifier.clone()))
            .build();
        Self {
            server: Arc::new(server),
            notifier,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns everything `user_id` can currently see, keyed like patch keys.
    pub fn visible_rows(&self, user_id: &str) -> BTreeMap<String, Value> {
        visible_rows(self.server.store().as_ref(), user_id)
    }
}

impl std::ops::Deref for TestServer {
    type Target = SyncServer;

    fn deref(&self) -> &Self::Target {
        &self.server
    }
}

/// Reads the rows visible to `user_id` straight from the store.
pub fn visible_rows(store: &dyn SyncStore, user_id: &str) -> BTreeMap<String, Value> {
    let txn = store.begin().expect("Failed to begin transaction");
    let lists = txn
        .search_lists_by_owner(user_id)
        .expect("Failed to search lists");
    let list_ids: Vec<String> = lists.iter().map(|l| l.id.clone()).collect();
    let todos = txn
        .search_todos_by_lists(&list_ids)
        .expect("Failed to search todos");
    let todo_ids: Vec<String> = todos.iter().map(|t| t.id.clone()).collect();

    let mut rows = BTreeMap::new();
    for row in txn.fetch_lists(&list_ids).expect("Failed to fetch lists") {
        rows.insert(format!("list/{}", row.list.id), json!(row.list));
    }
    for row in txn.fetch_todos(&todo_ids).expect("Failed to fetch todos") {
        rows.insert(format!("todo/{}", row.todo.id), json!(row.todo));
    }
    rows
}

/// Mutation builders for the list/todo mutators.
pub mod mutations {
    use super::*;

    /// `createList` owned by `owner`.
    pub fn create_list(id: u64, client_id: &str, list_id: &str, owner: &str) -> Mutation {
        let list = List {
            id: list_id.into(),
            owner_id: owner.into(),
            name: format!("list {list_id}"),
        };
        Mutation::new(id, client_id, "createList", json!(list))
    }

    /// `deleteList`.
    pub fn delete_list(id: u64, client_id: &str, list_id: &str) -> Mutation {
        Mutation::new(id, client_id, "deleteList", json!(list_id))
    }

    /// `createTodo` under `list_id`.
    pub fn create_todo(id: u64, client_id: &str, todo_id: &str, list_id: &str, text: &str) -> Mutation {
        let todo = Todo {
            id: todo_id.into(),
            list_id: list_id.into(),
            text: text.into(),
            complete: false,
            sort: 0,
        };
        Mutation::new(id, client_id, "createTodo", json!(todo))
    }

    /// `updateTodo`.
    pub fn update_todo(id: u64, client_id: &str, update: TodoUpdate) -> Mutation {
        Mutation::new(id, client_id, "updateTodo", json!(update))
    }

    /// `deleteTodo`.
    pub fn delete_todo(id: u64, client_id: &str, todo_id: &str) -> Mutation {
        Mutation::new(id, client_id, "deleteTodo", json!(todo_id))
    }
}

/// A simulated client: numbers its mutations, keeps its cookie, and applies
/// pulled patches to a local key/value view.
#[derive(Debug, Clone)]
pub struct Replica {
    /// Client group.
    pub client_group_id: String,
    /// Client ID.
    pub client_id: String,
    /// User the client acts for.
    pub user_id: String,
    /// ID of the last mutation this replica created.
    pub last_mutation_id: u64,
    /// Cookie from the last pull.
    pub cookie: Option<Cookie>,
    /// Local rows, keyed like patch keys.
    pub rows: BTreeMap<String, Value>,
    /// Last confirmed mutation ID per client, from pulls.
    pub confirmed: BTreeMap<String, u64>,
}

impl Replica {
    /// Creates a fresh replica.
    pub fn new(client_group_id: &str, client_id: &str, user_id: &str) -> Self {
        Self {
            client_group_id: client_group_id.into(),
            client_id: client_id.into(),
            user_id: user_id.into(),
            last_mutation_id: 0,
            cookie: None,
            rows: BTreeMap::new(),
            confirmed: BTreeMap::new(),
        }
    }

    /// Creates the next mutation of this replica.
    pub fn mutation(&mut self, name: &str, args: Value) -> Mutation {
        self.last_mutation_id += 1;
        Mutation::new(self.last_mutation_id, self.client_id.as_str(), name, args)
    }

    /// Pushes one new mutation.
    pub fn push(&mut self, server: &SyncServer, name: &str, args: Value) -> ServerResult<PushResponse> {
        let mutation = self.mutation(name, args);
        self.push_batch(server, vec![mutation])
    }

    /// Pushes already-built mutations.
    pub fn push_batch(&self, server: &SyncServer, mutations: Vec<Mutation>) -> ServerResult<PushResponse> {
        server.handle_push(
            &self.user_id,
            PushRequest::new(self.client_group_id.as_str(), mutations),
        )
    }

    /// Pulls and applies the patch.
    pub fn pull(&mut self, server: &SyncServer) -> ServerResult<PullResponse> {
        let response = server.handle_pull(
            &self.user_id,
            PullRequest::new(self.client_group_id.as_str(), self.cookie.clone()),
        )?;
        self.apply_patch(&response.patch);
        self.confirmed.extend(
            response
                .last_mutation_id_changes
                .iter()
                .map(|(client, id)| (client.clone(), *id)),
        );
        self.cookie = Some(response.cookie.clone());
        Ok(response)
    }

    /// Applies patch operations in order.
    pub fn apply_patch(&mut self, patch: &[PatchOperation]) {
        for op in patch {
            match op {
                PatchOperation::Clear => self.rows.clear(),
                PatchOperation::Put { key, value } => {
                    self.rows.insert(key.to_string(), value.clone());
                }
                PatchOperation::Del { key } => {
                    self.rows.remove(&key.to_string());
                }
            }
        }
    }

    /// Returns the local value under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.rows.get(key)
    }

    /// Returns the local keys.
    pub fn keys(&self) -> Vec<&str> {
        self.rows.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replica_round_trip() {
        let server = TestServer::memory();
        let mut replica = Replica::new("g1", "c1", "u1");
        replica
            .push(&server, "createList", json!({"id": "L1", "ownerID": "u1", "name": "Work"}))
            .unwrap();
        replica.pull(&server).unwrap();

        assert_eq!(replica.keys(), vec!["list/L1"]);
        assert_eq!(replica.confirmed.get("c1"), Some(&1));
        assert_eq!(replica.rows, server.visible_rows("u1"));
    }

    #[test]
    fn sqlite_server_works() {
        let server = TestServer::sqlite();
        let mut replica = Replica::new("g1", "c1", "u1");
        replica
            .push_batch(&server, vec![mutations::create_list(1, "c1", "L1", "u1")])
            .unwrap();
        replica.pull(&server).unwrap();
        assert!(replica.get("list/L1").is_some());
    }
}
