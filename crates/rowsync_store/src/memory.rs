//! In-memory store for testing and ephemeral servers.

use crate::backend::{EntityRepository, EntityWriter, StoreTransaction, SyncStore, VersionStore};
use crate::error::StoreResult;
use crate::records::{now_millis, ClientGroupRecord, ClientRecord, EntityVersion, ListRow, TodoRow};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::{BTreeMap, HashSet};

/// Committed contents of a [`MemoryStore`].
#[derive(Debug, Clone, Default)]
struct Tables {
    client_groups: BTreeMap<String, ClientGroupRecord>,
    clients: BTreeMap<String, ClientRecord>,
    lists: BTreeMap<String, ListRow>,
    todos: BTreeMap<String, TodoRow>,
    row_version: u64,
}

/// An in-memory transactional store.
///
/// This store keeps all records in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Servers that don't need persistence
///
/// # Transactions
///
/// Only one transaction can be active at a time. A transaction works on a
/// private copy of the committed tables and swaps it in on commit; dropping
/// it discards the copy.
///
/// # Example
///
/// ```rust
/// use rowsync_store::{MemoryStore, StoreTransaction, SyncStore, VersionStore};
///
/// let store = MemoryStore::new();
/// let mut txn = store.begin().unwrap();
/// let client = txn.client_or_default("c1", "g1").unwrap();
/// txn.put_client(&client).unwrap();
/// drop(txn); // rolled back
///
/// let txn = store.begin().unwrap();
/// assert!(txn.get_client("c1").unwrap().is_none());
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    committed: RwLock<Tables>,
    write_lock: Mutex<()>,
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored lists and todos.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn entity_counts(&self) -> (usize, usize) {
        let tables = self.committed.read();
        (tables.lists.len(), tables.todos.len())
    }

    /// Returns the number of known clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.committed.read().clients.len()
    }
}

impl SyncStore for MemoryStore {
    fn begin(&self) -> StoreResult<Box<dyn StoreTransaction + '_>> {
        // Exclusive for the transaction's lifetime.
        let guard = self.write_lock.lock();
        let working = self.committed.read().clone();
        Ok(Box::new(MemoryTransaction {
            store: self,
            working,
            _guard: guard,
        }))
    }
}

/// A transaction on a [`MemoryStore`].
struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    working: Tables,
    _guard: MutexGuard<'a, ()>,
}

impl VersionStore for MemoryTransaction<'_> {
    fn get_client_group(&self, id: &str) -> StoreResult<Option<ClientGroupRecord>> {
        Ok(self.working.client_groups.get(id).cloned())
    }

    fn put_client_group(&mut self, record: &ClientGroupRecord) -> StoreResult<()> {
        let mut record = record.clone();
        record.last_modified = now_millis();
        self.working.client_groups.insert(record.id.clone(), record);
        Ok(())
    }

    fn get_client(&self, id: &str) -> StoreResult<Option<ClientRecord>> {
        Ok(self.working.clients.get(id).cloned())
    }

    fn put_client(&mut self, record: &ClientRecord) -> StoreResult<()> {
        let mut record = record.clone();
        record.last_modified = now_millis();
        self.working.clients.insert(record.id.clone(), record);
        Ok(())
    }

    fn search_clients(
        &self,
        client_group_id: &str,
        since_client_version: u64,
    ) -> StoreResult<Vec<ClientRecord>> {
        Ok(self
            .working
            .clients
            .values()
            .filter(|c| c.client_group_id == client_group_id)
            .filter(|c| c.client_version > since_client_version)
            .cloned()
            .collect())
    }
}

impl EntityRepository for MemoryTransaction<'_> {
    fn search_lists_by_owner(&self, owner_id: &str) -> StoreResult<Vec<EntityVersion>> {
        Ok(self
            .working
            .lists
            .values()
            .filter(|row| row.list.owner_id == owner_id)
            .map(ListRow::version)
            .collect())
    }

    fn search_todos_by_lists(&self, list_ids: &[String]) -> StoreResult<Vec<EntityVersion>> {
        let parents: HashSet<&str> = list_ids.iter().map(String::as_str).collect();
        Ok(self
            .working
            .todos
            .values()
            .filter(|row| parents.contains(row.todo.list_id.as_str()))
            .map(TodoRow::version)
            .collect())
    }

    fn fetch_lists(&self, ids: &[String]) -> StoreResult<Vec<ListRow>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.working.lists.get(id).cloned())
            .collect())
    }

    fn fetch_todos(&self, ids: &[String]) -> StoreResult<Vec<TodoRow>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.working.todos.get(id).cloned())
            .collect())
    }

    fn max_todo_sort(&self, list_id: &str) -> StoreResult<Option<i64>> {
        Ok(self
            .working
            .todos
            .values()
            .filter(|row| row.todo.list_id == list_id)
            .map(|row| row.todo.sort)
            .max())
    }
}

impl EntityWriter for MemoryTransaction<'_> {
    fn next_row_version(&mut self) -> StoreResult<u64> {
        self.working.row_version += 1;
        Ok(self.working.row_version)
    }

    fn put_list(&mut self, row: &ListRow) -> StoreResult<()> {
        let mut row = row.clone();
        row.last_modified = now_millis();
        self.working.lists.insert(row.list.id.clone(), row);
        Ok(())
    }

    fn delete_list(&mut self, id: &str) -> StoreResult<bool> {
        Ok(self.working.lists.remove(id).is_some())
    }

    fn put_todo(&mut self, row: &TodoRow) -> StoreResult<()> {
        let mut row = row.clone();
        row.last_modified = now_millis();
        self.working.todos.insert(row.todo.id.clone(), row);
        Ok(())
    }

    fn delete_todo(&mut self, id: &str) -> StoreResult<bool> {
        Ok(self.working.todos.remove(id).is_some())
    }
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTransaction {
            store,
            working,
            _guard,
        } = *self;
        *store.committed.write() = working;
        Ok(())
    }
}
