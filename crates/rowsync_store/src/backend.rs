//! Storage trait definitions.

use crate::error::StoreResult;
use crate::records::{ClientGroupRecord, ClientRecord, EntityVersion, ListRow, TodoRow};

/// Version bookkeeping for clients and client groups.
///
/// `put_*` methods are upserts: they insert a new record or overwrite the
/// existing one, and stamp `last_modified` with the current time.
pub trait VersionStore {
    /// Loads a client group record.
    fn get_client_group(&self, id: &str) -> StoreResult<Option<ClientGroupRecord>>;

    /// Inserts or updates a client group record.
    fn put_client_group(&mut self, record: &ClientGroupRecord) -> StoreResult<()>;

    /// Loads a client record.
    fn get_client(&self, id: &str) -> StoreResult<Option<ClientRecord>>;

    /// Inserts or updates a client record.
    fn put_client(&mut self, record: &ClientRecord) -> StoreResult<()>;

    /// Returns clients of a group whose `client_version` is greater than
    /// `since_client_version`.
    fn search_clients(
        &self,
        client_group_id: &str,
        since_client_version: u64,
    ) -> StoreResult<Vec<ClientRecord>>;

    /// Loads a client group record, or a zero-valued one if absent.
    fn client_group_or_default(&self, id: &str) -> StoreResult<ClientGroupRecord> {
        Ok(self
            .get_client_group(id)?
            .unwrap_or_else(|| ClientGroupRecord::new(id)))
    }

    /// Loads a client record, or a zero-valued one in `client_group_id` if absent.
    fn client_or_default(&self, id: &str, client_group_id: &str) -> StoreResult<ClientRecord> {
        Ok(self
            .get_client(id)?
            .unwrap_or_else(|| ClientRecord::new(id, client_group_id)))
    }
}

/// Read access to synchronized entities.
pub trait EntityRepository {
    /// Returns `(id, row_version)` of every list owned by `owner_id`.
    fn search_lists_by_owner(&self, owner_id: &str) -> StoreResult<Vec<EntityVersion>>;

    /// Returns `(id, row_version)` of every todo under the given lists.
    fn search_todos_by_lists(&self, list_ids: &[String]) -> StoreResult<Vec<EntityVersion>>;

    /// Fetches full list rows. Unknown IDs are skipped.
    fn fetch_lists(&self, ids: &[String]) -> StoreResult<Vec<ListRow>>;

    /// Fetches full todo rows. Unknown IDs are skipped.
    fn fetch_todos(&self, ids: &[String]) -> StoreResult<Vec<TodoRow>>;

    /// Returns the largest `sort` among the todos of a list.
    fn max_todo_sort(&self, list_id: &str) -> StoreResult<Option<i64>>;
}

/// Write access to synchronized entities, used by domain mutators.
pub trait EntityWriter {
    /// Allocates the next row version from the store-wide sequence.
    fn next_row_version(&mut self) -> StoreResult<u64>;

    /// Inserts or replaces a list.
    fn put_list(&mut self, row: &ListRow) -> StoreResult<()>;

    /// Deletes a list. Returns false if it did not exist.
    fn delete_list(&mut self, id: &str) -> StoreResult<bool>;

    /// Inserts or replaces a todo.
    fn put_todo(&mut self, row: &TodoRow) -> StoreResult<()>;

    /// Deletes a todo. Returns false if it did not exist.
    fn delete_todo(&mut self, id: &str) -> StoreResult<bool>;
}

/// A read-write storage transaction.
///
/// # Invariants
///
/// - Writes become visible to other transactions only after `commit`
/// - Dropping the transaction without committing discards every write
/// - Write transactions on one store are serialized
pub trait StoreTransaction: VersionStore + EntityRepository + EntityWriter {
    /// Commits all writes atomically.
    fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// A transactional store shared across request handlers.
///
/// # Implementors
///
/// - [`super::MemoryStore`] - For testing
/// - [`super::SqliteStore`] - For persistent storage
pub trait SyncStore: Send + Sync {
    /// Begins a new transaction.
    ///
    /// Blocks while another transaction is active.
    fn begin(&self) -> StoreResult<Box<dyn StoreTransaction + '_>>;
}
