//! SQLite store for persistent servers.

use crate::backend::{EntityRepository, EntityWriter, StoreTransaction, SyncStore, VersionStore};
use crate::error::{StoreError, StoreResult};
use crate::records::{
    now_millis, ClientGroupRecord, ClientRecord, CvrVersion, EntityVersion, ListRow, StoreStats,
    TodoRow,
};
use parking_lot::{Mutex, MutexGuard};
use rowsync_protocol::{List, Todo};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS client_group (
        id TEXT PRIMARY KEY,
        cvr_version INTEGER,
        client_group_version INTEGER NOT NULL,
        last_modified INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS client (
        id TEXT PRIMARY KEY,
        client_group_id TEXT NOT NULL,
        last_mutation_id INTEGER NOT NULL,
        client_version INTEGER NOT NULL,
        last_modified INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS client_by_group ON client (client_group_id, client_version);

    CREATE TABLE IF NOT EXISTS list (
        id TEXT PRIMARY KEY,
        owner_id TEXT NOT NULL,
        name TEXT NOT NULL,
        row_version INTEGER NOT NULL,
        last_modified INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS list_by_owner ON list (owner_id);

    CREATE TABLE IF NOT EXISTS todo (
        id TEXT PRIMARY KEY,
        list_id TEXT NOT NULL,
        text TEXT NOT NULL,
        complete INTEGER NOT NULL,
        sort INTEGER NOT NULL,
        row_version INTEGER NOT NULL,
        last_modified INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS todo_by_list ON todo (list_id);
";

const ROW_VERSION_KEY: &str = "row_version";

/// A store backed by a single SQLite database.
///
/// # Transactions
///
/// Each transaction runs as `BEGIN IMMEDIATE` on the store's connection,
/// which is held exclusively until commit or drop. Dropping an uncommitted
/// transaction issues `ROLLBACK`.
///
/// # Example
///
/// ```no_run
/// use rowsync_store::{SqliteStore, SyncStore};
/// use std::path::Path;
///
/// let store = SqliteStore::open(Path::new("rowsync.db")).unwrap();
/// let txn = store.begin().unwrap();
/// ```
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) a store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the schema cannot
    /// be created.
    pub fn open(path: &Path) -> StoreResult<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Opens an in-memory store.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Counts stored rows.
    pub fn stats(&self) -> StoreResult<StoreStats> {
        let conn = self.conn.lock();
        let count = |table: &str| -> StoreResult<u64> {
            let sql = format!("SELECT COUNT(*) FROM {table}");
            Ok(conn.query_row(&sql, [], |row| read_u64(row, 0))?)
        };
        let row_version = conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![ROW_VERSION_KEY],
                |row| read_u64(row, 0),
            )
            .optional()?
            .unwrap_or(0);
        Ok(StoreStats {
            client_groups: count("client_group")?,
            clients: count("client")?,
            lists: count("list")?,
            todos: count("todo")?,
            row_version,
        })
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl SyncStore for SqliteStore {
    fn begin(&self) -> StoreResult<Box<dyn StoreTransaction + '_>> {
        let conn = self.conn.lock();
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Box::new(SqliteTransaction {
            conn,
            finished: false,
        }))
    }
}

/// A transaction on a [`SqliteStore`].
struct SqliteTransaction<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            // Nothing useful to do if rollback fails; the connection aborts
            // the transaction on its next BEGIN anyway.
            let _ = self.conn.execute_batch("ROLLBACK");
        }
    }
}

/// Upper bound on `?` parameters bound by one `IN (...)` query. Well under
/// SQLite's host parameter limit (999 before 3.32, 32766 since).
const MAX_BOUND_IDS: usize = 500;

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn read_u64(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let value: i64 = row.get(idx)?;
    u64::try_from(value).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, value))
}

fn to_i64(value: u64) -> StoreResult<i64> {
    i64::try_from(value).map_err(|_| StoreError::corrupted(format!("value {value} exceeds i64")))
}

fn client_from_row(row: &Row<'_>) -> rusqlite::Result<ClientRecord> {
    Ok(ClientRecord {
        id: row.get(0)?,
        client_group_id: row.get(1)?,
        last_mutation_id: read_u64(row, 2)?,
        client_version: read_u64(row, 3)?,
        last_modified: read_u64(row, 4)?,
    })
}

fn list_from_row(row: &Row<'_>) -> rusqlite::Result<ListRow> {
    Ok(ListRow {
        list: List {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            name: row.get(2)?,
        },
        row_version: read_u64(row, 3)?,
        last_modified: read_u64(row, 4)?,
    })
}

fn todo_from_row(row: &Row<'_>) -> rusqlite::Result<TodoRow> {
    Ok(TodoRow {
        todo: Todo {
            id: row.get(0)?,
            list_id: row.get(1)?,
            text: row.get(2)?,
            complete: row.get(3)?,
            sort: row.get(4)?,
        },
        row_version: read_u64(row, 5)?,
        last_modified: read_u64(row, 6)?,
    })
}

fn version_from_row(row: &Row<'_>) -> rusqlite::Result<EntityVersion> {
    Ok(EntityVersion {
        id: row.get(0)?,
        row_version: read_u64(row, 1)?,
    })
}

impl SqliteTransaction<'_> {
    /// Runs `{sql_prefix} (?, ?, ...)` over `ids` in batches of at most
    /// [`MAX_BOUND_IDS`] parameters, returning rows sorted and deduplicated
    /// by `id_of`.
    fn query_by_ids<T>(
        &self,
        sql_prefix: &str,
        ids: &[String],
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
        id_of: fn(&T) -> &str,
    ) -> StoreResult<Vec<T>> {
        let mut out = Vec::new();
        for chunk in ids.chunks(MAX_BOUND_IDS) {
            let sql = format!("{sql_prefix} ({})", placeholders(chunk.len()));
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), map)?;
            for row in rows {
                out.push(row?);
            }
        }
        out.sort_by(|a, b| id_of(a).cmp(id_of(b)));
        out.dedup_by(|a, b| id_of(a) == id_of(b));
        Ok(out)
    }
}

impl VersionStore for SqliteTransaction<'_> {
    fn get_client_group(&self, id: &str) -> StoreResult<Option<ClientGroupRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT id, cvr_version, client_group_version, last_modified
                 FROM client_group WHERE id = ?1",
                params![id],
                |row| {
                    let cvr_version: Option<i64> = row.get(1)?;
                    let cvr_version = cvr_version
                        .map(|v| {
                            u64::try_from(v)
                                .map_err(|_| rusqlite::Error::IntegralValueOutOfRange(1, v))
                        })
                        .transpose()?;
                    Ok(ClientGroupRecord {
                        id: row.get(0)?,
                        cvr_version: CvrVersion::from(cvr_version),
                        client_group_version: read_u64(row, 2)?,
                        last_modified: read_u64(row, 3)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    fn put_client_group(&mut self, record: &ClientGroupRecord) -> StoreResult<()> {
        let cvr_version = record.cvr_version.get().map(to_i64).transpose()?;
        self.conn.execute(
            "INSERT INTO client_group (id, cvr_version, client_group_version, last_modified)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                cvr_version = excluded.cvr_version,
                client_group_version = excluded.client_group_version,
                last_modified = excluded.last_modified",
            params![
                record.id,
                cvr_version,
                to_i64(record.client_group_version)?,
                to_i64(now_millis())?,
            ],
        )?;
        Ok(())
    }

    fn get_client(&self, id: &str) -> StoreResult<Option<ClientRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT id, client_group_id, last_mutation_id, client_version, last_modified
                 FROM client WHERE id = ?1",
                params![id],
                client_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn put_client(&mut self, record: &ClientRecord) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO client (id, client_group_id, last_mutation_id, client_version, last_modified)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                last_mutation_id = excluded.last_mutation_id,
                client_version = excluded.client_version,
                last_modified = excluded.last_modified",
            params![
                record.id,
                record.client_group_id,
                to_i64(record.last_mutation_id)?,
                to_i64(record.client_version)?,
                to_i64(now_millis())?,
            ],
        )?;
        Ok(())
    }

    fn search_clients(
        &self,
        client_group_id: &str,
        since_client_version: u64,
    ) -> StoreResult<Vec<ClientRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, client_group_id, last_mutation_id, client_version, last_modified
             FROM client WHERE client_group_id = ?1 AND client_version > ?2 ORDER BY id",
        )?;
        let rows = stmt.query_map(
            params![client_group_id, to_i64(since_client_version)?],
            client_from_row,
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

impl EntityRepository for SqliteTransaction<'_> {
    fn search_lists_by_owner(&self, owner_id: &str) -> StoreResult<Vec<EntityVersion>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, row_version FROM list WHERE owner_id = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![owner_id], version_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn search_todos_by_lists(&self, list_ids: &[String]) -> StoreResult<Vec<EntityVersion>> {
        self.query_by_ids(
            "SELECT id, row_version FROM todo WHERE list_id IN",
            list_ids,
            version_from_row,
            |v| v.id.as_str(),
        )
    }

    fn fetch_lists(&self, ids: &[String]) -> StoreResult<Vec<ListRow>> {
        self.query_by_ids(
            "SELECT id, owner_id, name, row_version, last_modified FROM list WHERE id IN",
            ids,
            list_from_row,
            |r| r.list.id.as_str(),
        )
    }

    fn fetch_todos(&self, ids: &[String]) -> StoreResult<Vec<TodoRow>> {
        self.query_by_ids(
            "SELECT id, list_id, text, complete, sort, row_version, last_modified FROM todo WHERE id IN",
            ids,
            todo_from_row,
            |r| r.todo.id.as_str(),
        )
    }

    fn max_todo_sort(&self, list_id: &str) -> StoreResult<Option<i64>> {
        let max = self.conn.query_row(
            "SELECT MAX(sort) FROM todo WHERE list_id = ?1",
            params![list_id],
            |row| row.get::<_, Option<i64>>(0),
        )?;
        Ok(max)
    }
}

impl EntityWriter for SqliteTransaction<'_> {
    fn next_row_version(&mut self) -> StoreResult<u64> {
        let next: i64 = self.conn.query_row(
            "INSERT INTO meta (key, value) VALUES (?1, 1)
             ON CONFLICT(key) DO UPDATE SET value = value + 1
             RETURNING value",
            params![ROW_VERSION_KEY],
            |row| row.get(0),
        )?;
        u64::try_from(next).map_err(|_| StoreError::corrupted("negative row version sequence"))
    }

    fn put_list(&mut self, row: &ListRow) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO list (id, owner_id, name, row_version, last_modified)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                owner_id = excluded.owner_id,
                name = excluded.name,
                row_version = excluded.row_version,
                last_modified = excluded.last_modified",
            params![
                row.list.id,
                row.list.owner_id,
                row.list.name,
                to_i64(row.row_version)?,
                to_i64(now_millis())?,
            ],
        )?;
        Ok(())
    }

    fn delete_list(&mut self, id: &str) -> StoreResult<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM list WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    fn put_todo(&mut self, row: &TodoRow) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO todo (id, list_id, text, complete, sort, row_version, last_modified)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                list_id = excluded.list_id,
                text = excluded.text,
                complete = excluded.complete,
                sort = excluded.sort,
                row_version = excluded.row_version,
                last_modified = excluded.last_modified",
            params![
                row.todo.id,
                row.todo.list_id,
                row.todo.text,
                row.todo.complete,
                row.todo.sort,
                to_i64(row.row_version)?,
                to_i64(now_millis())?,
            ],
        )?;
        Ok(())
    }

    fn delete_todo(&mut self, id: &str) -> StoreResult<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM todo WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }
}

impl StoreTransaction for SqliteTransaction<'_> {
    fn commit(mut self: Box<Self>) -> StoreResult<()> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        Ok(())
    }
}
