//! Records persisted by the store.

use rowsync_protocol::{List, Todo};
use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current time in Unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Client view record numbering state of a client group.
///
/// A group is `Uninitialized` until its first pull.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CvrVersion {
    /// The group has never been pulled.
    #[default]
    Uninitialized,
    /// Order of the most recent client view record handed out.
    Initialized(u64),
}

impl CvrVersion {
    /// Largest cookie order an uninitialized group seeds from.
    ///
    /// Clients hold the order as a JSON number, which is exact only up to
    /// 2^53. Larger orders were never handed out and are treated as absent.
    pub const MAX_SEED_ORDER: u64 = (1 << 53) - 1;

    /// Largest order any backend can persist.
    pub const MAX_ORDER: u64 = i64::MAX as u64;

    /// Computes the order for the next pull.
    ///
    /// An uninitialized group seeds its numbering from the order of the
    /// cookie the client presented (or zero), so a client that outlived a
    /// server-side reset never sees its cookie order go backwards.
    ///
    /// Returns `None` once the order space is exhausted.
    pub fn next(self, cookie_order: Option<u64>) -> Option<u64> {
        let current = match self {
            CvrVersion::Uninitialized => cookie_order
                .filter(|order| *order <= Self::MAX_SEED_ORDER)
                .unwrap_or(0),
            CvrVersion::Initialized(order) => order,
        };
        current
            .checked_add(1)
            .filter(|order| *order <= Self::MAX_ORDER)
    }

    /// Returns the stored order, if any.
    pub fn get(self) -> Option<u64> {
        match self {
            CvrVersion::Uninitialized => None,
            CvrVersion::Initialized(order) => Some(order),
        }
    }
}

impl From<Option<u64>> for CvrVersion {
    fn from(value: Option<u64>) -> Self {
        value.map_or(CvrVersion::Uninitialized, CvrVersion::Initialized)
    }
}

/// Per-group version counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientGroupRecord {
    /// Client group ID.
    pub id: String,
    /// Incremented by every applied mutation from any member client.
    pub client_group_version: u64,
    /// Order of the last client view record.
    pub cvr_version: CvrVersion,
    /// Last write (Unix millis).
    pub last_modified: u64,
}

impl ClientGroupRecord {
    /// Creates a zero-valued record for a group that has not been seen yet.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            client_group_version: 0,
            cvr_version: CvrVersion::Uninitialized,
            last_modified: 0,
        }
    }
}

/// Per-client mutation bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    /// Client ID.
    pub id: String,
    /// Group the client belongs to.
    pub client_group_id: String,
    /// Highest applied mutation ID.
    pub last_mutation_id: u64,
    /// Group version stamped by this client's last applied mutation.
    pub client_version: u64,
    /// Last write (Unix millis).
    pub last_modified: u64,
}

impl ClientRecord {
    /// Creates a zero-valued record for a client that has not been seen yet.
    pub fn new(id: impl Into<String>, client_group_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            client_group_id: client_group_id.into(),
            last_mutation_id: 0,
            client_version: 0,
            last_modified: 0,
        }
    }
}

/// Search result: an entity ID with its current row version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct EntityVersion {
    /// Entity ID.
    pub id: String,
    /// Current row version.
    pub row_version: u64,
}

impl EntityVersion {
    /// Creates a new search result.
    pub fn new(id: impl Into<String>, row_version: u64) -> Self {
        Self {
            id: id.into(),
            row_version,
        }
    }
}

/// A stored list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRow {
    /// Payload sent to clients.
    pub list: List,
    /// Version stamped by the last write.
    pub row_version: u64,
    /// Last write (Unix millis).
    pub last_modified: u64,
}

impl ListRow {
    /// Returns the search result for this row.
    pub fn version(&self) -> EntityVersion {
        EntityVersion::new(self.list.id.clone(), self.row_version)
    }
}

/// A stored todo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoRow {
    /// Payload sent to clients.
    pub todo: Todo,
    /// Version stamped by the last write.
    pub row_version: u64,
    /// Last write (Unix millis).
    pub last_modified: u64,
}

impl TodoRow {
    /// Returns the search result for this row.
    pub fn version(&self) -> EntityVersion {
        EntityVersion::new(self.todo.id.clone(), self.row_version)
    }
}

/// Row counts of a store, for inspection tools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Known client groups.
    pub client_groups: u64,
    /// Known clients.
    pub clients: u64,
    /// Stored lists.
    pub lists: u64,
    /// Stored todos.
    pub todos: u64,
    /// Last row version handed out.
    pub row_version: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cvr_version_seeds_from_cookie() {
        assert_eq!(CvrVersion::Uninitialized.next(None), Some(1));
        assert_eq!(CvrVersion::Uninitialized.next(Some(7)), Some(8));
    }

    #[test]
    fn cvr_version_ignores_cookie_once_initialized() {
        assert_eq!(CvrVersion::Initialized(3).next(Some(40)), Some(4));
        assert_eq!(CvrVersion::Initialized(3).next(None), Some(4));
    }

    #[test]
    fn cvr_version_ignores_out_of_range_cookie() {
        assert_eq!(CvrVersion::Uninitialized.next(Some(u64::MAX)), Some(1));
        assert_eq!(
            CvrVersion::Uninitialized.next(Some(CvrVersion::MAX_SEED_ORDER + 1)),
            Some(1)
        );
        assert_eq!(
            CvrVersion::Uninitialized.next(Some(CvrVersion::MAX_SEED_ORDER)),
            Some(CvrVersion::MAX_SEED_ORDER + 1)
        );
    }

    #[test]
    fn cvr_version_stops_at_storable_maximum() {
        assert_eq!(CvrVersion::Initialized(CvrVersion::MAX_ORDER).next(None), None);
        assert_eq!(CvrVersion::Initialized(u64::MAX).next(None), None);
        assert_eq!(
            CvrVersion::Initialized(CvrVersion::MAX_ORDER - 1).next(None),
            Some(CvrVersion::MAX_ORDER)
        );
    }

    #[test]
    fn cvr_version_from_nullable() {
        assert_eq!(CvrVersion::from(None), CvrVersion::Uninitialized);
        assert_eq!(CvrVersion::from(Some(2)), CvrVersion::Initialized(2));
        assert_eq!(CvrVersion::Initialized(2).get(), Some(2));
    }

    #[test]
    fn defaults_are_zero() {
        let group = ClientGroupRecord::new("g");
        assert_eq!(group.client_group_version, 0);
        assert_eq!(group.cvr_version, CvrVersion::Uninitialized);

        let client = ClientRecord::new("c", "g");
        assert_eq!(client.last_mutation_id, 0);
        assert_eq!(client.client_version, 0);
    }
}
