//! Client view records and the diff that turns them into patches.
//!
//! A [`ClientViewRecord`] is what the server believes a client group holds
//! after a pull: for each collection, a map from entity ID to the row
//! version the client received. The next pull builds a fresh record from
//! storage and diffs it against the one named by the client's cookie:
//!
//! - **put**: the ID is new, or its row version is greater than the base's
//! - **del**: the ID is in the base but no longer visible
//! - equal versions are unchanged and omitted
//!
//! Row versions only grow, so "greater" is the only change that matters.

use rowsync_protocol::Collection;
use rowsync_store::EntityVersion;
use std::collections::BTreeMap;

/// Entity ID to row version.
pub type VersionMap = BTreeMap<String, u64>;

/// Snapshot of what a client group holds as of one pull.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientViewRecord {
    /// Visible lists.
    pub lists: VersionMap,
    /// Visible todos.
    pub todos: VersionMap,
    /// Client group version at the time of the snapshot.
    pub client_version: u64,
}

impl ClientViewRecord {
    /// Builds a record from storage search results.
    pub fn from_search(
        lists: &[EntityVersion],
        todos: &[EntityVersion],
        client_version: u64,
    ) -> Self {
        Self {
            lists: to_version_map(lists),
            todos: to_version_map(todos),
            client_version,
        }
    }

    /// Returns the version map of one collection.
    pub fn collection(&self, collection: Collection) -> &VersionMap {
        match collection {
            Collection::List => &self.lists,
            Collection::Todo => &self.todos,
        }
    }

    /// Diffs this (next) record against the record the client holds.
    pub fn diff(&self, base: &ClientViewRecord) -> CvrDiff {
        CvrDiff {
            lists: CollectionDiff::between(&self.lists, &base.lists),
            todos: CollectionDiff::between(&self.todos, &base.todos),
        }
    }

    /// Returns the total number of entities in the record.
    pub fn len(&self) -> usize {
        self.lists.len() + self.todos.len()
    }

    /// Returns true if the record holds no entities.
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty() && self.todos.is_empty()
    }
}

fn to_version_map(results: &[EntityVersion]) -> VersionMap {
    results
        .iter()
        .map(|r| (r.id.clone(), r.row_version))
        .collect()
}

/// Changes to one collection, IDs in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionDiff {
    /// IDs to send in full.
    pub puts: Vec<String>,
    /// IDs the client must drop.
    pub dels: Vec<String>,
}

impl CollectionDiff {
    /// Computes the changes from `base` to `next`.
    pub fn between(next: &VersionMap, base: &VersionMap) -> Self {
        Self {
            puts: puts_since(next, base),
            dels: dels_since(next, base),
        }
    }

    /// Returns true if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.puts.is_empty() && self.dels.is_empty()
    }
}

/// Changes across all collections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CvrDiff {
    /// List changes.
    pub lists: CollectionDiff,
    /// Todo changes.
    pub todos: CollectionDiff,
}

impl CvrDiff {
    /// Returns the changes of one collection.
    pub fn collection(&self, collection: Collection) -> &CollectionDiff {
        match collection {
            Collection::List => &self.lists,
            Collection::Todo => &self.todos,
        }
    }

    /// Returns true if nothing changed in any collection.
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty() && self.todos.is_empty()
    }
}

/// IDs that are new in `next` or carry a greater row version than in `base`.
pub fn puts_since(next: &VersionMap, base: &VersionMap) -> Vec<String> {
    next.iter()
        .filter(|(id, version)| base.get(*id).map_or(true, |prev| prev < *version))
        .map(|(id, _)| id.clone())
        .collect()
}

/// IDs present in `base` but absent from `next`.
pub fn dels_since(next: &VersionMap, base: &VersionMap) -> Vec<String> {
    base.keys()
        .filter(|id| !next.contains_key(*id))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, u64)]) -> VersionMap {
        entries.iter().map(|(id, v)| (id.to_string(), *v)).collect()
    }

    #[test]
    fn new_ids_are_puts() {
        let next = map(&[("a", 1), ("b", 2)]);
        let diff = CollectionDiff::between(&next, &VersionMap::new());
        assert_eq!(diff.puts, vec!["a", "b"]);
        assert!(diff.dels.is_empty());
    }

    #[test]
    fn bumped_versions_are_puts_and_equal_ones_are_omitted() {
        let base = map(&[("a", 1), ("b", 2)]);
        let next = map(&[("a", 1), ("b", 5)]);
        let diff = CollectionDiff::between(&next, &base);
        assert_eq!(diff.puts, vec!["b"]);
        assert!(diff.dels.is_empty());
    }

    #[test]
    fn missing_ids_are_dels() {
        let base = map(&[("a", 1), ("b", 2), ("c", 3)]);
        let next = map(&[("b", 2)]);
        let diff = CollectionDiff::between(&next, &base);
        assert!(diff.puts.is_empty());
        assert_eq!(diff.dels, vec!["a", "c"]);
    }

    #[test]
    fn identical_records_diff_empty() {
        let cvr = ClientViewRecord {
            lists: map(&[("L1", 1)]),
            todos: map(&[("T1", 2)]),
            client_version: 4,
        };
        assert!(cvr.diff(&cvr.clone()).is_empty());
    }

    #[test]
    fn from_search_builds_maps() {
        let cvr = ClientViewRecord::from_search(
            &[EntityVersion::new("L1", 3)],
            &[EntityVersion::new("T1", 4), EntityVersion::new("T2", 5)],
            9,
        );
        assert_eq!(cvr.collection(Collection::List), &map(&[("L1", 3)]));
        assert_eq!(cvr.todos.len(), 2);
        assert_eq!(cvr.client_version, 9);
        assert_eq!(cvr.len(), 3);
    }
}
