//! Property-based test generators using proptest.
//!
//! Provides strategies for client view records and for scripts of domain
//! operations that a [`crate::Replica`] can replay against a server.

use proptest::prelude::*;
use rowsync_server::{ClientViewRecord, VersionMap};
use serde_json::{json, Value};

/// Strategy for entity IDs drawn from a small pool, so maps overlap.
pub fn entity_id_strategy() -> impl Strategy<Value = String> {
    (0u8..24).prop_map(|n| format!("e{n:02}"))
}

/// Strategy for version maps with up to `max_len` entries.
pub fn version_map_strategy(max_len: usize) -> impl Strategy<Value = VersionMap> {
    prop::collection::btree_map(entity_id_strategy(), 1u64..1_000, 0..=max_len)
}

/// Strategy for client view records.
pub fn cvr_strategy() -> impl Strategy<Value = ClientViewRecord> {
    (version_map_strategy(12), version_map_strategy(12), 0u64..1_000).prop_map(
        |(lists, todos, client_version)| ClientViewRecord {
            lists,
            todos,
            client_version,
        },
    )
}

/// What happens to one entry of a base map on its way to the next map.
#[derive(Debug, Clone, Copy)]
enum Evolution {
    Keep,
    Bump(u64),
    Drop,
}

fn evolve(base: &VersionMap, evolutions: &[Evolution], added: &VersionMap) -> VersionMap {
    let mut next = VersionMap::new();
    for ((id, version), evolution) in base.iter().zip(evolutions.iter().cycle()) {
        match evolution {
            Evolution::Keep => {
                next.insert(id.clone(), *version);
            }
            Evolution::Bump(by) => {
                next.insert(id.clone(), version + by);
            }
            Evolution::Drop => {}
        }
    }
    for (id, version) in added {
        // Row versions never go backwards for an ID that was kept.
        next.entry(id.clone()).or_insert(*version + 1_000);
    }
    next
}

/// Strategy for a `(base, next)` pair where `next` is a plausible successor
/// of `base`: entries are kept, bumped, or dropped, and new ones appear.
/// Versions never decrease.
pub fn version_map_pair_strategy() -> impl Strategy<Value = (VersionMap, VersionMap)> {
    let evolution = prop_oneof![
        3 => Just(Evolution::Keep),
        2 => (1u64..10).prop_map(Evolution::Bump),
        1 => Just(Evolution::Drop),
    ];
    (
        version_map_strategy(16),
        prop::collection::vec(evolution, 1..16),
        version_map_strategy(4),
    )
        .prop_map(|(base, evolutions, added)| {
            let next = evolve(&base, &evolutions, &added);
            (base, next)
        })
}

/// A user-level operation on the list/todo domain.
#[derive(Debug, Clone)]
pub enum TodoOp {
    /// Create list `L{n}`.
    CreateList(u8),
    /// Delete list `L{n}`.
    DeleteList(u8),
    /// Create todo `T{todo}` in list `L{list}`.
    CreateTodo {
        /// Todo number.
        todo: u8,
        /// List number.
        list: u8,
    },
    /// Toggle completion of todo `T{n}`.
    Toggle(u8, bool),
    /// Delete todo `T{n}`.
    DeleteTodo(u8),
}

impl TodoOp {
    /// Returns the mutator name and arguments for this operation by `user_id`.
    ///
    /// Operations may name entities that do not exist; the server rejects
    /// those, which exercises the failure path.
    pub fn to_mutation(&self, user_id: &str) -> (&'static str, Value) {
        match self {
            TodoOp::CreateList(n) => (
                "createList",
                json!({"id": format!("L{n}"), "ownerID": user_id, "name": format!("list {n}")}),
            ),
            TodoOp::DeleteList(n) => ("deleteList", json!(format!("L{n}"))),
            TodoOp::CreateTodo { todo, list } => (
                "createTodo",
                json!({
                    "id": format!("T{todo}"),
                    "listID": format!("L{list}"),
                    "text": format!("todo {todo}"),
                    "complete": false,
                }),
            ),
            TodoOp::Toggle(n, complete) => (
                "updateTodo",
                json!({"id": format!("T{n}"), "complete": complete}),
            ),
            TodoOp::DeleteTodo(n) => ("deleteTodo", json!(format!("T{n}"))),
        }
    }
}

/// Strategy for one domain operation over a small ID space.
pub fn todo_op_strategy() -> impl Strategy<Value = TodoOp> {
    prop_oneof![
        2 => (0u8..4).prop_map(TodoOp::CreateList),
        1 => (0u8..4).prop_map(TodoOp::DeleteList),
        4 => (0u8..8, 0u8..4).prop_map(|(todo, list)| TodoOp::CreateTodo { todo, list }),
        2 => (0u8..8, any::<bool>()).prop_map(|(n, c)| TodoOp::Toggle(n, c)),
        1 => (0u8..8).prop_map(TodoOp::DeleteTodo),
    ]
}

/// Strategy for a script of domain operations.
pub fn todo_script_strategy(min_ops: usize, max_ops: usize) -> impl Strategy<Value = Vec<TodoOp>> {
    prop::collection::vec(todo_op_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn pair_versions_never_decrease((base, next) in version_map_pair_strategy()) {
            for (id, version) in &next {
                if let Some(prev) = base.get(id) {
                    prop_assert!(version >= prev);
                }
            }
        }

        #[test]
        fn ops_produce_known_mutators(op in todo_op_strategy()) {
            let (name, args) = op.to_mutation("u1");
            prop_assert!(rowsync_server::MutatorRegistry::with_defaults().contains(name));
            prop_assert!(args.is_object() || args.is_string());
        }
    }
}
