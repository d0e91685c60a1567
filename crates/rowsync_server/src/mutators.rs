//! Domain mutators and the registry that dispatches to them.
//!
//! A mutator is looked up by the mutation's `name`, decodes its `args`, and
//! writes rows through the push transaction. Every write stamps a fresh row
//! version so the next pull sees the change.
//!
//! The default registry carries the list/todo mutators:
//!
//! | name | args |
//! |---|---|
//! | `createList` | [`List`] |
//! | `deleteList` | list ID |
//! | `createTodo` | [`Todo`] (server assigns `sort`) |
//! | `updateTodo` | [`TodoUpdate`] |
//! | `deleteTodo` | todo ID |

use crate::error::{MutationError, MutationResult};
use rowsync_protocol::{Collection, List, Mutation, Todo, TodoUpdate};
use rowsync_store::{now_millis, ListRow, StoreTransaction, TodoRow};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};

/// Entities touched by a mutation, used to decide whom to poke.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Affected {
    /// Lists whose contents changed.
    pub list_ids: BTreeSet<String>,
    /// Users whose visible lists changed.
    pub user_ids: BTreeSet<String>,
}

impl Affected {
    /// Affects the given list.
    pub fn list(id: impl Into<String>) -> Self {
        let mut affected = Self::default();
        affected.list_ids.insert(id.into());
        affected
    }

    /// Affects the given user.
    pub fn user(id: impl Into<String>) -> Self {
        let mut affected = Self::default();
        affected.user_ids.insert(id.into());
        affected
    }

    /// Merges another set into this one.
    pub fn extend(&mut self, other: Affected) {
        self.list_ids.extend(other.list_ids);
        self.user_ids.extend(other.user_ids);
    }

    /// Returns true if nothing was affected.
    pub fn is_empty(&self) -> bool {
        self.list_ids.is_empty() && self.user_ids.is_empty()
    }

    /// Returns the notification keys: `list/<id>` then `user/<id>`.
    pub fn keys(&self) -> Vec<String> {
        self.list_ids
            .iter()
            .map(|id| format!("list/{id}"))
            .chain(self.user_ids.iter().map(|id| format!("user/{id}")))
            .collect()
    }
}

type ApplyFn = Box<
    dyn Fn(&mut dyn StoreTransaction, &str, &serde_json::Value) -> MutationResult<Affected>
        + Send
        + Sync,
>;

/// Table of mutators keyed by mutation name.
pub struct MutatorRegistry {
    mutators: HashMap<String, ApplyFn>,
}

impl MutatorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            mutators: HashMap::new(),
        }
    }

    /// Creates a registry with the list/todo mutators.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register("createList", create_list)
            .register("deleteList", delete_list)
            .register("createTodo", create_todo)
            .register("updateTodo", update_todo)
            .register("deleteTodo", delete_todo);
        registry
    }

    /// Registers a mutator. `A` is the decoded argument type.
    ///
    /// A later registration under the same name replaces the earlier one.
    pub fn register<A, F>(&mut self, name: impl Into<String>, apply: F) -> &mut Self
    where
        A: DeserializeOwned,
        F: Fn(&mut dyn StoreTransaction, &str, A) -> MutationResult<Affected>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        let label = name.clone();
        let apply_fn: ApplyFn = Box::new(
            move |txn: &mut dyn StoreTransaction, user_id: &str, args: &serde_json::Value| {
                let args = A::deserialize(args).map_err(|source| {
                    MutationError::InvalidArguments {
                        name: label.clone(),
                        source,
                    }
                })?;
                apply(txn, user_id, args)
            },
        );
        self.mutators.insert(name, apply_fn);
        self
    }

    /// Returns true if a mutator is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.mutators.contains_key(name)
    }

    /// Returns the registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.mutators.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Runs the mutator named by `mutation` inside `txn`.
    pub fn apply(
        &self,
        txn: &mut dyn StoreTransaction,
        user_id: &str,
        mutation: &Mutation,
    ) -> MutationResult<Affected> {
        let apply = self
            .mutators
            .get(&mutation.name)
            .ok_or_else(|| MutationError::UnknownMutation(mutation.name.clone()))?;
        apply(txn, user_id, &mutation.args)
    }
}

impl Default for MutatorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for MutatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutatorRegistry")
            .field("mutators", &self.names())
            .finish()
    }
}

/// A bare entity ID, as sent by the delete mutations.
#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct EntityId(String);

fn must_get_list(txn: &dyn StoreTransaction, id: &str) -> MutationResult<ListRow> {
    txn.fetch_lists(&[id.to_string()])?
        .into_iter()
        .next()
        .ok_or_else(|| MutationError::NotFound {
            collection: Collection::List,
            id: id.to_string(),
        })
}

fn must_get_todo(txn: &dyn StoreTransaction, id: &str) -> MutationResult<TodoRow> {
    txn.fetch_todos(&[id.to_string()])?
        .into_iter()
        .next()
        .ok_or_else(|| MutationError::NotFound {
            collection: Collection::Todo,
            id: id.to_string(),
        })
}

/// Loads a list and checks that `user_id` owns it.
fn require_access_to_list(
    txn: &dyn StoreTransaction,
    list_id: &str,
    user_id: &str,
) -> MutationResult<ListRow> {
    let row = must_get_list(txn, list_id)?;
    if row.list.owner_id != user_id {
        return Err(MutationError::forbidden(format!(
            "user {user_id} cannot access list {list_id}"
        )));
    }
    Ok(row)
}

fn create_list(txn: &mut dyn StoreTransaction, user_id: &str, list: List) -> MutationResult<Affected> {
    if list.owner_id != user_id {
        return Err(MutationError::forbidden(
            "cannot create list for other user",
        ));
    }
    if !txn.fetch_lists(&[list.id.clone()])?.is_empty() {
        return Err(MutationError::AlreadyExists {
            collection: Collection::List,
            id: list.id,
        });
    }
    let row_version = txn.next_row_version()?;
    let owner = list.owner_id.clone();
    txn.put_list(&ListRow {
        list,
        row_version,
        last_modified: now_millis(),
    })?;
    Ok(Affected::user(owner))
}

fn delete_list(
    txn: &mut dyn StoreTransaction,
    user_id: &str,
    EntityId(list_id): EntityId,
) -> MutationResult<Affected> {
    let row = require_access_to_list(&*txn, &list_id, user_id)?;
    // Children go in the same transaction so no pull can observe orphans.
    for todo in txn.search_todos_by_lists(&[list_id.clone()])? {
        txn.delete_todo(&todo.id)?;
    }
    txn.delete_list(&list_id)?;
    let mut affected = Affected::user(row.list.owner_id);
    affected.list_ids.insert(list_id);
    Ok(affected)
}

fn create_todo(txn: &mut dyn StoreTransaction, user_id: &str, mut todo: Todo) -> MutationResult<Affected> {
    require_access_to_list(&*txn, &todo.list_id, user_id)?;
    if !txn.fetch_todos(&[todo.id.clone()])?.is_empty() {
        return Err(MutationError::AlreadyExists {
            collection: Collection::Todo,
            id: todo.id,
        });
    }
    todo.sort = txn
        .max_todo_sort(&todo.list_id)?
        .unwrap_or(0)
        .checked_add(1)
        .ok_or_else(|| {
            MutationError::OutOfRange(format!("no sort position left in list {}", todo.list_id))
        })?;
    let row_version = txn.next_row_version()?;
    let list_id = todo.list_id.clone();
    txn.put_todo(&TodoRow {
        todo,
        row_version,
        last_modified: now_millis(),
    })?;
    Ok(Affected::list(list_id))
}

fn update_todo(
    txn: &mut dyn StoreTransaction,
    user_id: &str,
    update: TodoUpdate,
) -> MutationResult<Affected> {
    let mut row = must_get_todo(&*txn, &update.id)?;
    require_access_to_list(&*txn, &row.todo.list_id, user_id)?;
    update.apply_to(&mut row.todo);
    row.row_version = txn.next_row_version()?;
    txn.put_todo(&row)?;
    Ok(Affected::list(row.todo.list_id))
}

fn delete_todo(
    txn: &mut dyn StoreTransaction,
    user_id: &str,
    EntityId(todo_id): EntityId,
) -> MutationResult<Affected> {
    let row = must_get_todo(&*txn, &todo_id)?;
    require_access_to_list(&*txn, &row.todo.list_id, user_id)?;
    txn.delete_todo(&todo_id)?;
    Ok(Affected::list(row.todo.list_id))
}
