//! Pull processing: computes the minimal patch since the client's cookie.
//!
//! The cookie's `order` names the [`ClientViewRecord`] the client holds. The
//! processor rebuilds the record from storage, diffs the two, and returns
//! only the rows that changed. If the base record is unknown (no cookie, or
//! evicted from the cache) the patch starts with `clear` and carries every
//! visible row.

use crate::cache::{CvrCache, CvrKey};
use crate::cvr::{ClientViewRecord, CvrDiff};
use crate::error::{ServerError, ServerResult};
use rowsync_protocol::{Collection, Cookie, PatchKey, PatchOperation, PullResponse};
use rowsync_store::{CvrVersion, ListRow, SyncStore, TodoRow};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Computes pull responses.
pub struct PullProcessor {
    store: Arc<dyn SyncStore>,
    cache: Arc<dyn CvrCache>,
}

impl PullProcessor {
    /// Creates a new pull processor.
    pub fn new(store: Arc<dyn SyncStore>, cache: Arc<dyn CvrCache>) -> Self {
        Self { store, cache }
    }

    /// Returns the CVR cache used by this processor.
    pub fn cache(&self) -> &Arc<dyn CvrCache> {
        &self.cache
    }

    /// Pulls changes for `client_group_id` as seen by `user_id`.
    ///
    /// A cookie issued to a different client group is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ServerError::Storage`] on storage failure. Nothing is
    /// committed or cached in that case, and the same request may be retried.
    /// Returns [`crate::ServerError::Internal`] if the group's cookie order
    /// has reached its storable maximum.
    pub fn pull(
        &self,
        client_group_id: &str,
        cookie: Option<&Cookie>,
        user_id: &str,
    ) -> ServerResult<PullResponse> {
        let cookie = cookie.filter(|c| c.client_group_id == client_group_id);
        let base = cookie.and_then(|c| self.cache.get(&CvrKey::new(client_group_id, c.order)));
        let base_client_version = base.as_ref().map_or(0, |cvr| cvr.client_version);

        let mut txn = self.store.begin()?;

        let mut group = txn.client_group_or_default(client_group_id)?;
        let last_mutation_id_changes: BTreeMap<String, u64> = txn
            .search_clients(client_group_id, base_client_version)?
            .into_iter()
            .map(|client| (client.id, client.last_mutation_id))
            .collect();

        let lists = txn.search_lists_by_owner(user_id)?;
        let list_ids: Vec<String> = lists.iter().map(|l| l.id.clone()).collect();
        let todos = txn.search_todos_by_lists(&list_ids)?;
        let next = ClientViewRecord::from_search(&lists, &todos, group.client_group_version);

        let empty = ClientViewRecord::default();
        let diff = next.diff(base.as_deref().unwrap_or(&empty));

        let order = group
            .cvr_version
            .next(cookie.map(|c| c.order))
            .ok_or_else(|| {
                ServerError::Internal(format!(
                    "cookie order space exhausted for client group {client_group_id}"
                ))
            })?;
        group.cvr_version = CvrVersion::Initialized(order);
        txn.put_client_group(&group)?;

        let list_rows = txn.fetch_lists(&diff.lists.puts)?;
        let todo_rows = txn.fetch_todos(&diff.todos.puts)?;
        txn.commit()?;

        let patch = build_patch(base.is_none(), &diff, &list_rows, &todo_rows)?;

        debug!(
            client_group = client_group_id,
            order,
            base_known = base.is_some(),
            patch_len = patch.len(),
            clients_changed = last_mutation_id_changes.len(),
            "pull computed"
        );

        self.cache.set(CvrKey::new(client_group_id, order), next);

        Ok(PullResponse::new(
            Cookie::new(client_group_id, order),
            last_mutation_id_changes,
            patch,
        ))
    }
}

impl std::fmt::Debug for PullProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PullProcessor")
            .field("cached_cvrs", &self.cache.len())
            .finish_non_exhaustive()
    }
}

/// Assembles a patch from a diff and the fetched put rows.
///
/// Order: `clear` (if `reset`), list dels, list puts, todo dels, todo puts.
/// Within a section IDs are ascending. Put IDs whose row was not fetched are
/// skipped.
pub fn build_patch(
    reset: bool,
    diff: &CvrDiff,
    lists: &[ListRow],
    todos: &[TodoRow],
) -> ServerResult<Vec<PatchOperation>> {
    let lists: BTreeMap<&str, &ListRow> = lists.iter().map(|r| (r.list.id.as_str(), r)).collect();
    let todos: BTreeMap<&str, &TodoRow> = todos.iter().map(|r| (r.todo.id.as_str(), r)).collect();

    let mut patch = Vec::with_capacity(
        usize::from(reset)
            + diff.lists.puts.len()
            + diff.lists.dels.len()
            + diff.todos.puts.len()
            + diff.todos.dels.len(),
    );
    if reset {
        patch.push(PatchOperation::Clear);
    }

    for id in &diff.lists.dels {
        patch.push(PatchOperation::del(PatchKey::new(Collection::List, id.clone())));
    }
    for row in diff.lists.puts.iter().filter_map(|id| lists.get(id.as_str())) {
        patch.push(PatchOperation::put(
            PatchKey::new(Collection::List, row.list.id.clone()),
            &row.list,
        )?);
    }

    for id in &diff.todos.dels {
        patch.push(PatchOperation::del(PatchKey::new(Collection::Todo, id.clone())));
    }
    for row in diff.todos.puts.iter().filter_map(|id| todos.get(id.as_str())) {
        patch.push(PatchOperation::put(
            PatchKey::new(Collection::Todo, row.todo.id.clone()),
            &row.todo,
        )?);
    }

    Ok(patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCvrCache;
    use crate::mutators::MutatorRegistry;
    use crate::push::PushProcessor;
    use rowsync_protocol::{List, Mutation, Todo};
    use rowsync_store::MemoryStore;
    use serde_json::json;

    struct Fixture {
        push: PushProcessor,
        pull: PullProcessor,
    }

    fn fixture() -> Fixture {
        let store: Arc<dyn SyncStore> = Arc::new(MemoryStore::new());
        Fixture {
            push: PushProcessor::new(store.clone(), Arc::new(MutatorRegistry::with_defaults())),
            pull: PullProcessor::new(store, Arc::new(MemoryCvrCache::new())),
        }
    }

    fn keys(patch: &[PatchOperation]) -> Vec<String> {
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
    fn first_pull_clears_and_puts_everything() {
        let f = fixture();
        f.push
            .apply("g1", "u1", &Mutation::new(1, "c1", "createList", json!({"id": "L1", "ownerID": "u1", "name": "Work"})))
            .unwrap();

        let resp = f.pull.pull("g1", None, "u1").unwrap();
        assert_eq!(keys(&resp.patch), vec!["clear", "put list/L1"]);
        assert_eq!(resp.cookie, Cookie::new("g1", 1));
        assert_eq!(resp.last_mutation_id_changes.get("c1"), Some(&1));
    }

    #[test]
    fn repeat_pull_is_empty_and_advances_order() {
        let f = fixture();
        let first = f.pull.pull("g1", None, "u1").unwrap();
        let second = f.pull.pull("g1", Some(&first.cookie), "u1").unwrap();
        assert!(second.patch.is_empty());
        assert!(second.last_mutation_id_changes.is_empty());
        assert_eq!(second.cookie.order, first.cookie.order + 1);
    }

    #[test]
    fn foreign_cookie_is_ignored() {
        let f = fixture();
        let first = f.pull.pull("g1", None, "u1").unwrap();
        let resp = f.pull.pull("g2", Some(&first.cookie), "u1").unwrap();
        assert_eq!(keys(&resp.patch), vec!["clear"]);
        assert_eq!(resp.cookie, Cookie::new("g2", 1));
    }

    #[test]
    fn unknown_group_seeds_order_from_cookie() {
        let f = fixture();
        let resp = f.pull.pull("g1", Some(&Cookie::new("g1", 41)), "u1").unwrap();
        assert_eq!(resp.cookie.order, 42);
        assert_eq!(resp.patch.first(), Some(&PatchOperation::Clear));
    }

    #[test]
    fn oversized_cookie_order_is_treated_as_absent() {
        let f = fixture();
        let resp = f.pull.pull("g1", Some(&Cookie::new("g1", u64::MAX)), "u1").unwrap();
        assert_eq!(resp.cookie, Cookie::new("g1", 1));
        assert_eq!(keys(&resp.patch), vec!["clear"]);

        let again = f.pull.pull("g1", Some(&resp.cookie), "u1").unwrap();
        assert!(again.patch.is_empty());
        assert_eq!(again.cookie.order, 2);
    }

    #[test]
    fn build_patch_orders_sections() {
        let mut diff = CvrDiff::default();
        diff.lists.dels = vec!["L0".into()];
        diff.lists.puts = vec!["L1".into()];
        diff.todos.dels = vec!["T0".into()];
        diff.todos.puts = vec!["T1".into(), "T2".into()];
        let lists = vec![ListRow {
            list: List { id: "L1".into(), owner_id: "u1".into(), name: "n".into() },
            row_version: 1,
            last_modified: 0,
        }];
        let todo = |id: &str| TodoRow {
            todo: Todo { id: id.into(), list_id: "L1".into(), text: "t".into(), complete: false, sort: 1 },
            row_version: 2,
            last_modified: 0,
        };
        // Fetched out of order; output is still by ID.
        let todos = vec![todo("T2"), todo("T1")];

        let patch = build_patch(true, &diff, &lists, &todos).unwrap();
        assert_eq!(
            keys(&patch),
            vec!["clear", "del list/L0", "put list/L1", "del todo/T0", "put todo/T1", "put todo/T2"]
        );
    }
}
