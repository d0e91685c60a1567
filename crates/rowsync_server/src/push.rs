//! Push processing: applies one mutation at a time, exactly once.
//!
//! Each mutation runs in its own storage transaction:
//!
//! 1. Load the client group and client records (zero-valued if new)
//! 2. Compare the mutation ID with `last_mutation_id + 1`:
//!    - lower: already applied, commit nothing
//!    - higher: the client is ahead of the server, fail
//!    - equal: run the mutator
//! 3. Bump the group version, stamp it on the client, advance the client's
//!    last mutation ID
//! 4. Commit
//!
//! A mutator error aborts the transaction, so its writes and the counter
//! bump are discarded together.

use crate::error::{MutationError, ServerError, ServerResult};
use crate::mutators::{Affected, MutatorRegistry};
use rowsync_protocol::Mutation;
use rowsync_store::{ClientGroupRecord, ClientRecord, StoreTransaction, SyncStore};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of a push of one mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// The mutation ran and was committed.
    Applied(Affected),
    /// The mutation was applied by an earlier push; nothing changed.
    AlreadyApplied,
}

impl PushOutcome {
    /// Returns the affected entities. Empty for duplicates.
    pub fn affected(&self) -> Option<&Affected> {
        match self {
            PushOutcome::Applied(affected) => Some(affected),
            PushOutcome::AlreadyApplied => None,
        }
    }

    /// Returns true if this push changed state.
    pub fn is_applied(&self) -> bool {
        matches!(self, PushOutcome::Applied(_))
    }
}

/// What the version check decided for a mutation.
enum Disposition {
    Duplicate,
    Apply {
        group: ClientGroupRecord,
        client: ClientRecord,
    },
}

/// Applies mutations against a store.
pub struct PushProcessor {
    store: Arc<dyn SyncStore>,
    mutators: Arc<MutatorRegistry>,
}

impl PushProcessor {
    /// Creates a new push processor.
    pub fn new(store: Arc<dyn SyncStore>, mutators: Arc<MutatorRegistry>) -> Self {
        Self { store, mutators }
    }

    /// Applies one mutation on behalf of `user_id`.
    ///
    /// # Errors
    ///
    /// - [`ServerError::ClientGroupMismatch`] if the client belongs to another group
    /// - [`ServerError::FutureMutation`] if the mutation ID skips ahead
    /// - [`ServerError::Mutation`] if the mutator rejects it
    /// - [`ServerError::Storage`] on storage failure
    ///
    /// On any error nothing is committed.
    pub fn apply(
        &self,
        client_group_id: &str,
        user_id: &str,
        mutation: &Mutation,
    ) -> ServerResult<PushOutcome> {
        let mut txn = self.store.begin()?;
        let (mut group, mut client) = match check_mutation(txn.as_ref(), client_group_id, mutation)? {
            Disposition::Duplicate => {
                debug!(
                    client_group = client_group_id,
                    client = %mutation.client_id,
                    mutation_id = mutation.id,
                    "mutation already processed"
                );
                return Ok(PushOutcome::AlreadyApplied);
            }
            Disposition::Apply { group, client } => (group, client),
        };

        let affected = self
            .mutators
            .apply(txn.as_mut(), user_id, mutation)
            .map_err(|source| match source {
                MutationError::Storage(err) => ServerError::Storage(err),
                source => ServerError::Mutation {
                    client_id: mutation.client_id.clone(),
                    mutation_id: mutation.id,
                    name: mutation.name.clone(),
                    source,
                },
            })?;

        advance(txn.as_mut(), &mut group, &mut client)?;
        txn.commit()?;

        debug!(
            client_group = client_group_id,
            client = %mutation.client_id,
            mutation_id = mutation.id,
            client_version = client.client_version,
            name = %mutation.name,
            "mutation applied"
        );
        Ok(PushOutcome::Applied(affected))
    }

    /// Records a mutation as processed without running its mutator.
    ///
    /// Used after the mutator rejected it, so the client stops resending a
    /// mutation that can never succeed. Counters advance exactly as if it had
    /// been applied; duplicates and future IDs behave as in [`Self::apply`].
    pub fn apply_failed(&self, client_group_id: &str, mutation: &Mutation) -> ServerResult<PushOutcome> {
        let mut txn = self.store.begin()?;
        let (mut group, mut client) = match check_mutation(txn.as_ref(), client_group_id, mutation)? {
            Disposition::Duplicate => return Ok(PushOutcome::AlreadyApplied),
            Disposition::Apply { group, client } => (group, client),
        };

        advance(txn.as_mut(), &mut group, &mut client)?;
        txn.commit()?;

        warn!(
            client_group = client_group_id,
            client = %mutation.client_id,
            mutation_id = mutation.id,
            name = %mutation.name,
            "mutation skipped after failure"
        );
        Ok(PushOutcome::Applied(Affected::default()))
    }
}

impl std::fmt::Debug for PushProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushProcessor")
            .field("mutators", &self.mutators)
            .finish_non_exhaustive()
    }
}

fn check_mutation(
    txn: &dyn StoreTransaction,
    client_group_id: &str,
    mutation: &Mutation,
) -> ServerResult<Disposition> {
    let group = txn.client_group_or_default(client_group_id)?;
    let client = txn.client_or_default(&mutation.client_id, client_group_id)?;

    if client.client_group_id != client_group_id {
        return Err(ServerError::ClientGroupMismatch {
            client_id: client.id,
            existing: client.client_group_id,
            requested: client_group_id.to_string(),
        });
    }

    let expected = client.last_mutation_id + 1;
    if mutation.id < expected {
        return Ok(Disposition::Duplicate);
    }
    if mutation.id > expected {
        return Err(ServerError::FutureMutation {
            client_id: mutation.client_id.clone(),
            mutation_id: mutation.id,
            expected,
        });
    }
    Ok(Disposition::Apply { group, client })
}

fn advance(
    txn: &mut dyn StoreTransaction,
    group: &mut ClientGroupRecord,
    client: &mut ClientRecord,
) -> ServerResult<()> {
    group.client_group_version += 1;
    client.last_mutation_id += 1;
    client.client_version = group.client_group_version;
    txn.put_client_group(group)?;
    txn.put_client(client)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowsync_store::MemoryStore;
    use serde_json::json;

    fn processor() -> (Arc<MemoryStore>, PushProcessor) {
        let store = Arc::new(MemoryStore::new());
        let processor = PushProcessor::new(store.clone(), Arc::new(MutatorRegistry::with_defaults()));
        (store, processor)
    }

    fn create_list(id: u64, client: &str, list: &str) -> Mutation {
        Mutation::new(
            id,
            client,
            "createList",
            json!({"id": list, "ownerID": "u1", "name": list}),
        )
    }

    fn client(store: &MemoryStore, id: &str) -> ClientRecord {
        store.begin().unwrap().get_client(id).unwrap().unwrap()
    }

    #[test]
    fn applies_next_mutation_and_bumps_counters() {
        let (store, push) = processor();
        let outcome = push.apply("g1", "u1", &create_list(1, "c1", "L1")).unwrap();
        assert_eq!(outcome.affected().unwrap(), &Affected::user("u1"));

        let c1 = client(&store, "c1");
        assert_eq!(c1.last_mutation_id, 1);
        assert_eq!(c1.client_version, 1);
        let txn = store.begin().unwrap();
        assert_eq!(txn.get_client_group("g1").unwrap().unwrap().client_group_version, 1);
    }

    #[test]
    fn duplicate_is_a_no_op() {
        let (store, push) = processor();
        push.apply("g1", "u1", &create_list(1, "c1", "L1")).unwrap();
        let outcome = push.apply("g1", "u1", &create_list(1, "c1", "L1")).unwrap();
        assert_eq!(outcome, PushOutcome::AlreadyApplied);
        assert_eq!(client(&store, "c1").last_mutation_id, 1);
    }

    #[test]
    fn future_mutation_is_rejected() {
        let (store, push) = processor();
        let err = push.apply("g1", "u1", &create_list(2, "c1", "L1")).unwrap_err();
        assert!(matches!(err, ServerError::FutureMutation { expected: 1, .. }));
        assert!(store.begin().unwrap().get_client("c1").unwrap().is_none());
    }

    #[test]
    fn rejected_mutation_writes_nothing() {
        let (store, push) = processor();
        let bad = Mutation::new(1, "c1", "createList", json!({"id": "L1", "ownerID": "u2", "name": "x"}));
        let err = push.apply("g1", "u1", &bad).unwrap_err();
        assert!(matches!(err, ServerError::Mutation { source: MutationError::Forbidden(_), .. }));

        let txn = store.begin().unwrap();
        assert!(txn.get_client("c1").unwrap().is_none());
        assert!(txn.fetch_lists(&["L1".to_string()]).unwrap().is_empty());
    }

    #[test]
    fn apply_failed_advances_without_writing() {
        let (store, push) = processor();
        let bad = Mutation::new(1, "c1", "deleteTodo", json!("missing"));
        push.apply_failed("g1", &bad).unwrap();
        assert_eq!(client(&store, "c1").last_mutation_id, 1);

        // The next mutation now lines up.
        assert!(push.apply("g1", "u1", &create_list(2, "c1", "L1")).unwrap().is_applied());
        // And a resend of the failed one is a duplicate.
        assert_eq!(push.apply_failed("g1", &bad).unwrap(), PushOutcome::AlreadyApplied);
    }

    #[test]
    fn sibling_clients_share_group_version() {
        let (store, push) = processor();
        push.apply("g1", "u1", &create_list(1, "c1", "L1")).unwrap();
        push.apply("g1", "u1", &create_list(1, "c2", "L2")).unwrap();

        assert_eq!(client(&store, "c1").client_version, 1);
        assert_eq!(client(&store, "c2").client_version, 2);
    }

    #[test]
    fn client_cannot_switch_groups() {
        let (_store, push) = processor();
        push.apply("g1", "u1", &create_list(1, "c1", "L1")).unwrap();
        let err = push.apply("g2", "u1", &create_list(2, "c1", "L2")).unwrap_err();
        assert!(matches!(err, ServerError::ClientGroupMismatch { .. }));
    }
}
