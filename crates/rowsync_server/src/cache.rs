//! Process-wide cache of client view records.
//!
//! Entries are keyed by `(client group, order)`. Losing an entry is always
//! safe: the next pull presenting that order is answered with a full resync.

use crate::cvr::ClientViewRecord;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Cache key: a client group and a snapshot order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CvrKey {
    /// Client group ID.
    pub client_group_id: String,
    /// Snapshot order (the cookie's `order`).
    pub order: u64,
}

impl CvrKey {
    /// Creates a new key.
    pub fn new(client_group_id: impl Into<String>, order: u64) -> Self {
        Self {
            client_group_id: client_group_id.into(),
            order,
        }
    }
}

/// Storage for client view records shared by all pulls.
///
/// Implementations must be safe to call from many request threads at once.
pub trait CvrCache: Send + Sync {
    /// Looks up a record.
    fn get(&self, key: &CvrKey) -> Option<Arc<ClientViewRecord>>;

    /// Stores a record, replacing any previous one under the same key.
    fn set(&self, key: CvrKey, cvr: ClientViewRecord);

    /// Returns the number of cached records.
    fn len(&self) -> usize;

    /// Returns true if the cache is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every record.
    fn clear(&self);
}

/// Unbounded in-memory cache. Entries live for the process lifetime.
#[derive(Debug, Default)]
pub struct MemoryCvrCache {
    entries: RwLock<HashMap<CvrKey, Arc<ClientViewRecord>>>,
}

impl MemoryCvrCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CvrCache for MemoryCvrCache {
    fn get(&self, key: &CvrKey) -> Option<Arc<ClientViewRecord>> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: CvrKey, cvr: ClientViewRecord) {
        self.entries.write().insert(key, Arc::new(cvr));
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }

    fn clear(&self) {
        self.entries.write().clear();
    }
}

#[derive(Debug, Default)]
struct BoundedEntries {
    map: HashMap<CvrKey, Arc<ClientViewRecord>>,
    insertion_order: VecDeque<CvrKey>,
}

/// In-memory cache holding at most `capacity` records.
///
/// The oldest inserted record is evicted first.
#[derive(Debug)]
pub struct BoundedCvrCache {
    capacity: usize,
    entries: Mutex<BoundedEntries>,
}

impl BoundedCvrCache {
    /// Creates a cache holding at most `capacity` records (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(BoundedEntries::default()),
        }
    }

    /// Returns the configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl CvrCache for BoundedCvrCache {
    fn get(&self, key: &CvrKey) -> Option<Arc<ClientViewRecord>> {
        self.entries.lock().map.get(key).cloned()
    }

    fn set(&self, key: CvrKey, cvr: ClientViewRecord) {
        let mut entries = self.entries.lock();
        if entries.map.insert(key.clone(), Arc::new(cvr)).is_none() {
            entries.insertion_order.push_back(key);
        }
        while entries.map.len() > self.capacity {
            match entries.insertion_order.pop_front() {
                Some(oldest) => {
                    entries.map.remove(&oldest);
                }
                None => break,
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.lock().map.len()
    }

    fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.map.clear();
        entries.insertion_order.clear();
    }
}
