//! # RowSync Store
//!
//! Storage traits and reference backends for the RowSync server.
//!
//! The sync core never talks to a database directly. It opens a
//! [`StoreTransaction`] through a [`SyncStore`], reads and writes version
//! bookkeeping through [`VersionStore`], reads entity versions and rows
//! through [`EntityRepository`], and lets domain mutators write rows through
//! [`EntityWriter`]. Dropping a transaction without committing rolls it back.
//!
//! ## Design Principles
//!
//! - One transaction per push mutation or pull, serialized by the backend
//! - Client and client group records are upserted, never deleted
//! - Row versions come from a single store-wide sequence and are never reused
//!
//! ## Available Backends
//!
//! - [`MemoryStore`] - For tests and ephemeral servers
//! - [`SqliteStore`] - For persistent storage in a single SQLite file
//!
//! ## Example
//!
//! ```rust
//! use rowsync_store::{MemoryStore, StoreTransaction, SyncStore, VersionStore};
//!
//! let store = MemoryStore::new();
//! let mut txn = store.begin().unwrap();
//! let mut group = txn.client_group_or_default("g1").unwrap();
//! group.client_group_version += 1;
//! txn.put_client_group(&group).unwrap();
//! txn.commit().unwrap();
//!
//! let txn = store.begin().unwrap();
//! assert_eq!(txn.client_group_or_default("g1").unwrap().client_group_version, 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod backend;
mod error;
mod memory;
mod records;
mod sqlite;

pub use backend::{EntityRepository, EntityWriter, StoreTransaction, SyncStore, VersionStore};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use records::{
    now_millis, ClientGroupRecord, ClientRecord, CvrVersion, EntityVersion, ListRow, StoreStats,
    TodoRow,
};
pub use sqlite::SqliteStore;
