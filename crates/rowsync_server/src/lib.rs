//! # RowSync Server
//!
//! Push/pull reconciliation for offline-first clients.
//!
//! This crate provides:
//! - Exactly-once mutation application ([`PushProcessor`])
//! - Client view record diffing and patch assembly ([`PullProcessor`])
//! - A pluggable CVR cache ([`CvrCache`])
//! - The list/todo domain mutators ([`MutatorRegistry`])
//! - Pokes after successful pushes ([`Notifier`])
//! - Authentication (HMAC-SHA256 tokens)
//!
//! # Architecture
//!
//! The server holds no per-client state of its own. Version counters live in
//! the store and every push or pull runs in one store transaction, so
//! concurrent requests for one client group serialize there. The only
//! process state is the CVR cache, and losing it costs one full resync per
//! client group, never a wrong patch.
//!
//! # Authentication
//!
//! Authentication is optional. When enabled, requests carry a token issued
//! for their user:
//!
//! ```rust
//! use rowsync_server::{ServerConfig, SyncServer};
//!
//! let config = ServerConfig::default().with_auth(b"my-secure-secret".to_vec());
//! let server = SyncServer::new(config);
//!
//! let token = server.create_token("u1").unwrap();
//! assert_eq!(server.authenticate(Some(&token), None).unwrap(), "u1");
//! ```
//!
//! # Protocol
//!
//! 1. Client pushes pending mutations; each is applied once, in order
//! 2. Affected users and lists are poked
//! 3. Client pulls with its cookie and receives only what changed

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod cache;
mod config;
mod cvr;
mod error;
mod handler;
mod mutators;
mod notify;
mod pull;
mod push;
mod server;

pub use auth::{AuthConfig, TokenValidator};
pub use cache::{BoundedCvrCache, CvrCache, CvrKey, MemoryCvrCache};
pub use config::ServerConfig;
pub use cvr::{dels_since, puts_since, ClientViewRecord, CollectionDiff, CvrDiff, VersionMap};
pub use error::{MutationError, MutationResult, ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use mutators::{Affected, MutatorRegistry};
pub use notify::{BroadcastNotifier, LogNotifier, NoopNotifier, Notifier};
pub use pull::{build_patch, PullProcessor};
pub use push::{PushOutcome, PushProcessor};
pub use server::{SyncServer, SyncServerBuilder};
