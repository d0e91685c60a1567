//! # RowSync Protocol
//!
//! Wire types and JSON codec for the RowSync push/pull protocol.
//!
//! This crate provides:
//! - [`PushRequest`] / [`PushResponse`] with the client [`Mutation`] batch
//! - [`PullRequest`] / [`PullResponse`] with the [`Cookie`] and ordered [`PatchOperation`]s
//! - Entity payloads ([`List`], [`Todo`]) and mutation arguments
//! - JSON encoding/decoding through [`WireMessage`]
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Keys
//!
//! Patch keys have the form `"<collection>/<id>"`, where the collection is
//! one of [`Collection::List`] or [`Collection::Todo`]:
//!
//! ```rust
//! use rowsync_protocol::{Collection, PatchKey};
//!
//! let key = PatchKey::new(Collection::Todo, "t-1");
//! assert_eq!(key.to_string(), "todo/t-1");
//! assert_eq!("todo/t-1".parse::<PatchKey>().unwrap(), key);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entities;
mod error;
mod messages;
mod patch;

pub use entities::{List, Todo, TodoUpdate};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    Cookie, ErrorResponse, Mutation, MutationFailure, PullRequest, PullResponse, PushRequest,
    PushResponse, VersionType, WireMessage, PULL_VERSION, PUSH_VERSION,
};
pub use patch::{Collection, PatchKey, PatchOperation};
