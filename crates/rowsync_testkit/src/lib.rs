//! # RowSync Testkit
//!
//! Test utilities for RowSync.
//!
//! This crate provides:
//! - Servers over throwaway stores ([`TestServer`])
//! - Simulated clients that apply pulled patches ([`Replica`])
//! - Property-based test generators using proptest
//! - Concurrent stress drivers
//!
//! ## Usage
//!
//! ```rust
//! use rowsync_testkit::prelude::*;
//! use serde_json::json;
//!
//! let server = TestServer::memory();
//! let mut replica = Replica::new("g1", "c1", "u1");
//! replica
//!     .push(&server, "createList", json!({"id": "L1", "ownerID": "u1", "name": "Work"}))
//!     .unwrap();
//! replica.pull(&server).unwrap();
//! assert_eq!(replica.keys(), vec!["list/L1"]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
