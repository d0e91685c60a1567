//! Patch operations and entity keys.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A synchronized collection.
///
/// The declaration order is also the order in which collections appear in a
/// pull patch: parents (lists) before children (todos).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    /// Todo lists.
    List,
    /// Todo items, each owned by a list.
    Todo,
}

impl Collection {
    /// All collections in patch order.
    pub const ALL: [Collection; 2] = [Collection::List, Collection::Todo];

    /// Returns the key prefix for this collection.
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::List => "list",
            Collection::Todo => "todo",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Self> {
        match s {
            "list" => Ok(Collection::List),
            "todo" => Ok(Collection::Todo),
            other => Err(ProtocolError::UnknownCollection(other.to_string())),
        }
    }
}

/// A client-side key: `<collection>/<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatchKey {
    /// Collection the entity belongs to.
    pub collection: Collection,
    /// Entity ID.
    pub id: String,
}

impl PatchKey {
    /// Creates a new key.
    pub fn new(collection: Collection, id: impl Into<String>) -> Self {
        Self {
            collection,
            id: id.into(),
        }
    }
}

impl fmt::Display for PatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

impl FromStr for PatchKey {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Self> {
        let (prefix, id) = s
            .split_once('/')
            .ok_or_else(|| ProtocolError::invalid_key(s))?;
        if id.is_empty() {
            return Err(ProtocolError::invalid_key(s));
        }
        Ok(Self::new(prefix.parse()?, id))
    }
}

impl Serialize for PatchKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PatchKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One step of a pull patch.
///
/// Clients apply the operations in order; the server emits them as
/// `clear`, list deletes, list puts, todo deletes, todo puts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    /// Drop everything the client holds.
    Clear,
    /// Insert or replace an entity.
    Put {
        /// Entity key.
        key: PatchKey,
        /// Full entity payload.
        value: serde_json::Value,
    },
    /// Remove an entity.
    Del {
        /// Entity key.
        key: PatchKey,
    },
}

impl PatchOperation {
    /// Creates a put operation from any serializable payload.
    pub fn put<T: Serialize>(key: PatchKey, value: &T) -> ProtocolResult<Self> {
        Ok(PatchOperation::Put {
            key,
            value: serde_json::to_value(value)?,
        })
    }

    /// Creates a delete operation.
    pub fn del(key: PatchKey) -> Self {
        PatchOperation::Del { key }
    }

    /// Returns the key this operation touches, if any.
    pub fn key(&self) -> Option<&PatchKey> {
        match self {
            PatchOperation::Clear => None,
            PatchOperation::Put { key, .. } | PatchOperation::Del { key } => Some(key),
        }
    }

    /// Returns true for `clear`.
    pub fn is_clear(&self) -> bool {
        matches!(self, PatchOperation::Clear)
    }

    /// Returns true for `del`.
    pub fn is_del(&self) -> bool {
        matches!(self, PatchOperation::Del { .. })
    }
}
