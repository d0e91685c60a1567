//! Protocol messages for push and pull.

use crate::error::ProtocolResult;
use crate::patch::PatchOperation;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Push protocol version understood by this server.
pub const PUSH_VERSION: u32 = 1;

/// Pull protocol version understood by this server.
pub const PULL_VERSION: u32 = 1;

fn default_push_version() -> u32 {
    PUSH_VERSION
}

fn default_pull_version() -> u32 {
    PULL_VERSION
}

/// JSON encoding shared by every protocol message.
pub trait WireMessage: Serialize + DeserializeOwned {
    /// Encodes to JSON bytes.
    fn encode(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes from JSON bytes.
    fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Opaque sync position held by a client between pulls.
///
/// `order` names the server-side client view snapshot the client holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cookie {
    /// Client group the snapshot belongs to.
    #[serde(rename = "clientGroupID")]
    pub client_group_id: String,
    /// Snapshot number.
    pub order: u64,
}

impl Cookie {
    /// Creates a new cookie.
    pub fn new(client_group_id: impl Into<String>, order: u64) -> Self {
        Self {
            client_group_id: client_group_id.into(),
            order,
        }
    }
}

/// A single client mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    /// Per-client, strictly increasing mutation ID.
    pub id: u64,
    /// Client that issued the mutation.
    #[serde(rename = "clientID")]
    pub client_id: String,
    /// Registered mutator name.
    pub name: String,
    /// Mutator arguments.
    #[serde(default)]
    pub args: serde_json::Value,
    /// Client clock when the mutation was created (millis).
    #[serde(default)]
    pub timestamp: f64,
}

impl Mutation {
    /// Creates a mutation with the given arguments.
    pub fn new(
        id: u64,
        client_id: impl Into<String>,
        name: impl Into<String>,
        args: serde_json::Value,
    ) -> Self {
        Self {
            id,
            client_id: client_id.into(),
            name: name.into(),
            args,
            timestamp: 0.0,
        }
    }
}

/// Push request from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    /// Client browser profile.
    #[serde(rename = "profileID", default)]
    pub profile_id: String,
    /// Client group issuing the push.
    #[serde(rename = "clientGroupID")]
    pub client_group_id: String,
    /// Mutations, applied in array order.
    pub mutations: Vec<Mutation>,
    /// Push protocol version.
    #[serde(rename = "pushVersion", default = "default_push_version")]
    pub push_version: u32,
    /// Application schema version.
    #[serde(rename = "schemaVersion", default)]
    pub schema_version: String,
}

impl PushRequest {
    /// Creates a new push request.
    pub fn new(client_group_id: impl Into<String>, mutations: Vec<Mutation>) -> Self {
        Self {
            profile_id: String::new(),
            client_group_id: client_group_id.into(),
            mutations,
            push_version: PUSH_VERSION,
            schema_version: String::new(),
        }
    }
}

impl WireMessage for PushRequest {}

/// A mutation the server rejected and acknowledged without applying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationFailure {
    /// Client that issued the mutation.
    #[serde(rename = "clientID")]
    pub client_id: String,
    /// Mutation ID.
    #[serde(rename = "id")]
    pub mutation_id: u64,
    /// Mutator name.
    pub name: String,
    /// Human readable reason.
    pub error: String,
}

/// Push response.
///
/// Sync state flows back through pull, so a successful push has an empty
/// body unless some mutations were rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResponse {
    /// Rejected mutations.
    #[serde(
        rename = "mutationFailures",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub mutation_failures: Vec<MutationFailure>,
}

impl PushResponse {
    /// Creates an empty (all applied) response.
    pub fn success() -> Self {
        Self::default()
    }

    /// Creates a response carrying rejected mutations.
    pub fn with_failures(mutation_failures: Vec<MutationFailure>) -> Self {
        Self { mutation_failures }
    }
}

impl WireMessage for PushResponse {}

/// Pull request from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Client browser profile.
    #[serde(rename = "profileID", default)]
    pub profile_id: String,
    /// Client group issuing the pull.
    #[serde(rename = "clientGroupID")]
    pub client_group_id: String,
    /// Cookie from the previous pull, absent on first pull.
    #[serde(default)]
    pub cookie: Option<Cookie>,
    /// Pull protocol version.
    #[serde(rename = "pullVersion", default = "default_pull_version")]
    pub pull_version: u32,
    /// Application schema version.
    #[serde(rename = "schemaVersion", default)]
    pub schema_version: String,
}

impl PullRequest {
    /// Creates a new pull request.
    pub fn new(client_group_id: impl Into<String>, cookie: Option<Cookie>) -> Self {
        Self {
            profile_id: String::new(),
            client_group_id: client_group_id.into(),
            cookie,
            pull_version: PULL_VERSION,
            schema_version: String::new(),
        }
    }
}

impl WireMessage for PullRequest {}

/// Pull response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullResponse {
    /// Cookie naming the snapshot this response brings the client to.
    pub cookie: Cookie,
    /// Last applied mutation ID for each client whose state changed.
    #[serde(rename = "lastMutationIDChanges")]
    pub last_mutation_id_changes: BTreeMap<String, u64>,
    /// Ordered patch.
    pub patch: Vec<PatchOperation>,
}

impl PullResponse {
    /// Creates a new pull response.
    pub fn new(
        cookie: Cookie,
        last_mutation_id_changes: BTreeMap<String, u64>,
        patch: Vec<PatchOperation>,
    ) -> Self {
        Self {
            cookie,
            last_mutation_id_changes,
            patch,
        }
    }
}

impl WireMessage for PullResponse {}

/// Which protocol version was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionType {
    /// Push version.
    Push,
    /// Pull version.
    Pull,
}

/// Error body returned for rejected requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error name or message.
    pub error: String,
    /// Set for `VersionNotSupported`.
    #[serde(rename = "versionType", default, skip_serializing_if = "Option::is_none")]
    pub version_type: Option<VersionType>,
}

impl ErrorResponse {
    /// Creates a `VersionNotSupported` body.
    pub fn version_not_supported(version_type: VersionType) -> Self {
        Self {
            error: "VersionNotSupported".to_string(),
            version_type: Some(version_type),
        }
    }

    /// Creates a plain error body.
    pub fn message(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            version_type: None,
        }
    }
}

impl WireMessage for ErrorResponse {}
