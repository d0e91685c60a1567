//! Error types for the sync server.

use rowsync_protocol::{Collection, ProtocolError, VersionType};
use rowsync_store::StoreError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Result type for domain mutators.
pub type MutationResult<T> = Result<T, MutationError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The client speaks a protocol version this server does not.
    #[error("{0:?} version not supported")]
    VersionNotSupported(VersionType),

    /// Authentication or authorization failed.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// The mutation ID is beyond the next expected one for its client.
    ///
    /// The client and server disagree about history; the client must reset
    /// its local state.
    #[error("mutation {mutation_id} from client {client_id} is from the future, expected {expected}")]
    FutureMutation {
        /// Client that sent the mutation.
        client_id: String,
        /// Mutation ID received.
        mutation_id: u64,
        /// Next mutation ID the server expected.
        expected: u64,
    },

    /// The client is already registered under another client group.
    #[error("client {client_id} belongs to client group {existing}, not {requested}")]
    ClientGroupMismatch {
        /// Client ID.
        client_id: String,
        /// Group the client is stored under.
        existing: String,
        /// Group named by the request.
        requested: String,
    },

    /// A domain mutator rejected the mutation. Nothing was written.
    #[error("mutation {mutation_id} ({name}) from client {client_id} failed: {source}")]
    Mutation {
        /// Client that sent the mutation.
        client_id: String,
        /// Mutation ID.
        mutation_id: u64,
        /// Mutator name.
        name: String,
        /// Why the mutator rejected it.
        #[source]
        source: MutationError,
    },

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// Encoding or decoding error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_)
                | ServerError::VersionNotSupported(_)
                | ServerError::NotAuthorized(_)
                | ServerError::FutureMutation { .. }
                | ServerError::ClientGroupMismatch { .. }
                | ServerError::Mutation { .. }
                | ServerError::Protocol(_)
        )
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(self, ServerError::Storage(_) | ServerError::Internal(_))
    }

    /// Returns true if repeating the identical request may succeed.
    ///
    /// Storage failures leave no partial state behind, so push and pull can
    /// both be retried unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServerError::Storage(_))
    }
}

/// Errors raised by domain mutators.
#[derive(Error, Debug)]
pub enum MutationError {
    /// No mutator is registered under this name.
    #[error("unknown mutation {0:?}")]
    UnknownMutation(String),

    /// The arguments do not decode for this mutator.
    #[error("invalid arguments for {name}: {source}")]
    InvalidArguments {
        /// Mutator name.
        name: String,
        /// Decoding error.
        #[source]
        source: serde_json::Error,
    },

    /// The user may not touch this entity.
    #[error("authorization error: {0}")]
    Forbidden(String),

    /// The entity does not exist.
    #[error("{collection} {id} does not exist")]
    NotFound {
        /// Collection.
        collection: Collection,
        /// Entity ID.
        id: String,
    },

    /// An entity with this ID already exists.
    #[error("{collection} {id} already exists")]
    AlreadyExists {
        /// Collection.
        collection: Collection,
        /// Entity ID.
        id: String,
    },

    /// A value is outside the range the mutator can handle.
    #[error("value out of range: {0}")]
    OutOfRange(String),

    /// Storage failed underneath the mutator.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl MutationError {
    /// Creates an authorization error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }
}
