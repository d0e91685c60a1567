//! Main sync server.

use crate::auth::TokenValidator;
use crate::cache::{BoundedCvrCache, CvrCache, MemoryCvrCache};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use crate::mutators::MutatorRegistry;
use crate::notify::{LogNotifier, Notifier};
use crate::pull::PullProcessor;
use crate::push::PushProcessor;
use rowsync_protocol::{PullRequest, PullResponse, PushRequest, PushResponse};
use rowsync_store::{MemoryStore, SyncStore};
use std::sync::Arc;

/// The sync server.
///
/// Owns the push and pull processors over one store and one CVR cache.
/// Transport layers call [`Self::authenticate`] then
/// [`Self::handle_push`] or [`Self::handle_pull`].
///
/// # Example
///
/// ```
/// use rowsync_server::{ServerConfig, SyncServer};
/// use rowsync_protocol::{Mutation, PullRequest, PushRequest};
/// use serde_json::json;
///
/// let server = SyncServer::new(ServerConfig::default());
///
/// let create = Mutation::new(1, "c1", "createList", json!({"id": "L1", "ownerID": "u1", "name": "Work"}));
/// server.handle_push("u1", PushRequest::new("g1", vec![create])).unwrap();
///
/// let pull = server.handle_pull("u1", PullRequest::new("g1", None)).unwrap();
/// assert_eq!(pull.cookie.order, 1);
/// ```
pub struct SyncServer {
    handler: RequestHandler,
    store: Arc<dyn SyncStore>,
}

impl SyncServer {
    /// Creates a sync server over an in-memory store.
    pub fn new(config: ServerConfig) -> Self {
        Self::builder(config).build()
    }

    /// Starts building a server.
    pub fn builder(config: ServerConfig) -> SyncServerBuilder {
        SyncServerBuilder::new(config)
    }

    /// Resolves the calling user from a bearer token or a trusted user ID.
    pub fn authenticate(
        &self,
        bearer_token: Option<&str>,
        user_id: Option<&str>,
    ) -> ServerResult<String> {
        self.handler.authenticate(bearer_token, user_id)
    }

    /// Handles a push request on behalf of `user_id`.
    pub fn handle_push(&self, user_id: &str, request: PushRequest) -> ServerResult<PushResponse> {
        self.handler.handle_push(user_id, request)
    }

    /// Handles a pull request on behalf of `user_id`.
    pub fn handle_pull(&self, user_id: &str, request: PullRequest) -> ServerResult<PullResponse> {
        self.handler.handle_pull(user_id, request)
    }

    /// Issues a token for `user_id`.
    ///
    /// Fails with [`ServerError::Internal`] if authentication is disabled.
    pub fn create_token(&self, user_id: &str) -> ServerResult<String> {
        self.tokens()
            .ok_or_else(|| ServerError::Internal("authentication is disabled".into()))?
            .create_token(user_id)
    }

    /// Returns the token validator, if authentication is enabled.
    pub fn tokens(&self) -> Option<&TokenValidator> {
        self.handler.context().tokens.as_ref()
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.handler.context().config
    }

    /// Returns the backing store.
    pub fn store(&self) -> &Arc<dyn SyncStore> {
        &self.store
    }

    /// Returns the CVR cache.
    pub fn cvr_cache(&self) -> &Arc<dyn CvrCache> {
        self.handler.context().pull.cache()
    }
}

impl std::fmt::Debug for SyncServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncServer")
            .field("config", self.config())
            .finish_non_exhaustive()
    }
}

/// Builder for [`SyncServer`].
///
/// Anything not supplied gets a default: an in-memory store, the list/todo
/// mutators, a logging notifier, and a CVR cache chosen from
/// `cvr_cache_capacity`.
pub struct SyncServerBuilder {
    config: ServerConfig,
    store: Option<Arc<dyn SyncStore>>,
    mutators: Option<MutatorRegistry>,
    notifier: Option<Arc<dyn Notifier>>,
    cache: Option<Arc<dyn CvrCache>>,
}

impl SyncServerBuilder {
    /// Creates a builder.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            store: None,
            mutators: None,
            notifier: None,
            cache: None,
        }
    }

    /// Uses the given store.
    pub fn store(mut self, store: Arc<dyn SyncStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Uses the given mutators.
    pub fn mutators(mut self, mutators: MutatorRegistry) -> Self {
        self.mutators = Some(mutators);
        self
    }

    /// Uses the given notifier.
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Uses the given CVR cache, overriding `cvr_cache_capacity`.
    pub fn cvr_cache(mut self, cache: Arc<dyn CvrCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Builds the server.
    pub fn build(self) -> SyncServer {
        let store: Arc<dyn SyncStore> = match self.store {
            Some(store) => store,
            None => Arc::new(MemoryStore::new()),
        };
        let mutators = Arc::new(self.mutators.unwrap_or_else(MutatorRegistry::with_defaults));
        let notifier: Arc<dyn Notifier> = match self.notifier {
            Some(notifier) => notifier,
            None => Arc::new(LogNotifier),
        };
        let cache: Arc<dyn CvrCache> = match (self.cache, self.config.cvr_cache_capacity) {
            (Some(cache), _) => cache,
            (None, Some(capacity)) => Arc::new(BoundedCvrCache::new(capacity)),
            (None, None) => Arc::new(MemoryCvrCache::new()),
        };

        let context = HandlerContext::new(
            self.config,
            PushProcessor::new(Arc::clone(&store), mutators),
            PullProcessor::new(Arc::clone(&store), cache),
            notifier,
        );
        SyncServer {
            handler: RequestHandler::new(Arc::new(context)),
            store,
        }
    }
}
