//! Request handlers for the push and pull endpoints.

use crate::auth::TokenValidator;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::mutators::Affected;
use crate::notify::Notifier;
use crate::pull::PullProcessor;
use crate::push::PushProcessor;
use rowsync_protocol::{
    MutationFailure, PullRequest, PullResponse, PushRequest, PushResponse, VersionType,
    PULL_VERSION, PUSH_VERSION,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared state for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Push processor.
    pub push: PushProcessor,
    /// Pull processor.
    pub pull: PullProcessor,
    /// Poke sink.
    pub notifier: Arc<dyn Notifier>,
    /// Token validator, present when authentication is enabled.
    pub tokens: Option<TokenValidator>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(
        config: ServerConfig,
        push: PushProcessor,
        pull: PullProcessor,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let tokens = config.auth_config().map(TokenValidator::new);
        Self {
            config,
            push,
            pull,
            notifier,
            tokens,
        }
    }
}

/// Handler for sync requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Returns the handler context.
    pub fn context(&self) -> &Arc<HandlerContext> {
        &self.context
    }

    /// Resolves the calling user.
    ///
    /// With authentication enabled only a valid bearer token is accepted.
    /// Otherwise the caller-supplied user ID is trusted.
    pub fn authenticate(
        &self,
        bearer_token: Option<&str>,
        user_id: Option<&str>,
    ) -> ServerResult<String> {
        match &self.context.tokens {
            Some(validator) => {
                let token = bearer_token
                    .ok_or_else(|| ServerError::NotAuthorized("missing bearer token".into()))?;
                validator.validate_token(token)
            }
            None => match user_id.map(str::trim) {
                Some(id) if !id.is_empty() => Ok(id.to_string()),
                _ => Err(ServerError::NotAuthorized("missing user id".into())),
            },
        }
    }

    /// Handles a push request.
    ///
    /// Mutations are applied in order, each in its own transaction. A
    /// mutation the mutator rejects is either acknowledged without effect and
    /// reported in `mutationFailures` (`skip_failed_mutations`) or halts the
    /// batch. Any other error halts the batch; earlier mutations stay applied.
    /// Pokes go out for everything applied, even when the batch halts.
    pub fn handle_push(&self, user_id: &str, request: PushRequest) -> ServerResult<PushResponse> {
        if request.push_version != PUSH_VERSION {
            return Err(ServerError::VersionNotSupported(VersionType::Push));
        }
        validate_client_group(&request.client_group_id)?;
        let max_batch = self.context.config.max_push_batch;
        if request.mutations.len() > max_batch {
            return Err(ServerError::InvalidRequest(format!(
                "too many mutations: {} > {}",
                request.mutations.len(),
                max_batch
            )));
        }

        info!(
            client_group = %request.client_group_id,
            user = user_id,
            mutations = request.mutations.len(),
            "processing push"
        );

        let mut affected = Affected::default();
        let mut failures = Vec::new();
        let result = self.apply_batch(user_id, &request, &mut affected, &mut failures);
        self.poke(&affected);
        result?;

        if failures.is_empty() {
            Ok(PushResponse::success())
        } else {
            Ok(PushResponse::with_failures(failures))
        }
    }

    fn apply_batch(
        &self,
        user_id: &str,
        request: &PushRequest,
        affected: &mut Affected,
        failures: &mut Vec<MutationFailure>,
    ) -> ServerResult<()> {
        let group = request.client_group_id.as_str();
        for mutation in &request.mutations {
            match self.context.push.apply(group, user_id, mutation) {
                Ok(outcome) => {
                    if let Some(changed) = outcome.affected() {
                        affected.extend(changed.clone());
                    }
                }
                Err(err @ ServerError::Mutation { .. }) if self.context.config.skip_failed_mutations => {
                    warn!(
                        client_group = group,
                        client = %mutation.client_id,
                        mutation_id = mutation.id,
                        error = %err,
                        "mutation rejected"
                    );
                    self.context.push.apply_failed(group, mutation)?;
                    let reason = match &err {
                        ServerError::Mutation { source, .. } => source.to_string(),
                        other => other.to_string(),
                    };
                    failures.push(MutationFailure {
                        client_id: mutation.client_id.clone(),
                        mutation_id: mutation.id,
                        name: mutation.name.clone(),
                        error: reason,
                    });
                }
                Err(err) => {
                    warn!(
                        client_group = group,
                        client = %mutation.client_id,
                        mutation_id = mutation.id,
                        error = %err,
                        "push halted"
                    );
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    fn poke(&self, affected: &Affected) {
        for key in affected.keys() {
            self.context.notifier.notify(&key);
        }
    }

    /// Handles a pull request.
    pub fn handle_pull(&self, user_id: &str, request: PullRequest) -> ServerResult<PullResponse> {
        if request.pull_version != PULL_VERSION {
            return Err(ServerError::VersionNotSupported(VersionType::Pull));
        }
        validate_client_group(&request.client_group_id)?;

        let response = self
            .context
            .pull
            .pull(&request.client_group_id, request.cookie.as_ref(), user_id)?;

        debug!(
            client_group = %request.client_group_id,
            user = user_id,
            order = response.cookie.order,
            "pull served"
        );
        Ok(response)
    }
}

fn validate_client_group(client_group_id: &str) -> ServerResult<()> {
    if client_group_id.is_empty() {
        return Err(ServerError::InvalidRequest("clientGroupID is required".into()));
    }
    Ok(())
}
