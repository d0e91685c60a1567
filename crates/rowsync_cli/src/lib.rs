//! HTTP front end for the RowSync server.
//!
//! Routes:
//!
//! | method | path | body |
//! |---|---|---|
//! | `POST` | `/api/replicache/push` | `PushRequest` → `PushResponse` |
//! | `POST` | `/api/replicache/pull` | `PullRequest` → `PullResponse` |
//! | `GET` | `/api/health` | → `HealthResponse` |
//!
//! The caller is identified by `Authorization: Bearer <token>` when the
//! server requires authentication, otherwise by the `x-user-id` header.
//! Errors are returned as an `ErrorResponse` JSON body.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use axum::{
    body::Bytes,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use rowsync_protocol::{ErrorResponse, PullRequest, PushRequest, WireMessage};
use rowsync_server::{ServerError, ServerResult, SyncServer};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Header carrying the user ID when authentication is disabled.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Errors from the command-line tools.
#[derive(Error, Debug)]
pub enum CliError {
    /// I/O error (binding, reading files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Sync server error.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// Storage error.
    #[error(transparent)]
    Store(#[from] rowsync_store::StoreError),

    /// Invalid command-line input.
    #[error("{0}")]
    Usage(String),
}

/// Health check body.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HealthResponse {
    /// Always `"ok"`.
    pub status: String,
    /// Server version.
    pub version: String,
}

/// An error ready to be sent to the client.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn new(status: StatusCode, body: ErrorResponse) -> Self {
        Self { status, body }
    }

    /// Returns the HTTP status.
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ServerError> for ApiError {
    fn from(err: ServerError) -> Self {
        let status = match &err {
            ServerError::VersionNotSupported(version_type) => {
                return Self::new(
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::version_not_supported(*version_type),
                );
            }
            ServerError::NotAuthorized(_) => StatusCode::UNAUTHORIZED,
            ServerError::FutureMutation { .. } | ServerError::ClientGroupMismatch { .. } => {
                StatusCode::CONFLICT
            }
            ServerError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::InvalidRequest(_)
            | ServerError::Mutation { .. }
            | ServerError::Protocol(_) => StatusCode::BAD_REQUEST,
        };
        if status.is_server_error() {
            error!(error = %err, "request failed");
        } else {
            warn!(error = %err, "request rejected");
        }
        Self::new(status, ErrorResponse::message(err.to_string()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Build the HTTP API router over the given server.
pub fn build_router(server: Arc<SyncServer>) -> Router {
    Router::new()
        .route("/api/replicache/push", post(push_handler))
        .route("/api/replicache/pull", post(pull_handler))
        .route("/api/health", get(health_handler))
        .with_state(server)
}

/// Serves the API on `addr` until Ctrl-C.
pub async fn serve(server: Arc<SyncServer>, addr: SocketAddr) -> Result<(), CliError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "sync server listening");
    axum::serve(listener, build_router(server))
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_err() {
                warn!("could not install Ctrl-C handler");
                std::future::pending::<()>().await;
            }
            info!("shutting down");
        })
        .await?;
    Ok(())
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn push_handler(
    State(server): State<Arc<SyncServer>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let user_id = authenticate(&server, &headers)?;
    let request = PushRequest::decode(&body).map_err(ServerError::from)?;
    let response = run_blocking(&server, move |server| server.handle_push(&user_id, request)).await?;
    Ok(Json(response).into_response())
}

async fn pull_handler(
    State(server): State<Arc<SyncServer>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let user_id = authenticate(&server, &headers)?;
    let request = PullRequest::decode(&body).map_err(ServerError::from)?;
    let response = run_blocking(&server, move |server| server.handle_pull(&user_id, request)).await?;
    Ok(Json(response).into_response())
}

fn authenticate(server: &SyncServer, headers: &HeaderMap) -> Result<String, ApiError> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok());
    Ok(server.authenticate(bearer, user_id)?)
}

/// Runs a synchronous server call on the blocking pool, bounded by the
/// configured request timeout.
///
/// On timeout the client gets 504 while the call runs to completion in the
/// background. Its transaction either commits or not as a whole, and a
/// retried push is deduplicated by mutation ID.
async fn run_blocking<T, F>(server: &Arc<SyncServer>, call: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&SyncServer) -> ServerResult<T> + Send + 'static,
{
    let timeout = server.config().request_timeout;
    let server = Arc::clone(server);
    let task = tokio::task::spawn_blocking(move || call(&server));
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => Ok(result?),
        Ok(Err(join_error)) => Err(ServerError::Internal(format!("request task failed: {join_error}")).into()),
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "request timed out");
            Err(ApiError::new(
                StatusCode::GATEWAY_TIMEOUT,
                ErrorResponse::message("request timed out"),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowsync_protocol::VersionType;

    #[test]
    fn version_errors_keep_their_shape() {
        let err = ApiError::from(ServerError::VersionNotSupported(VersionType::Pull));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.body, ErrorResponse::version_not_supported(VersionType::Pull));
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            ApiError::from(ServerError::NotAuthorized("x".into())).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(ServerError::FutureMutation {
                client_id: "c1".into(),
                mutation_id: 3,
                expected: 1,
            })
            .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(ServerError::Internal("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
