//! HTTP transport: the terminal API as an axum router.
//!
//! | Route | Handler |
//! |---|---|
//! | `POST /api/terminal/exec` | streams NDJSON until the closing message |
//! | `POST /api/terminal/stdin` | queues input for a running command |
//! | `POST /api/terminal/interrupt` | kills a running command |
//! | `GET /api/terminal/session` | prompt info for the session |

use std::{convert::Infallible, sync::Arc};

use axum::{
    Json, Router,
    body::Body,
    extract::{FromRequestParts, Query, State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use termbridge_core::{Authenticator, Credentials, ExecutionId, OutputMessage, User};
use termbridge_session::{ManagerError, SessionManager};
use tokio_stream::StreamExt;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::protocol::{
    ExecRequest, InterruptRequest, NDJSON_CONTENT_TYPE, SessionInfo, SessionQuery, StdinRequest,
    Success,
};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
    pub auth: Arc<dyn Authenticator>,
}

impl AppState {
    #[must_use]
    pub fn new(manager: Arc<SessionManager>, auth: Arc<dyn Authenticator>) -> Self {
        Self { manager, auth }
    }
}

/// Build the terminal API router.
#[must_use]
pub fn router(state: AppState) -> Router {
    router_with(state, Router::new())
}

/// Build the terminal API router with extra routes, such as a front-end page.
///
/// The extra routes share the API's trace and CORS layers.
#[must_use]
pub fn router_with(state: AppState, extra: Router<AppState>) -> Router {
    extra
        .route("/api/terminal/exec", post(exec))
        .route("/api/terminal/stdin", post(stdin))
        .route("/api/terminal/interrupt", post(interrupt))
        .route("/api/terminal/session", get(session))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Error response; the body is always an `error` message.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Manager(#[from] ManagerError),
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Manager(ManagerError::Busy) => StatusCode::CONFLICT,
            Self::Manager(ManagerError::UnknownProcessId(_)) => StatusCode::NOT_FOUND,
            Self::Manager(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(OutputMessage::error(self.to_string()))).into_response()
    }
}

/// The authenticated caller.
pub struct AuthUser(pub User);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let credentials = Credentials {
            bearer: token.map(str::to_string),
        };
        state
            .auth
            .current_user(&credentials)
            .await
            .map(AuthUser)
            .ok_or(ApiError::Unauthorized)
    }
}

async fn exec(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    body: Result<Json<ExecRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body?;
    tracing::info!(user = %user.id, command = %req.command, "Exec");

    let stream = state
        .manager
        .exec(&user, &req.context(), &req.command)
        .await?;
    let lines = stream.filter_map(|message| match message.to_ndjson() {
        Ok(line) => Some(Ok::<_, Infallible>(line)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize message");
            None
        }
    });

    let mut response = Body::from_stream(lines).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(NDJSON_CONTENT_TYPE),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    Ok(response)
}

fn require_id(id: Option<ExecutionId>) -> Result<ExecutionId, ApiError> {
    id.filter(|id| !id.as_str().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Process ID is required".to_string()))
}

async fn stdin(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    body: Result<Json<StdinRequest>, JsonRejection>,
) -> Result<Json<Success>, ApiError> {
    let Json(req) = body?;
    let id = require_id(req.process_id)?;
    state.manager.stdin(&user, &id, req.input).await?;
    Ok(Json(Success::OK))
}

async fn interrupt(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    body: Result<Json<InterruptRequest>, JsonRejection>,
) -> Result<Json<Success>, ApiError> {
    let Json(req) = body?;
    let id = require_id(req.process_id)?;
    state.manager.interrupt(&user, &id).await?;
    Ok(Json(Success::OK))
}

async fn session(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<SessionQuery>,
) -> Result<Json<SessionInfo>, ApiError> {
    let info = state.manager.prompt(&user, &query.context()).await?;
    Ok(Json(SessionInfo {
        cwd: info.cwd,
        user: info.user,
    }))
}
