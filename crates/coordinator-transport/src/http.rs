//! HTTP transport for commit sessions.

use std::{collections::HashMap, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{
        IntoResponse, Response,
        sse::{KeepAlive, Sse},
    },
    routing::{get, post, put},
};
use coordinator_core::{Phase, SessionId, SessionStorage};
use coordinator_session::{ManagerError, SessionManager};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::protocol::{ErrorResponse, SessionCreated, SessionDetail, SessionStatus};

/// Header carrying the session ID on prepare/commit requests.
pub const SESSION_ID_HEADER: &str = "x-session-id";

/// HTTP handler state.
pub struct AppState<S>
where
    S: SessionStorage,
{
    /// Session manager shared by all handlers.
    pub manager: Arc<SessionManager<S>>,
}

impl<S> Clone for AppState<S>
where
    S: SessionStorage,
{
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
        }
    }
}

/// Error returned to HTTP clients.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("no session id exists with the provided ID")]
    NotFound,
    #[error("session cannot be prepared.")]
    CannotPrepare,
    #[error("session cannot be commited.")]
    CannotCommit,
    #[error("wrong status code")]
    WrongMethod,
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Map a rejected prepare/commit request.
    fn from_transition(err: ManagerError, requested: Phase) -> Self {
        match err {
            ManagerError::NotFound(_) => Self::NotFound,
            ManagerError::InvalidTransition { .. } if requested == Phase::Committed => {
                Self::CannotCommit
            }
            ManagerError::InvalidTransition { .. } => Self::CannotPrepare,
            other => Self::from(other),
        }
    }

    const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound | Self::CannotPrepare | Self::CannotCommit => StatusCode::BAD_REQUEST,
            Self::WrongMethod => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ManagerError> for ApiError {
    fn from(err: ManagerError) -> Self {
        match err {
            ManagerError::NotFound(_) => Self::NotFound,
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(message) = &self {
            tracing::error!("Request failed: {message}");
        }
        (self.status_code(), Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

fn parse_session_id(raw: &str) -> Result<SessionId, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::NotFound)
}

fn header_session_id(headers: &HeaderMap) -> Result<SessionId, ApiError> {
    let raw = headers
        .get(SESSION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::NotFound)?;
    parse_session_id(raw)
}

async fn create_session<S>(
    State(state): State<AppState<S>>,
) -> Result<Json<SessionCreated>, ApiError>
where
    S: SessionStorage + 'static,
{
    let session_id = state.manager.create_session().await?;
    Ok(Json(SessionCreated { session_id }))
}

async fn list_sessions<S>(
    State(state): State<AppState<S>>,
) -> Result<Json<HashMap<SessionId, Phase>>, ApiError>
where
    S: SessionStorage + 'static,
{
    Ok(Json(state.manager.snapshot().await?))
}

async fn get_session<S>(
    State(state): State<AppState<S>>,
    Path(raw_id): Path<String>,
) -> Result<Json<SessionDetail>, ApiError>
where
    S: SessionStorage + 'static,
{
    let session_id = parse_session_id(&raw_id)?;
    let session = state
        .manager
        .get_session(session_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(session.into()))
}

async fn request<S>(
    state: &AppState<S>,
    headers: &HeaderMap,
    requested: Phase,
) -> Result<Json<SessionStatus>, ApiError>
where
    S: SessionStorage + 'static,
{
    let session_id = header_session_id(headers)?;
    let status = state
        .manager
        .request_transition(session_id, requested)
        .await
        .map_err(|e| ApiError::from_transition(e, requested))?;
    Ok(Json(SessionStatus { session_id, status }))
}

async fn prepare<S>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
) -> Result<Json<SessionStatus>, ApiError>
where
    S: SessionStorage + 'static,
{
    request(&state, &headers, Phase::PreparedToCommit).await
}

async fn commit<S>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
) -> Result<Json<SessionStatus>, ApiError>
where
    S: SessionStorage + 'static,
{
    request(&state, &headers, Phase::Committed).await
}

async fn events<S>(State(state): State<AppState<S>>) -> impl IntoResponse
where
    S: SessionStorage + 'static,
{
    Sse::new(state.manager.phase_log().sse_stream()).keep_alive(KeepAlive::default())
}

async fn wrong_method() -> ApiError {
    ApiError::WrongMethod
}

/// Create the coordinator HTTP router.
///
/// # Example
/// ```ignore
/// let manager = Arc::new(SessionManager::new(MemoryStorage::new(), &config));
/// let app = create_router(manager);
/// axum::serve(listener, app).await?;
/// ```
#[must_use]
pub fn create_router<S>(manager: Arc<SessionManager<S>>) -> Router
where
    S: SessionStorage + 'static,
{
    Router::new()
        .route("/session", post(create_session::<S>))
        .route("/sessions", get(list_sessions::<S>))
        .route("/sessions/{id}", get(get_session::<S>))
        .route("/prepare", put(prepare::<S>))
        .route("/commit", put(commit::<S>))
        .route("/events", get(events::<S>))
        .method_not_allowed_fallback(wrong_method)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState { manager })
}
