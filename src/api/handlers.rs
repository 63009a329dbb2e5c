//! REST API handlers.
//!
//! Handlers only translate between HTTP and coordinator calls; every rule
//! about sessions lives in the coordinator.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use super::types::{
    status_for, CreatePollResponse, ErrorResponse, ExportResponse, SubmitVoteRequest,
    VOTER_TOKEN_HEADER,
};
use crate::error::PollError;
use crate::session::{
    is_blank_token, CoordinatorHandle, NewSession, Session, SessionId, SessionRegistry,
    SessionView, VoteAck,
};

/// Shared application state.
#[derive(Clone, Default)]
pub struct AppState {
    pub registry: SessionRegistry,
}

impl AppState {
    pub fn new(registry: SessionRegistry) -> Self {
        Self { registry }
    }

    /// Resolve a path segment to its coordinator.
    pub(crate) fn coordinator(&self, raw_id: &str) -> Result<CoordinatorHandle, ApiError> {
        let id: SessionId = raw_id.parse().map_err(api_error)?;
        self.registry.coordinator(id).map_err(api_error)
    }
}

/// Error half of every handler result.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Map a coordinator error onto an HTTP response.
pub fn api_error(err: PollError) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        tracing::warn!(error = %err, "request failed");
    }
    (status, Json(ErrorResponse::from(&err)))
}

fn voter_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(VOTER_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|t| !is_blank_token(t))
}

/// Health check endpoint.
pub async fn health() -> &'static str {
    "OK"
}

/// API information endpoint.
pub async fn api_info(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "live-poll",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "sessions": state.registry.count(),
    }))
}

/// Create a new poll.
pub async fn create_poll(
    State(state): State<AppState>,
    Json(req): Json<NewSession>,
) -> Result<(StatusCode, Json<CreatePollResponse>), ApiError> {
    let session = state.registry.create(req).await.map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(CreatePollResponse::new(session))))
}

/// Get a poll as seen by the caller.
pub async fn get_poll(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<SessionView>, ApiError> {
    let handle = state.coordinator(&session_id)?;
    let view = handle
        .snapshot(voter_token(&headers))
        .await
        .map_err(api_error)?;
    Ok(Json(view))
}

/// Cast a ballot.
///
/// The voter token may come from the body or the `x-voter-token` header;
/// the body wins when both are present.
pub async fn submit_vote(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<SubmitVoteRequest>,
) -> Result<(StatusCode, Json<VoteAck>), ApiError> {
    let handle = state.coordinator(&session_id)?;
    let token = req
        .voter_token
        .clone()
        .or_else(|| voter_token(&headers).map(str::to_string))
        .unwrap_or_default();

    // A selection of the wrong shape is reported with the coordinator's
    // precedence, so NotFound and Closed still win over it.
    let choice_ids = match req.choice_ids() {
        Ok(ids) => ids,
        Err(invalid) => {
            let view = handle.snapshot(None).await.map_err(api_error)?;
            if !view.session.status.accepts_votes() {
                return Err(api_error(PollError::Closed(session_id)));
            }
            return Err(api_error(invalid.into()));
        }
    };

    let ack = handle
        .submit_vote(choice_ids, token)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(ack)))
}

/// Close a poll.
pub async fn close_poll(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let handle = state.coordinator(&session_id)?;
    let session = handle.close().await.map_err(api_error)?;
    Ok(Json(session))
}

/// Export a poll with totals.
pub async fn export_poll(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ExportResponse>, ApiError> {
    let handle = state.coordinator(&session_id)?;
    let session = handle.export().await.map_err(api_error)?;
    Ok(Json(ExportResponse::from_session(session)))
}
