//! API request and response types.

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PollError;
use crate::session::{InvalidVote, Session};

/// Header carrying the caller's voter token.
pub const VOTER_TOKEN_HEADER: &str = "x-voter-token";

/// Response for poll creation.
#[derive(Debug, Clone, Serialize)]
pub struct CreatePollResponse {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub session: Session,
}

impl CreatePollResponse {
    pub fn new(session: Session) -> Self {
        Self {
            session_id: session.id.to_string(),
            created_at: session.created_at,
            session,
        }
    }
}

/// Request to cast a ballot.
///
/// `choice_ids` is decoded loosely so a wrong shape is reported as an
/// invalid vote instead of a body rejection.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitVoteRequest {
    #[serde(default)]
    pub choice_ids: Value,
    #[serde(default)]
    pub voter_token: Option<String>,
}

impl SubmitVoteRequest {
    /// Extract the selection as a list of option ids.
    pub fn choice_ids(&self) -> Result<Vec<String>, InvalidVote> {
        let items = self
            .choice_ids
            .as_array()
            .ok_or(InvalidVote::MalformedSelection)?;
        items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or(InvalidVote::MalformedSelection)
            })
            .collect()
    }
}

/// Vote count and share for one option.
#[derive(Debug, Clone, Serialize)]
pub struct OptionTally {
    pub id: String,
    pub label: String,
    pub vote_count: u64,
    /// Share of all votes, rounded to one decimal place.
    pub percentage: f64,
}

/// Export of a session with computed totals.
#[derive(Debug, Clone, Serialize)]
pub struct ExportResponse {
    #[serde(flatten)]
    pub session: Session,
    pub total_votes: u64,
    pub tallies: Vec<OptionTally>,
    pub exported_at: DateTime<Utc>,
}

impl ExportResponse {
    pub fn from_session(session: Session) -> Self {
        let total_votes = session.total_votes();
        let tallies = session
            .options
            .iter()
            .map(|o| OptionTally {
                id: o.id.clone(),
                label: o.label.clone(),
                vote_count: o.vote_count,
                percentage: percentage(o.vote_count, total_votes),
            })
            .collect();

        Self {
            session,
            total_votes,
            tallies,
            exported_at: Utc::now(),
        }
    }
}

fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (count as f64 / total as f64 * 1000.0).round() / 10.0
}

/// Generic API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (e.g., "SESSION_NOT_FOUND").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<&PollError> for ErrorResponse {
    fn from(err: &PollError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

/// HTTP status for a coordinator error.
pub fn status_for(err: &PollError) -> StatusCode {
    match err {
        PollError::NotFound(_) => StatusCode::NOT_FOUND,
        PollError::Validation(_)
        | PollError::InvalidInput(_)
        | PollError::InvalidSessionId(_) => StatusCode::BAD_REQUEST,
        PollError::Closed(_) => StatusCode::FORBIDDEN,
        PollError::AlreadyVoted | PollError::SessionExists(_) => StatusCode::CONFLICT,
        PollError::LockPoisoned
        | PollError::Storage(_)
        | PollError::Io(_)
        | PollError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
