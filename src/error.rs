//! Error types for live-poll.

use thiserror::Error;

use crate::session::{InvalidVote, ValidationError};

/// Main error type for poll operations.
#[derive(Error, Debug)]
pub enum PollError {
    /// No session exists for the given ID.
    #[error("session not found: {0}")]
    NotFound(String),

    /// Session with the given ID was already initialized.
    #[error("session already exists: {0}")]
    SessionExists(String),

    /// Session creation parameters were rejected.
    #[error("invalid session parameters: {0}")]
    Validation(#[from] ValidationError),

    /// Vote request was malformed.
    #[error("invalid vote: {0}")]
    InvalidInput(#[from] InvalidVote),

    /// Session no longer accepts votes.
    #[error("session closed: {0}")]
    Closed(String),

    /// Voter token has already voted in this session.
    #[error("voter has already voted")]
    AlreadyVoted,

    /// Session ID text could not be parsed.
    #[error("invalid session id: {0}")]
    InvalidSessionId(String),

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,

    /// Storage backend failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PollError {
    /// Stable machine-readable error code.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "SESSION_NOT_FOUND",
            Self::SessionExists(_) => "SESSION_EXISTS",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Closed(_) => "SESSION_CLOSED",
            Self::AlreadyVoted => "ALREADY_VOTED",
            Self::InvalidSessionId(_) => "INVALID_SESSION_ID",
            Self::LockPoisoned | Self::Storage(_) | Self::Io(_) | Self::Json(_) => {
                "INTERNAL_ERROR"
            }
        }
    }
}

/// Convenience Result type for poll operations.
pub type Result<T> = std::result::Result<T, PollError>;
