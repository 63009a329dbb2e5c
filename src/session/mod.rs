//! Poll session management.
//!
//! This module provides the session data model, validation, the per-session
//! coordinator actor, its expiry timer, and the registry that routes session
//! IDs to coordinators.

mod coordinator;
mod expiry;
mod id;
mod model;
mod registry;
mod state;
mod validation;

pub use coordinator::{CoordinatorConfig, CoordinatorHandle, DEFAULT_SESSION_TTL};
pub use expiry::ExpiryTimer;
pub use id::SessionId;
pub use model::{
    ClosedNotice, PollOption, Session, SessionRecord, SessionView, VoteAck, VoteMode,
    VoterLedger, ALREADY_VOTED_MESSAGE, CLOSED_MESSAGE, VOTE_ACCEPTED_MESSAGE,
};
pub use registry::SessionRegistry;
pub use state::{InvalidTransition, SessionStatus};
pub use validation::{
    is_blank_token, validate_ballot, InvalidVote, NewSession, ValidationError, MAX_OPTIONS,
    MIN_OPTIONS,
};

#[cfg(test)]
pub(crate) use model::fixtures;
