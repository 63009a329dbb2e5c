//! Poll data model: sessions, options, voter ledger and read views.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{is_blank_token, SessionId, SessionStatus};

/// Reason shown when a closed session is viewed.
pub const CLOSED_MESSAGE: &str = "voting has ended";
/// Reason shown when the viewer has already voted.
pub const ALREADY_VOTED_MESSAGE: &str = "you have already voted";
/// Confirmation returned for an accepted vote.
pub const VOTE_ACCEPTED_MESSAGE: &str = "your vote has been recorded";

/// How many options a single ballot may select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteMode {
    /// Exactly one option per ballot.
    Single,
    /// One or more distinct options per ballot.
    Multiple,
}

impl VoteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteMode::Single => "single",
            VoteMode::Multiple => "multiple",
        }
    }
}

impl fmt::Display for VoteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteMode {
    type Err = super::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(VoteMode::Single),
            "multiple" => Ok(VoteMode::Multiple),
            other => Err(super::ValidationError::UnknownMode(other.to_string())),
        }
    }
}

/// One selectable answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    /// Stable sequential identifier ("1".."N").
    pub id: String,
    /// Display text.
    pub label: String,
    /// Accepted votes for this option.
    pub vote_count: u64,
}

/// One poll instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub prompt: String,
    pub mode: VoteMode,
    pub options: Vec<PollOption>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Look up an option by its identifier.
    pub fn option(&self, id: &str) -> Option<&PollOption> {
        self.options.iter().find(|o| o.id == id)
    }

    /// Sum of all option counts.
    pub fn total_votes(&self) -> u64 {
        self.options.iter().map(|o| o.vote_count).sum()
    }

    /// Increment every option named in `choice_ids`.
    ///
    /// Callers validate the selection first; unknown ids are ignored here.
    pub(crate) fn apply_ballot(&mut self, choice_ids: &[String]) {
        for option in &mut self.options {
            if choice_ids.iter().any(|id| *id == option.id) {
                option.vote_count += 1;
            }
        }
    }
}

/// Set of voter tokens that have cast an accepted vote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoterLedger(BTreeSet<String>);

impl VoterLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.0.contains(token)
    }

    /// Record a token. Returns `false` if it was already present.
    pub fn insert(&mut self, token: impl Into<String>) -> bool {
        self.0.insert(token.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything persisted for one session, saved and erased as a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session: Session,
    pub voters: VoterLedger,
    /// When the expiry timer fires.
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn id(&self) -> SessionId {
        self.session.id
    }

    /// Whether the expiry due-time has already passed at `now`.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Session as seen by one (possibly anonymous) viewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: Session,
    pub can_vote: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SessionView {
    /// Build the view for a viewer holding `voter_token`.
    pub fn for_voter(record: &SessionRecord, voter_token: Option<&str>) -> Self {
        let closed = !record.session.status.accepts_votes();
        let has_voted = voter_token
            .filter(|t| !is_blank_token(t))
            .is_some_and(|t| record.voters.contains(t));

        let message = if closed {
            Some(CLOSED_MESSAGE.to_string())
        } else if has_voted {
            Some(ALREADY_VOTED_MESSAGE.to_string())
        } else {
            None
        };

        Self {
            session: record.session.clone(),
            can_vote: !closed && !has_voted,
            message,
        }
    }
}

/// Confirmation for an accepted vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteAck {
    pub message: String,
    pub voted_at: DateTime<Utc>,
}

/// Terminal notice sent to subscribers when a session closes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedNotice {
    pub message: String,
    pub closed_at: Option<DateTime<Utc>>,
}
