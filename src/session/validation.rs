//! Validation of session parameters and ballots.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{PollOption, Session, SessionId, SessionStatus, VoteMode};

/// Minimum number of options a session is created with.
pub const MIN_OPTIONS: usize = 2;
/// Maximum number of options a session may hold.
pub const MAX_OPTIONS: usize = 10;

/// Parameters for creating a session.
///
/// `mode` is kept as text so an unknown mode is reported as a validation
/// failure rather than a decoding failure.
#[derive(Debug, Clone, Deserialize)]
pub struct NewSession {
    pub prompt: String,
    pub mode: String,
    pub options: Vec<String>,
}

impl NewSession {
    pub fn new(
        prompt: impl Into<String>,
        mode: VoteMode,
        options: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            mode: mode.as_str().to_string(),
            options: options.into_iter().map(Into::into).collect(),
        }
    }

    /// Check every creation constraint.
    pub fn validate(&self) -> Result<VoteMode, ValidationError> {
        if self.prompt.trim().is_empty() {
            return Err(ValidationError::BlankPrompt);
        }

        let count = self.options.len();
        if count < MIN_OPTIONS {
            return Err(ValidationError::TooFewOptions { count });
        }
        if count > MAX_OPTIONS {
            return Err(ValidationError::TooManyOptions { count });
        }

        if let Some(index) = self.options.iter().position(|l| l.trim().is_empty()) {
            return Err(ValidationError::BlankOptionLabel { index });
        }

        self.mode.parse()
    }

    /// Validate and build a fresh active session.
    pub fn into_session(
        self,
        id: SessionId,
        created_at: DateTime<Utc>,
    ) -> Result<Session, ValidationError> {
        let mode = self.validate()?;

        let options = self
            .options
            .into_iter()
            .enumerate()
            .map(|(i, label)| PollOption {
                id: (i + 1).to_string(),
                label,
                vote_count: 0,
            })
            .collect();

        Ok(Session {
            id,
            prompt: self.prompt,
            mode,
            options,
            status: SessionStatus::Active,
            created_at,
            closed_at: None,
        })
    }
}

/// Rejected session parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("prompt must not be blank")]
    BlankPrompt,

    #[error("at least {min} options are required, got {count}", min = MIN_OPTIONS)]
    TooFewOptions { count: usize },

    #[error("at most {max} options are allowed, got {count}", max = MAX_OPTIONS)]
    TooManyOptions { count: usize },

    #[error("option {index} has a blank label")]
    BlankOptionLabel { index: usize },

    #[error("vote mode must be single or multiple, got '{0}'")]
    UnknownMode(String),
}

/// Rejected ballot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidVote {
    #[error("voter token is required")]
    MissingVoterToken,

    #[error("choice ids must be an array of strings")]
    MalformedSelection,

    #[error("at least one choice is required")]
    EmptySelection,

    #[error("choice '{0}' is selected more than once")]
    DuplicateChoice(String),

    #[error("unknown choice '{0}'")]
    UnknownChoice(String),

    #[error("single-choice poll accepts one choice, got {count}")]
    TooManyChoices { count: usize },
}

/// Whether `token` carries no voter identity (empty or whitespace only).
pub fn is_blank_token(token: &str) -> bool {
    token.trim().is_empty()
}

/// Check a ballot against the session's option set and mode.
pub fn validate_ballot(
    session: &Session,
    choice_ids: &[String],
    voter_token: &str,
) -> Result<(), InvalidVote> {
    if is_blank_token(voter_token) {
        return Err(InvalidVote::MissingVoterToken);
    }

    if choice_ids.is_empty() {
        return Err(InvalidVote::EmptySelection);
    }

    let mut seen = HashSet::with_capacity(choice_ids.len());
    for id in choice_ids {
        if !seen.insert(id.as_str()) {
            return Err(InvalidVote::DuplicateChoice(id.clone()));
        }
        if session.option(id).is_none() {
            return Err(InvalidVote::UnknownChoice(id.clone()));
        }
    }

    if session.mode == VoteMode::Single && choice_ids.len() > 1 {
        return Err(InvalidVote::TooManyChoices {
            count: choice_ids.len(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(mode: VoteMode) -> Session {
        NewSession::new("Favourite colour?", mode, ["red", "blue", "green"])
            .into_session(SessionId::new(), Utc::now())
            .unwrap()
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_into_session_assigns_sequential_ids() {
        let s = NewSession::new("好きな色は？", VoteMode::Single, ["赤", "青", "緑"])
            .into_session(SessionId::new(), Utc::now())
            .unwrap();

        let option_ids: Vec<_> = s.options.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(option_ids, ["1", "2", "3"]);
        assert!(s.options.iter().all(|o| o.vote_count == 0));
        assert_eq!(s.options[1].label, "青");
        assert_eq!(s.status, SessionStatus::Active);
        assert!(s.closed_at.is_none());
    }

    #[test]
    fn test_blank_prompt() {
        let req = NewSession::new("   ", VoteMode::Single, ["a", "b"]);
        assert_eq!(req.validate(), Err(ValidationError::BlankPrompt));
    }

    #[test]
    fn test_option_count_bounds() {
        let one = NewSession::new("q", VoteMode::Single, ["a"]);
        assert_eq!(
            one.validate(),
            Err(ValidationError::TooFewOptions { count: 1 })
        );

        let labels: Vec<String> = (0..11).map(|i| format!("opt {}", i)).collect();
        let eleven = NewSession::new("q", VoteMode::Multiple, labels);
        assert_eq!(
            eleven.validate(),
            Err(ValidationError::TooManyOptions { count: 11 })
        );

        let labels: Vec<String> = (0..10).map(|i| format!("opt {}", i)).collect();
        assert!(NewSession::new("q", VoteMode::Multiple, labels)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_blank_label() {
        let req = NewSession::new("q", VoteMode::Single, ["a", " ", "c"]);
        assert_eq!(
            req.validate(),
            Err(ValidationError::BlankOptionLabel { index: 1 })
        );
    }

    #[test]
    fn test_unknown_mode() {
        let req = NewSession {
            prompt: "q".into(),
            mode: "ranked".into(),
            options: ids(&["a", "b"]),
        };
        let err = req.validate().unwrap_err();
        assert_eq!(err, ValidationError::UnknownMode("ranked".into()));
        assert!(err.to_string().contains("ranked"));
    }

    #[test]
    fn test_ballot_accepts_valid() {
        assert!(validate_ballot(&session(VoteMode::Single), &ids(&["2"]), "v").is_ok());
        assert!(validate_ballot(&session(VoteMode::Multiple), &ids(&["1", "3"]), "v").is_ok());
    }

    #[test]
    fn test_ballot_missing_token() {
        assert_eq!(
            validate_ballot(&session(VoteMode::Single), &ids(&["1"]), ""),
            Err(InvalidVote::MissingVoterToken)
        );
        assert_eq!(
            validate_ballot(&session(VoteMode::Single), &ids(&["1"]), " \t "),
            Err(InvalidVote::MissingVoterToken)
        );
    }

    #[test]
    fn test_ballot_empty_and_duplicate() {
        let s = session(VoteMode::Multiple);
        assert_eq!(
            validate_ballot(&s, &[], "v"),
            Err(InvalidVote::EmptySelection)
        );
        assert_eq!(
            validate_ballot(&s, &ids(&["1", "1"]), "v"),
            Err(InvalidVote::DuplicateChoice("1".into()))
        );
    }

    #[test]
    fn test_ballot_unknown_choice() {
        assert_eq!(
            validate_ballot(&session(VoteMode::Single), &ids(&["999"]), "v"),
            Err(InvalidVote::UnknownChoice("999".into()))
        );
    }

    #[test]
    fn test_ballot_single_mode_cardinality() {
        assert_eq!(
            validate_ballot(&session(VoteMode::Single), &ids(&["1", "2"]), "v"),
            Err(InvalidVote::TooManyChoices { count: 2 })
        );
    }
}
