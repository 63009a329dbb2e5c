//! Session status state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a poll session.
///
/// Expiry is not a status: an expired session has no state left at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Session accepts votes.
    #[default]
    Active,
    /// Session has been closed by its organizer.
    Closed,
}

impl SessionStatus {
    /// Check if transition to target status is valid.
    ///
    /// Valid transitions:
    /// - Active -> Closed
    /// - Closed -> Closed (repeat close)
    pub fn can_transition_to(&self, target: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!((*self, target), (Active, Closed) | (Closed, Closed))
    }

    /// Attempt to transition to a new status.
    ///
    /// Returns `Ok(true)` if the status changed, `Ok(false)` for an accepted
    /// no-op, or an error if the transition is not allowed.
    pub fn transition_to(&mut self, target: SessionStatus) -> Result<bool, InvalidTransition> {
        if !self.can_transition_to(target) {
            return Err(InvalidTransition {
                from: *self,
                to: target,
            });
        }
        let changed = *self != target;
        *self = target;
        Ok(changed)
    }

    /// Check if the session accepts votes.
    pub fn accepts_votes(&self) -> bool {
        matches!(self, SessionStatus::Active)
    }
}

/// Rejected status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid status transition from {from:?} to {to:?}")]
pub struct InvalidTransition {
    pub from: SessionStatus,
    pub to: SessionStatus,
}
