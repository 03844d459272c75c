//! Watch session domain types
//!
//! The watch loop itself lives in `bucketsync-sync`; this module holds the
//! lifecycle state and the summary handed out by the session registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::SessionId;
use super::target::SyncTarget;

/// Lifecycle state of a watch session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Constructed, file-event subscription not yet established
    #[default]
    Created,
    /// Subscribed and reacting to file events
    Watching,
    /// Stop requested; waiting for the in-flight reconciliation
    Stopping,
    /// Terminal
    Stopped,
}

impl SessionState {
    /// Returns true while the session reacts to file events
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Watching)
    }

    /// Checks if a lifecycle transition is valid
    ///
    /// Valid transitions:
    /// - Created -> Watching, Stopped (subscription failed)
    /// - Watching -> Stopping
    /// - Stopping -> Stopped
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        matches!(
            (self, target),
            (SessionState::Created, SessionState::Watching)
                | (SessionState::Created, SessionState::Stopped)
                | (SessionState::Watching, SessionState::Stopping)
                | (SessionState::Stopping, SessionState::Stopped)
        )
    }

    /// Returns the new state if the transition is allowed
    ///
    /// # Errors
    /// Returns `DomainError::InvalidState` for any other transition
    pub fn transition_to(self, target: SessionState) -> Result<SessionState, DomainError> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(DomainError::InvalidState {
                from: self.to_string(),
                to: target.to_string(),
            })
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Created => write!(f, "created"),
            SessionState::Watching => write!(f, "watching"),
            SessionState::Stopping => write!(f, "stopping"),
            SessionState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Read-only view of a registered watch session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub target: SyncTarget,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    /// End time of the last successful reconciliation
    pub last_sync: Option<DateTime<Utc>>,
}

impl SessionSummary {
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }
}
