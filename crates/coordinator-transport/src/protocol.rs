//! Wire protocol for client-server communication.
//!
//! Field names are camelCase and phases travel as their observer labels
//! (`"prepared-to-commit"`, `"commited"`, ...).

use coordinator_core::{
    Phase,
    traits::{Session, SessionId},
};
use serde::{Deserialize, Serialize};

/// Response to a session creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreated {
    pub session_id: SessionId,
}

/// Response to an accepted prepare or commit request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub session_id: SessionId,
    /// The requested phase, now queued for the coordinator.
    pub status: Phase,
}

/// Full view of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetail {
    pub session_id: SessionId,
    pub status: Phase,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<Session> for SessionDetail {
    fn from(session: Session) -> Self {
        Self {
            session_id: session.id,
            status: session.phase,
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

/// Error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    /// Create an error body.
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
