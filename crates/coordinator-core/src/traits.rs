//! Core traits for session storage.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::Phase;

/// Session identifier.
pub type SessionId = Uuid;

/// Session filter for queries.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    /// Filter by phase.
    pub phase: Option<Phase>,
    /// Limit results.
    pub limit: Option<usize>,
}

/// Stored session record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier.
    pub id: SessionId,
    /// Current phase.
    pub phase: Phase,
    /// Creation timestamp (Unix epoch seconds).
    pub created_at: i64,
    /// Last update timestamp.
    pub updated_at: i64,
}

/// Storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Session not found: {0}")]
    NotFound(SessionId),
    #[error("Session {id} is already {phase}")]
    Terminal { id: SessionId, phase: Phase },
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Trait for session storage backends.
///
/// Only a session's own coordinator calls [`SessionStorage::set_phase`];
/// everything else reads.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Create a new session in [`Phase::Initialized`].
    async fn create(&self) -> Result<SessionId, StorageError>;

    /// Get a session by ID.
    async fn get(&self, id: SessionId) -> Result<Option<Session>, StorageError>;

    /// Overwrite the session's phase, returning the previous one.
    ///
    /// Fails with [`StorageError::Terminal`] once the stored phase is terminal.
    async fn set_phase(&self, id: SessionId, phase: Phase) -> Result<Phase, StorageError>;

    /// List sessions with optional filter.
    async fn list(&self, filter: SessionFilter) -> Result<Vec<Session>, StorageError>;

    /// Point-in-time view of every session's phase.
    async fn snapshot(&self) -> Result<HashMap<SessionId, Phase>, StorageError>;
}
