//! In-memory session storage.

use std::{
    collections::HashMap,
    sync::RwLock,
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use coordinator_core::{
    Phase,
    traits::{Session, SessionFilter, SessionId, SessionStorage, StorageError},
};
use uuid::Uuid;

/// In-memory storage implementation.
///
/// Sessions are never evicted and are lost on restart.
pub struct MemoryStorage {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl MemoryStorage {
    /// Create a new in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[async_trait]
impl SessionStorage for MemoryStorage {
    async fn create(&self) -> Result<SessionId, StorageError> {
        let timestamp = now();
        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?;

        let mut id = Uuid::new_v4();
        while sessions.contains_key(&id) {
            id = Uuid::new_v4();
        }

        sessions.insert(
            id,
            Session {
                id,
                phase: Phase::Initialized,
                created_at: timestamp,
                updated_at: timestamp,
            },
        );

        Ok(id)
    }

    async fn get(&self, id: SessionId) -> Result<Option<Session>, StorageError> {
        Ok(self
            .sessions
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .get(&id)
            .cloned())
    }

    async fn set_phase(&self, id: SessionId, phase: Phase) -> Result<Phase, StorageError> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?;

        let session = sessions.get_mut(&id).ok_or(StorageError::NotFound(id))?;

        if session.phase.is_terminal() {
            return Err(StorageError::Terminal {
                id,
                phase: session.phase,
            });
        }

        let previous = std::mem::replace(&mut session.phase, phase);
        session.updated_at = now();

        Ok(previous)
    }

    async fn list(&self, filter: SessionFilter) -> Result<Vec<Session>, StorageError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?;

        let mut result: Vec<Session> = sessions
            .values()
            .filter(|s| filter.phase.is_none_or(|phase| s.phase == phase))
            .cloned()
            .collect();

        // Sort by created_at descending
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        if let Some(limit) = filter.limit {
            result.truncate(limit);
        }

        Ok(result)
    }

    async fn snapshot(&self) -> Result<HashMap<SessionId, Phase>, StorageError> {
        Ok(self
            .sessions
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .iter()
            .map(|(id, session)| (*id, session.phase))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    #[tokio::test]
    async fn test_create_starts_initialized() {
        let storage = MemoryStorage::new();
        let id = assert_ok!(storage.create().await);

        let session = storage.get(id).await.unwrap().unwrap();
        assert_eq!(session.id, id);
        assert_eq!(session.phase, Phase::Initialized);
        assert_eq!(session.created_at, session.updated_at);
    }

    #[tokio::test]
    async fn test_get_unknown_is_none() {
        let storage = MemoryStorage::new();
        assert!(storage.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_phase_returns_previous() {
        let storage = MemoryStorage::new();
        let id = storage.create().await.unwrap();

        let previous = assert_ok!(storage.set_phase(id, Phase::PreparedToCommit).await);
        assert_eq!(previous, Phase::Initialized);
        assert_eq!(
            storage.get(id).await.unwrap().unwrap().phase,
            Phase::PreparedToCommit
        );
    }

    #[tokio::test]
    async fn test_terminal_phase_is_sticky() {
        let storage = MemoryStorage::new();
        let id = storage.create().await.unwrap();
        storage.set_phase(id, Phase::Aborted).await.unwrap();

        let err = assert_err!(storage.set_phase(id, Phase::Committed).await);
        assert!(matches!(
            err,
            StorageError::Terminal {
                phase: Phase::Aborted,
                ..
            }
        ));
        assert_eq!(storage.get(id).await.unwrap().unwrap().phase, Phase::Aborted);
    }

    #[tokio::test]
    async fn test_set_phase_unknown_session() {
        let storage = MemoryStorage::new();
        let err = assert_err!(storage.set_phase(Uuid::new_v4(), Phase::Committed).await);
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_filters_by_phase() {
        let storage = MemoryStorage::new();
        let a = storage.create().await.unwrap();
        let b = storage.create().await.unwrap();
        storage.set_phase(b, Phase::PreparedToCommit).await.unwrap();

        let prepared = storage
            .list(SessionFilter {
                phase: Some(Phase::PreparedToCommit),
                limit: None,
            })
            .await
            .unwrap();
        assert_eq!(prepared.len(), 1);
        assert_eq!(prepared[0].id, b);

        let limited = storage
            .list(SessionFilter {
                phase: None,
                limit: Some(1),
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);

        let snapshot = storage.snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[&a], Phase::Initialized);
        assert_eq!(snapshot[&b], Phase::PreparedToCommit);
    }
}
