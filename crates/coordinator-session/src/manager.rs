//! Session manager: the registry every request handler goes through.

use std::{collections::HashMap, sync::Arc, time::Duration};

use coordinator_core::{
    ChangeCause, CoordinatorConfig, DeadlinePolicy, Phase, PhaseChange, PhaseLog,
    traits::{Session, SessionFilter, SessionId, SessionStorage, StorageError},
};
use tokio::{
    sync::{RwLock, mpsc, mpsc::error::TrySendError},
    task::JoinHandle,
};

use crate::coordinator::Coordinator;

/// Prepare and commit may both be queued before the coordinator wakes up.
const EVENT_CAPACITY: usize = 2;

/// Session manager error.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Session not found: {0}")]
    NotFound(SessionId),
    #[error("Session {id} cannot move to {requested} from {current}")]
    InvalidTransition {
        id: SessionId,
        requested: Phase,
        current: Phase,
    },
    #[error("Session {0} has no room for another signal")]
    ChannelFull(SessionId),
}

/// Registry-side view of a live session.
struct SessionHandle {
    events: mpsc::Sender<Phase>,
    /// Furthest phase accepted for delivery. Runs ahead of the stored
    /// phase until the coordinator drains its queue.
    accepted: Phase,
    worker: JoinHandle<Phase>,
}

/// Session manager for commit sessions.
///
/// Owns the storage, the control channel of every session and the phase
/// log. Phases are only ever written by each session's coordinator; the
/// manager validates and enqueues requests.
pub struct SessionManager<S>
where
    S: SessionStorage,
{
    storage: Arc<S>,
    log: Arc<PhaseLog>,
    abort_timeout: Duration,
    deadline_policy: DeadlinePolicy,
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
}

impl<S> SessionManager<S>
where
    S: SessionStorage + 'static,
{
    /// Create a new session manager.
    #[must_use]
    pub fn new(storage: S, config: &CoordinatorConfig) -> Self {
        Self {
            storage: Arc::new(storage),
            log: Arc::new(PhaseLog::new()),
            abort_timeout: config.abort_timeout,
            deadline_policy: config.deadline_policy,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Phase-change log shared with every coordinator.
    #[must_use]
    pub const fn phase_log(&self) -> &Arc<PhaseLog> {
        &self.log
    }

    /// Create a session in [`Phase::Initialized`] and spawn its coordinator.
    ///
    /// # Errors
    /// Returns error if the storage backend fails.
    pub async fn create_session(&self) -> Result<SessionId, ManagerError> {
        // Held across registration so no request can see the stored
        // session without its handle.
        let mut sessions = self.sessions.write().await;

        let session_id = self.storage.create().await?;
        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);

        self.log.push(PhaseChange::new(
            session_id,
            None,
            Phase::Initialized,
            ChangeCause::Created,
        ));

        let worker = Coordinator::new(
            session_id,
            Arc::clone(&self.storage),
            Arc::clone(&self.log),
            events_rx,
            self.abort_timeout,
            self.deadline_policy,
        )
        .spawn();

        sessions.insert(
            session_id,
            SessionHandle {
                events: events_tx,
                accepted: Phase::Initialized,
                worker,
            },
        );

        Ok(session_id)
    }

    /// Get a session record.
    ///
    /// # Errors
    /// Returns error if the storage backend fails.
    pub async fn get_session(&self, session_id: SessionId) -> Result<Option<Session>, ManagerError> {
        Ok(self.storage.get(session_id).await?)
    }

    /// Point-in-time phase of every tracked session.
    ///
    /// # Errors
    /// Returns error if the storage backend fails.
    pub async fn snapshot(&self) -> Result<HashMap<SessionId, Phase>, ManagerError> {
        Ok(self.storage.snapshot().await?)
    }

    /// List session records.
    ///
    /// # Errors
    /// Returns error if the storage backend fails.
    pub async fn list_sessions(&self, filter: SessionFilter) -> Result<Vec<Session>, ManagerError> {
        Ok(self.storage.list(filter).await?)
    }

    /// Whether the session's coordinator is still running.
    ///
    /// Returns `None` for unknown sessions.
    pub async fn is_worker_running(&self, session_id: SessionId) -> Option<bool> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .map(|handle| !handle.worker.is_finished())
    }

    /// Ask the session's coordinator to prepare.
    ///
    /// # Errors
    /// See [`Self::request_transition`].
    pub async fn request_prepare(&self, session_id: SessionId) -> Result<Phase, ManagerError> {
        self.request_transition(session_id, Phase::PreparedToCommit)
            .await
    }

    /// Ask the session's coordinator to commit.
    ///
    /// # Errors
    /// See [`Self::request_transition`].
    pub async fn request_commit(&self, session_id: SessionId) -> Result<Phase, ManagerError> {
        self.request_transition(session_id, Phase::Committed).await
    }

    /// Validate a requested phase and enqueue it for the session's coordinator.
    ///
    /// Success means the request was queued, not applied: the deadline may
    /// still abort the session first.
    ///
    /// # Errors
    /// Returns [`ManagerError::NotFound`] for unknown sessions and
    /// [`ManagerError::InvalidTransition`] when the request doesn't follow
    /// the session's current phase, including any terminal phase.
    pub async fn request_transition(
        &self,
        session_id: SessionId,
        requested: Phase,
    ) -> Result<Phase, ManagerError> {
        let mut sessions = self.sessions.write().await;
        let handle = sessions
            .get_mut(&session_id)
            .ok_or(ManagerError::NotFound(session_id))?;

        let stored = self.stored_phase(session_id).await?;
        let current = if stored.is_terminal() {
            stored
        } else {
            handle.accepted
        };

        if !requested.can_follow(current) {
            return Err(ManagerError::InvalidTransition {
                id: session_id,
                requested,
                current,
            });
        }

        match handle.events.try_send(requested) {
            Ok(()) => {
                handle.accepted = requested;
                tracing::debug!("Session {session_id} queued {requested}");
                Ok(requested)
            }
            Err(TrySendError::Full(_)) => Err(ManagerError::ChannelFull(session_id)),
            Err(TrySendError::Closed(_)) => Err(ManagerError::InvalidTransition {
                id: session_id,
                requested,
                current: self.stored_phase(session_id).await?,
            }),
        }
    }

    async fn stored_phase(&self, session_id: SessionId) -> Result<Phase, ManagerError> {
        self.storage
            .get(session_id)
            .await?
            .map(|session| session.phase)
            .ok_or(ManagerError::NotFound(session_id))
    }
}
