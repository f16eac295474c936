//! Per-session coordinator task.

use std::{sync::Arc, time::Duration};

use coordinator_core::{
    ChangeCause, DeadlinePolicy, Phase, PhaseChange, PhaseLog, SessionId, SessionStorage,
    traits::StorageError,
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, sleep_until},
};

/// The single writer of one session's phase.
///
/// Waits for either the next requested phase on its channel or the abort
/// deadline, whichever comes first, and exits once the session is terminal.
pub(crate) struct Coordinator<S> {
    session_id: SessionId,
    storage: Arc<S>,
    log: Arc<PhaseLog>,
    events: mpsc::Receiver<Phase>,
    abort_timeout: Duration,
    deadline_policy: DeadlinePolicy,
}

impl<S> Coordinator<S>
where
    S: SessionStorage + 'static,
{
    pub(crate) const fn new(
        session_id: SessionId,
        storage: Arc<S>,
        log: Arc<PhaseLog>,
        events: mpsc::Receiver<Phase>,
        abort_timeout: Duration,
        deadline_policy: DeadlinePolicy,
    ) -> Self {
        Self {
            session_id,
            storage,
            log,
            events,
            abort_timeout,
            deadline_policy,
        }
    }

    /// Run on the tokio runtime. The handle resolves to the final phase.
    pub(crate) fn spawn(self) -> JoinHandle<Phase> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) -> Phase {
        let id = self.session_id;
        tracing::info!("Started session {id}");

        let mut current = Phase::Initialized;
        let mut deadline = Instant::now() + self.abort_timeout;
        let mut senders_gone = false;

        loop {
            tokio::select! {
                event = self.events.recv(), if !senders_gone => {
                    let Some(next) = event else {
                        tracing::debug!("Session {id} has no signal senders left, waiting for deadline");
                        senders_gone = true;
                        continue;
                    };

                    if !next.can_follow(current) {
                        tracing::warn!("Session {id} ignored {next} while {current}");
                        continue;
                    }

                    if let Err(e) = self.apply(current, next, ChangeCause::Signal).await {
                        tracing::error!("Session {id} failed to apply {next}: {e}");
                        return current;
                    }
                    tracing::debug!("Session {id} changed from {current}, to {next}");
                    current = next;

                    if current.is_terminal() {
                        tracing::info!("Session {id} finished");
                        return current;
                    }

                    if self.deadline_policy == DeadlinePolicy::Reset {
                        deadline = Instant::now() + self.abort_timeout;
                    }
                }
                () = sleep_until(deadline) => {
                    tracing::info!("Session {id} timed out at state {current}");
                    if let Err(e) = self.apply(current, Phase::Aborted, ChangeCause::Timeout).await {
                        tracing::error!("Session {id} failed to abort: {e}");
                        return current;
                    }
                    return Phase::Aborted;
                }
            }
        }
    }

    async fn apply(
        &self,
        from: Phase,
        to: Phase,
        cause: ChangeCause,
    ) -> Result<(), StorageError> {
        self.storage.set_phase(self.session_id, to).await?;
        self.log
            .push(PhaseChange::new(self.session_id, Some(from), to, cause));
        Ok(())
    }
}
