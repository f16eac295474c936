//! Broadcast + history log of session phase changes.

use std::{
    collections::VecDeque,
    sync::{PoisonError, RwLock},
    time::{SystemTime, UNIX_EPOCH},
};

use futures::{StreamExt, future};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::{Phase, SessionId};

/// Default history size limit (entries).
const HISTORY_LIMIT: usize = 10_000;

/// Live channel capacity. Slow subscribers skip what they miss.
const BROADCAST_CAPACITY: usize = 1024;

/// What caused a phase change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCause {
    /// Session was registered.
    Created,
    /// A prepare or commit signal was applied.
    Signal,
    /// The abort deadline elapsed.
    Timeout,
}

/// A single recorded phase change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseChange {
    pub session_id: SessionId,
    /// Phase before the change; `None` for creation.
    pub from: Option<Phase>,
    pub to: Phase,
    pub cause: ChangeCause,
    /// Unix epoch milliseconds.
    pub at: u64,
}

impl PhaseChange {
    /// Record a change stamped with the current wall clock.
    #[must_use]
    pub fn new(session_id: SessionId, from: Option<Phase>, to: Phase, cause: ChangeCause) -> Self {
        let at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Self {
            session_id,
            from,
            to,
            cause,
            at,
        }
    }

    /// Convert to an SSE event.
    ///
    /// # Errors
    /// Returns error if the change can't be serialized.
    #[cfg(feature = "sse")]
    pub fn to_sse_event(&self) -> Result<axum::response::sse::Event, axum::Error> {
        axum::response::sse::Event::default()
            .event("phase")
            .json_data(self)
    }
}

/// Phase-change log with broadcast and history support.
///
/// Late subscribers replay history then switch to live updates without
/// gaps or duplicates.
pub struct PhaseLog {
    history: RwLock<VecDeque<PhaseChange>>,
    sender: broadcast::Sender<PhaseChange>,
}

impl Default for PhaseLog {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseLog {
    /// Create a new phase log.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            history: RwLock::new(VecDeque::with_capacity(32)),
            sender,
        }
    }

    /// Record a change for both live listeners and history.
    pub fn push(&self, change: PhaseChange) {
        // Hold the write lock across the broadcast so a concurrent
        // `history_plus_stream` sees each change exactly once.
        let mut history = self
            .history
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let _ = self.sender.send(change.clone());
        if history.len() >= HISTORY_LIMIT {
            history.pop_front();
        }
        history.push_back(change);
    }

    /// Get a receiver for live updates.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PhaseChange> {
        self.sender.subscribe()
    }

    /// Get a snapshot of the history.
    #[must_use]
    pub fn history(&self) -> Vec<PhaseChange> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Stream that yields history first, then live updates.
    #[must_use]
    pub fn history_plus_stream(&self) -> futures::stream::BoxStream<'static, PhaseChange> {
        let (history, rx) = {
            let history = self
                .history
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            (history.iter().cloned().collect::<Vec<_>>(), self.sender.subscribe())
        };

        let hist = futures::stream::iter(history);
        let live = BroadcastStream::new(rx).filter_map(|res| future::ready(res.ok()));

        Box::pin(hist.chain(live))
    }

    /// Stream of one session's changes, ending after its terminal change.
    #[must_use]
    pub fn session_stream(
        &self,
        session_id: SessionId,
    ) -> futures::stream::BoxStream<'static, PhaseChange> {
        let changes = self
            .history_plus_stream()
            .filter(move |change| future::ready(change.session_id == session_id))
            .boxed();

        futures::stream::unfold(Some(changes), |state| async move {
            let mut changes = state?;
            let change = changes.next().await?;
            let rest = (!change.to.is_terminal()).then_some(changes);
            Some((change, rest))
        })
        .boxed()
    }

    /// SSE stream (requires `sse` feature).
    #[cfg(feature = "sse")]
    #[must_use]
    pub fn sse_stream(
        &self,
    ) -> futures::stream::BoxStream<'static, Result<axum::response::sse::Event, axum::Error>>
    {
        self.history_plus_stream()
            .map(|change| change.to_sse_event())
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn change(id: SessionId, from: Option<Phase>, to: Phase) -> PhaseChange {
        let cause = match (from, to) {
            (None, _) => ChangeCause::Created,
            (_, Phase::Aborted) => ChangeCause::Timeout,
            _ => ChangeCause::Signal,
        };
        PhaseChange::new(id, from, to, cause)
    }

    #[tokio::test]
    async fn test_history_then_live() {
        let log = PhaseLog::new();
        let id = Uuid::new_v4();
        log.push(change(id, None, Phase::Initialized));

        let mut stream = log.history_plus_stream();
        log.push(change(id, Some(Phase::Initialized), Phase::PreparedToCommit));

        let first = stream.next().await.unwrap();
        let second = stream.next().await.unwrap();
        assert_eq!(first.to, Phase::Initialized);
        assert_eq!(second.to, Phase::PreparedToCommit);
        assert_eq!(log.history().len(), 2);
    }

    #[tokio::test]
    async fn test_session_stream_ends_after_terminal() {
        let log = PhaseLog::new();
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();

        log.push(change(id, None, Phase::Initialized));
        log.push(change(other, None, Phase::Initialized));
        log.push(change(id, Some(Phase::Initialized), Phase::Aborted));
        log.push(change(other, Some(Phase::Initialized), Phase::PreparedToCommit));

        let phases: Vec<_> = log.session_stream(id).map(|c| c.to).collect().await;
        assert_eq!(phases, vec![Phase::Initialized, Phase::Aborted]);
    }

    #[test]
    fn test_history_is_bounded() {
        let log = PhaseLog::new();
        let id = Uuid::new_v4();
        for _ in 0..HISTORY_LIMIT + 5 {
            log.push(change(id, None, Phase::Initialized));
        }
        assert_eq!(log.history().len(), HISTORY_LIMIT);
    }

    #[test]
    fn test_change_serializes_camel_case() {
        let id = Uuid::new_v4();
        let json =
            serde_json::to_value(change(id, Some(Phase::PreparedToCommit), Phase::Committed))
                .unwrap();
        assert_eq!(json["sessionId"], id.to_string());
        assert_eq!(json["from"], "prepared-to-commit");
        assert_eq!(json["to"], "commited");
        assert_eq!(json["cause"], "signal");
    }
}
