//! Commit protocol phases.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Phase of a commit session.
///
/// Legal edges form a small DAG:
///
/// ```text
/// Initialized ──prepare──> PreparedToCommit ──commit──> Committed
///      │                          │
///      └───────timeout───────> Aborted <──timeout───────┘
/// ```
///
/// The serialized form is the observer-facing label, including the
/// historical `"commited"` spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Session created, waiting for a prepare signal.
    #[serde(rename = "Initialized")]
    Initialized,
    /// Prepare received, waiting for a commit signal.
    #[serde(rename = "prepared-to-commit")]
    PreparedToCommit,
    /// Deadline elapsed before the session committed.
    #[serde(rename = "aborted")]
    Aborted,
    /// Commit received.
    #[serde(rename = "commited")]
    Committed,
}

impl Phase {
    /// All phases, in declaration order.
    pub const ALL: [Self; 4] = [
        Self::Initialized,
        Self::PreparedToCommit,
        Self::Aborted,
        Self::Committed,
    ];

    /// Stable label shown to observers.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Initialized => "Initialized",
            Self::PreparedToCommit => "prepared-to-commit",
            Self::Aborted => "aborted",
            Self::Committed => "commited",
        }
    }

    /// Whether no further transitions may leave this phase.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Aborted | Self::Committed)
    }

    /// The phase a session must be in before a signal may request `self`.
    ///
    /// `None` means the phase can't be requested by a signal at all:
    /// `Initialized` is only entered at creation and `Aborted` only on timeout.
    #[must_use]
    pub const fn required_predecessor(self) -> Option<Self> {
        match self {
            Self::PreparedToCommit => Some(Self::Initialized),
            Self::Committed => Some(Self::PreparedToCommit),
            Self::Initialized | Self::Aborted => None,
        }
    }

    /// Whether a signal requesting `self` is legal while the session is in `current`.
    #[must_use]
    pub fn can_follow(self, current: Self) -> bool {
        self.required_predecessor() == Some(current)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error returned when a label doesn't name a phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown phase label: {0}")]
pub struct ParsePhaseError(pub String);

impl FromStr for Phase {
    type Err = ParsePhaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|phase| phase.label() == s)
            .ok_or_else(|| ParsePhaseError(s.to_string()))
    }
}
