//! Core abstractions for commit session coordination.
//!
//! This crate provides the fundamental building blocks:
//! - `Phase` - The commit protocol phases and their legal edges
//! - `PhaseLog` - Broadcast + history of phase changes
//! - `CoordinatorConfig` - Timeout and bind configuration
//! - Storage trait and session record

pub mod config;
pub mod phase;
pub mod phase_log;
pub mod traits;

pub use config::{ConfigError, CoordinatorConfig, DeadlinePolicy};
pub use phase::Phase;
pub use phase_log::{ChangeCause, PhaseChange, PhaseLog};
pub use traits::{SessionId, SessionStorage};
