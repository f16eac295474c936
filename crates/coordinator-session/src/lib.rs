//! Session registry and per-session commit coordinators.
//!
//! Provides:
//! - `SessionManager` - Create sessions and route prepare/commit signals
//! - `Coordinator` - The single writer of one session's phase
//! - Storage implementations (memory)

mod coordinator;
pub mod manager;
pub mod storage;

pub use manager::{ManagerError, SessionManager};
