//! Transport layer for the commit coordinator.
//!
//! Provides:
//! - Wire protocol (JSON request/response shapes)
//! - HTTP router (feature: http)

pub mod protocol;

#[cfg(feature = "http")]
pub mod http;

pub use protocol::{ErrorResponse, SessionCreated, SessionDetail, SessionStatus};
