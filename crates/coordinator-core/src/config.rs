//! Coordinator configuration.

use std::{net::SocketAddr, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default abort window for a session.
pub const DEFAULT_ABORT_TIMEOUT: Duration = Duration::from_secs(15);

const BIND_ADDR_VAR: &str = "COORDINATOR_BIND_ADDR";
const ABORT_TIMEOUT_VAR: &str = "COORDINATOR_ABORT_TIMEOUT_SECS";
const DEADLINE_POLICY_VAR: &str = "COORDINATOR_DEADLINE_POLICY";

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
    #[error("Abort timeout must be greater than zero")]
    ZeroTimeout,
}

/// When a session's abort deadline is armed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadlinePolicy {
    /// One window measured from coordinator start, never extended.
    #[default]
    Fixed,
    /// A fresh window after every applied non-terminal signal.
    Reset,
}

impl FromStr for DeadlinePolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "reset" => Ok(Self::Reset),
            _ => Err(()),
        }
    }
}

/// Coordinator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Address the HTTP transport listens on.
    pub bind_addr: SocketAddr,
    /// How long a session may stay uncommitted before it is aborted.
    pub abort_timeout: Duration,
    /// Whether signals extend the abort window.
    #[serde(default)]
    pub deadline_policy: DeadlinePolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            abort_timeout: DEFAULT_ABORT_TIMEOUT,
            deadline_policy: DeadlinePolicy::Fixed,
        }
    }
}

impl CoordinatorConfig {
    /// Set the abort timeout.
    #[must_use]
    pub const fn with_abort_timeout(mut self, abort_timeout: Duration) -> Self {
        self.abort_timeout = abort_timeout;
        self
    }

    /// Set the deadline policy.
    #[must_use]
    pub const fn with_deadline_policy(mut self, deadline_policy: DeadlinePolicy) -> Self {
        self.deadline_policy = deadline_policy;
        self
    }

    /// Load configuration from `COORDINATOR_*` environment variables.
    ///
    /// # Errors
    /// Returns error if a variable is set but can't be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    /// Returns error if a variable is set but can't be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(BIND_ADDR_VAR) {
            config.bind_addr = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                var: BIND_ADDR_VAR,
                value,
            })?;
        }

        if let Some(value) = lookup(ABORT_TIMEOUT_VAR) {
            let secs: u64 = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                var: ABORT_TIMEOUT_VAR,
                value,
            })?;
            if secs == 0 {
                return Err(ConfigError::ZeroTimeout);
            }
            config.abort_timeout = Duration::from_secs(secs);
        }

        if let Some(value) = lookup(DEADLINE_POLICY_VAR) {
            config.deadline_policy = value.parse().map_err(|()| ConfigError::InvalidValue {
                var: DEADLINE_POLICY_VAR,
                value,
            })?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = CoordinatorConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, CoordinatorConfig::default());
        assert_eq!(config.abort_timeout, Duration::from_secs(15));
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.deadline_policy, DeadlinePolicy::Fixed);
    }

    #[test]
    fn test_overrides() {
        let config = CoordinatorConfig::from_lookup(lookup(&[
            ("COORDINATOR_BIND_ADDR", "127.0.0.1:9000"),
            ("COORDINATOR_ABORT_TIMEOUT_SECS", "30"),
            ("COORDINATOR_DEADLINE_POLICY", "Reset"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr, SocketAddr::from(([127, 0, 0, 1], 9000)));
        assert_eq!(config.abort_timeout, Duration::from_secs(30));
        assert_eq!(config.deadline_policy, DeadlinePolicy::Reset);
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = CoordinatorConfig::from_lookup(lookup(&[("COORDINATOR_BIND_ADDR", "nope")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { var: "COORDINATOR_BIND_ADDR", .. }
        ));

        let err =
            CoordinatorConfig::from_lookup(lookup(&[("COORDINATOR_ABORT_TIMEOUT_SECS", "0")]))
                .unwrap_err();
        assert!(matches!(err, ConfigError::ZeroTimeout));

        let err =
            CoordinatorConfig::from_lookup(lookup(&[("COORDINATOR_DEADLINE_POLICY", "sliding")]))
                .unwrap_err();
        assert!(err.to_string().contains("COORDINATOR_DEADLINE_POLICY"));
    }

    #[test]
    fn test_serde_roundtrip_keeps_policy_default() {
        let json = r#"{"bind_addr":"127.0.0.1:8080","abort_timeout":{"secs":5,"nanos":0}}"#;
        let config: CoordinatorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.abort_timeout, Duration::from_secs(5));
        assert_eq!(config.deadline_policy, DeadlinePolicy::Fixed);
    }
}
