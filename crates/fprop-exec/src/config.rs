#![forbid(unsafe_code)]

//! Worker thread configuration.
//!
//! Defaults are overridable from the environment:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `FPROP_WORKER_NAME` | [`WorkerConfig::name`] |
//! | `FPROP_WORKER_STACK_SIZE` | [`WorkerConfig::stack_size`] (bytes) |

use crate::error::{ExecError, Result};

/// Environment key for the worker thread name.
pub const ENV_WORKER_NAME: &str = "FPROP_WORKER_NAME";
/// Environment key for the worker thread stack size, in bytes.
pub const ENV_WORKER_STACK_SIZE: &str = "FPROP_WORKER_STACK_SIZE";

/// Configuration for [`WorkerThread`](crate::WorkerThread).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Thread name, visible in debuggers and panic messages.
    /// Default: `"fprop-worker"`.
    pub name: String,

    /// Stack size for the spawned thread. `None` uses the platform default.
    pub stack_size: Option<usize>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "fprop-worker".into(),
            stack_size: None,
        }
    }
}

impl WorkerConfig {
    /// Set the thread name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the stack size in bytes.
    #[must_use]
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by a custom environment lookup.
    pub fn from_env_with<F>(get_env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(name) = get_env(ENV_WORKER_NAME) {
            let name = name.trim();
            if !name.is_empty() {
                config.name = name.to_string();
            }
        }
        if let Some(raw) = get_env(ENV_WORKER_STACK_SIZE) {
            let bytes = raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|&b| b > 0)
                .ok_or_else(|| ExecError::InvalidConfig {
                    key: ENV_WORKER_STACK_SIZE,
                    value: raw.clone(),
                })?;
            config.stack_size = Some(bytes);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.name, "fprop-worker");
        assert_eq!(config.stack_size, None);
    }

    #[test]
    fn builders() {
        let config = WorkerConfig::default()
            .with_name("ui")
            .with_stack_size(64 * 1024);
        assert_eq!(config.name, "ui");
        assert_eq!(config.stack_size, Some(64 * 1024));
    }

    #[test]
    fn env_overrides() {
        let config = WorkerConfig::from_env_with(lookup(&[
            (ENV_WORKER_NAME, "  bg-pool "),
            (ENV_WORKER_STACK_SIZE, "131072"),
        ]))
        .unwrap();
        assert_eq!(config.name, "bg-pool");
        assert_eq!(config.stack_size, Some(131_072));
    }

    #[test]
    fn empty_env_keeps_defaults() {
        let config = WorkerConfig::from_env_with(lookup(&[(ENV_WORKER_NAME, "   ")])).unwrap();
        assert_eq!(config, WorkerConfig::default());
    }

    #[test]
    fn bad_stack_size_is_rejected() {
        for bad in ["lots", "0", "-4"] {
            let err = WorkerConfig::from_env_with(lookup(&[(ENV_WORKER_STACK_SIZE, bad)]))
                .unwrap_err();
            assert!(
                matches!(err, ExecError::InvalidConfig { key, .. } if key == ENV_WORKER_STACK_SIZE),
                "unexpected error for {bad:?}: {err}"
            );
        }
    }
}
