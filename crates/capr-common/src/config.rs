//! Runtime configuration for management-cluster operations
//!
//! Values come from the process environment through [`EnvSource`] so tests
//! can inject them without touching global state.

use std::time::Duration;

use crate::CONTROLLER_NAME;

/// Default timeout bounding every call against a workload cluster
pub const DEFAULT_WORKLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment variable overriding [`DEFAULT_WORKLOAD_TIMEOUT`] (whole seconds)
pub const WORKLOAD_TIMEOUT_ENV: &str = "CAPR_WORKLOAD_TIMEOUT_SECS";

/// Trait for reading configuration from the environment
#[cfg_attr(test, mockall::automock)]
pub trait EnvSource: Send + Sync {
    /// Get a variable, `None` when unset
    fn var(&self, key: &str) -> Option<String>;
}

/// Default implementation that reads from process environment variables
#[derive(Clone, Default)]
pub struct OsEnv;

impl EnvSource for OsEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Configuration for the management cluster facade
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagementConfig {
    /// Connect/read timeout and per-call bound for workload cluster clients
    pub workload_timeout: Duration,
    /// Field manager recorded on objects this controller writes
    pub field_manager: String,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self::from_env(&OsEnv)
    }
}

impl ManagementConfig {
    /// Build configuration from an environment source
    ///
    /// Unset, unparseable or zero timeouts fall back to the default.
    pub fn from_env(env: &dyn EnvSource) -> Self {
        let workload_timeout = env
            .var(WORKLOAD_TIMEOUT_ENV)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_WORKLOAD_TIMEOUT);

        Self {
            workload_timeout,
            field_manager: CONTROLLER_NAME.to_string(),
        }
    }

    /// Override the workload timeout
    pub fn with_workload_timeout(mut self, timeout: Duration) -> Self {
        self.workload_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_thirty_seconds() {
        let mut env = MockEnvSource::new();
        env.expect_var().returning(|_| None);

        let config = ManagementConfig::from_env(&env);
        assert_eq!(config.workload_timeout, Duration::from_secs(30));
        assert_eq!(config.field_manager, "rke2-controlplane-controller");
    }

    #[test]
    fn reads_timeout_override() {
        let mut env = MockEnvSource::new();
        env.expect_var()
            .withf(|key| key == WORKLOAD_TIMEOUT_ENV)
            .returning(|_| Some("45".to_string()));

        let config = ManagementConfig::from_env(&env);
        assert_eq!(config.workload_timeout, Duration::from_secs(45));
    }

    #[test]
    fn ignores_garbage_and_zero() {
        for value in ["soon", "0", "-3", ""] {
            let mut env = MockEnvSource::new();
            let value = value.to_string();
            env.expect_var().returning(move |_| Some(value.clone()));

            let config = ManagementConfig::from_env(&env);
            assert_eq!(config.workload_timeout, DEFAULT_WORKLOAD_TIMEOUT);
        }
    }

    #[test]
    fn with_workload_timeout_overrides() {
        let mut env = MockEnvSource::new();
        env.expect_var().returning(|_| None);
        let config =
            ManagementConfig::from_env(&env).with_workload_timeout(Duration::from_secs(5));
        assert_eq!(config.workload_timeout, Duration::from_secs(5));
    }
}
