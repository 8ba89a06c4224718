//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Delay before re-checking a secret that is still referenced (seconds)
    pub still_needed_requeue_secs: u64,
    /// How many times a write conflict re-runs the whole decision in-process
    pub max_conflict_retries: u32,
    /// Fibonacci error backoff floor (seconds)
    pub error_backoff_min_secs: u64,
    /// Fibonacci error backoff ceiling (seconds)
    pub error_backoff_max_secs: u64,
    /// Exponential backoff starting value for watch stream errors (milliseconds)
    pub backoff_start_ms: u64,
    /// Exponential backoff maximum value for watch stream errors (milliseconds)
    pub backoff_max_ms: u64,
    /// Watch stream restart delay after unknown errors (seconds)
    pub watch_restart_delay_secs: u64,
    /// Watch stream restart delay after stream ends (seconds)
    pub watch_restart_delay_after_end_secs: u64,
    /// Restrict secret and reference watches to one namespace (all namespaces when unset)
    pub watch_namespace: Option<String>,
    /// Namespace where the controller is deployed
    pub controller_namespace: String,
    /// Maximum concurrent reconciliations
    pub max_concurrent_reconciliations: u16,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    /// Enable color in text format logs
    pub log_enable_color: bool,
    /// ConfigMap watched for hot-reload (disabled when unset)
    pub config_map_name: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            still_needed_requeue_secs: DEFAULT_STILL_NEEDED_REQUEUE_SECS,
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
            error_backoff_min_secs: DEFAULT_ERROR_BACKOFF_MIN_SECS,
            error_backoff_max_secs: DEFAULT_ERROR_BACKOFF_MAX_SECS,
            backoff_start_ms: DEFAULT_BACKOFF_START_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            watch_restart_delay_after_end_secs: DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            watch_namespace: None,
            controller_namespace: DEFAULT_CONTROLLER_NAMESPACE.to_string(),
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            log_level: "INFO".to_string(),
            log_format: "json".to_string(),
            log_enable_color: false,
            config_map_name: None,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    ///
    /// Keys are the environment variable names. Missing or unparsable values fall back
    /// to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        use crate::constants::*;
        Self {
            still_needed_requeue_secs: parse_or(
                &lookup,
                "STILL_NEEDED_REQUEUE_SECS",
                DEFAULT_STILL_NEEDED_REQUEUE_SECS,
            ),
            max_conflict_retries: parse_or(
                &lookup,
                "MAX_CONFLICT_RETRIES",
                DEFAULT_MAX_CONFLICT_RETRIES,
            ),
            error_backoff_min_secs: parse_or(
                &lookup,
                "ERROR_BACKOFF_MIN_SECS",
                DEFAULT_ERROR_BACKOFF_MIN_SECS,
            ),
            error_backoff_max_secs: parse_or(
                &lookup,
                "ERROR_BACKOFF_MAX_SECS",
                DEFAULT_ERROR_BACKOFF_MAX_SECS,
            ),
            backoff_start_ms: parse_or(&lookup, "BACKOFF_START_MS", DEFAULT_BACKOFF_START_MS),
            backoff_max_ms: parse_or(&lookup, "BACKOFF_MAX_MS", DEFAULT_BACKOFF_MAX_MS),
            watch_restart_delay_secs: parse_or(
                &lookup,
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            watch_restart_delay_after_end_secs: parse_or(
                &lookup,
                "WATCH_RESTART_DELAY_AFTER_END_SECS",
                DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            ),
            watch_namespace: non_empty(&lookup, "WATCH_NAMESPACE"),
            controller_namespace: non_empty(&lookup, "POD_NAMESPACE")
                .unwrap_or_else(|| DEFAULT_CONTROLLER_NAMESPACE.to_string()),
            max_concurrent_reconciliations: parse_or(
                &lookup,
                "MAX_CONCURRENT_RECONCILIATIONS",
                DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            ),
            log_level: non_empty(&lookup, "LOG_LEVEL").unwrap_or_else(|| "INFO".to_string()),
            log_format: non_empty(&lookup, "LOG_FORMAT").unwrap_or_else(|| "json".to_string()),
            log_enable_color: bool_or(&lookup, "LOG_ENABLE_COLOR", false),
            config_map_name: non_empty(&lookup, "CONFIG_MAP_NAME"),
        }
    }

    /// Get the still-needed requeue duration
    pub fn still_needed_requeue_duration(&self) -> Duration {
        Duration::from_secs(self.still_needed_requeue_secs)
    }

    /// Get watch restart delay duration
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }

    /// Get watch restart delay after end duration
    pub fn watch_restart_delay_after_end_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_after_end_secs)
    }

    /// Default `EnvFilter` directive derived from `log_level`
    pub fn default_log_directive(&self) -> String {
        format!(
            "secret_protection_controller={}",
            self.log_level.to_lowercase()
        )
    }
}

pub(crate) fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

pub(crate) fn bool_or<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| {
            let v_lower = v.trim().to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|v| !v.trim().is_empty())
}
