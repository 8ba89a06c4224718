//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Finalizer token this controller owns on credential secrets
///
/// Other finalizers on the same secret belong to other holders and are never touched.
pub const SECRET_PROTECTION_FINALIZER: &str = "secret-protection";

/// Index key used to look up resources by the name of the secret they authenticate with
pub const SECRET_REF_INDEX_KEY: &str = "spec.authSecretRef.name";

/// Field manager name used when patching secrets
pub const FIELD_MANAGER: &str = "secret-protection-controller";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default delay before re-checking a secret that is still referenced (seconds)
pub const DEFAULT_STILL_NEEDED_REQUEUE_SECS: u64 = 10;

/// Default number of in-process re-evaluations after a write conflict
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;

/// Default Fibonacci error backoff floor (seconds)
pub const DEFAULT_ERROR_BACKOFF_MIN_SECS: u64 = 5;

/// Default Fibonacci error backoff ceiling (seconds)
pub const DEFAULT_ERROR_BACKOFF_MAX_SECS: u64 = 300;

/// Default exponential backoff starting value for watch stream errors (milliseconds)
pub const DEFAULT_BACKOFF_START_MS: u64 = 1000;

/// Default exponential backoff maximum value for watch stream errors (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;

/// Default delay before restarting watch stream after unknown errors (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default delay before restarting watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS: u64 = 1;

/// Default maximum number of secrets reconciled at the same time
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;

/// Namespace the controller assumes when `POD_NAMESPACE` is not set
pub const DEFAULT_CONTROLLER_NAMESPACE: &str = "aiven-operator-system";
