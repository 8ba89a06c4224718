//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loop.
//! This module handles reconciliation errors and watch stream errors.

use crate::config::SharedControllerConfig;
use crate::constants::{DEFAULT_ERROR_BACKOFF_MAX_SECS, DEFAULT_ERROR_BACKOFF_MIN_SECS};
use crate::controller::reconciler::{Reconciler, ReconcilerError};
use crate::observability;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Handle reconciliation errors with Fibonacci backoff
///
/// Backoff state is tracked per secret, so one failing secret does not slow down
/// the others.
pub fn handle_reconciliation_error(
    obj: Arc<Secret>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
    controller_config: &SharedControllerConfig,
) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.gc.reconciliation_error",
        secret.name = name.as_str(),
        secret.namespace = namespace.as_str(),
        error = %error
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation error for {}/{}: {:?}", namespace, name, error);
    observability::metrics::increment_reconciliation_errors();

    // The error policy is synchronous; fall back to defaults while a reload holds the lock
    let (min_secs, max_secs) = controller_config
        .try_read()
        .map(|config| (config.error_backoff_min_secs, config.error_backoff_max_secs))
        .unwrap_or((DEFAULT_ERROR_BACKOFF_MIN_SECS, DEFAULT_ERROR_BACKOFF_MAX_SECS));

    let resource_key = format!("{namespace}/{name}");
    let (backoff_seconds, error_count) = match ctx.next_error_backoff(&resource_key, min_secs, max_secs) {
        Some(next) => next,
        None => {
            warn!("Failed to lock backoff_states, using default backoff");
            (min_secs, 0)
        }
    };

    let next_trigger_time =
        chrono::Utc::now() + chrono::Duration::seconds(i64::try_from(backoff_seconds).unwrap_or(i64::MAX));
    info!(
        "Retrying {} with Fibonacci backoff: {}s (error count: {}, next attempt: {})",
        resource_key,
        backoff_seconds,
        error_count,
        next_trigger_time.to_rfc3339()
    );

    observability::metrics::increment_requeues("error-backoff");
    Action::requeue(Duration::from_secs(backoff_seconds))
}

/// Classification of a watch stream error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    /// 401 - credentials or RBAC revoked
    Unauthorized,
    /// 410 - resource version too old, the watch relists
    Expired,
    /// 429 - API server throttling or storage reinitializing
    TooManyRequests,
    /// 404 - the resource kind is not served
    NotFound,
    Other,
}

/// Classify a watch error from its debug representation
///
/// Drives logging and restarts of the Secret stream only. Index watches decide on the
/// typed error with `crate::index::watch_error_effect`.
pub fn classify_watch_error(error_string: &str) -> WatchErrorKind {
    // 404 is checked before 401: a plain-text 404 body surfaces as a serde error
    // that also mentions "WatchFailed"
    let is_not_found = error_string.contains("ObjectNotFound")
        || error_string.contains("404")
        || error_string.contains("NotFound")
        || error_string.contains("not found");
    if is_not_found {
        return WatchErrorKind::NotFound;
    }
    if error_string.contains("401") || error_string.contains("Unauthorized") {
        return WatchErrorKind::Unauthorized;
    }
    if error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired")
        || error_string.contains("Gone")
    {
        return WatchErrorKind::Expired;
    }
    if error_string.contains("429")
        || error_string.contains("storage is (re)initializing")
        || error_string.contains("TooManyRequests")
    {
        return WatchErrorKind::TooManyRequests;
    }
    WatchErrorKind::Other
}

/// Handle watch stream errors with appropriate classification and backoff
///
/// Returns `None` to filter out the error (allow restart) or `Some(())` to continue.
pub async fn handle_watch_stream_error(
    error_string: &str,
    backoff: &Arc<AtomicU64>,
    max_backoff_ms: u64,
    watch_restart_delay: Duration,
) -> Option<()> {
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        error = %error_string
    );
    let _error_guard = error_span.enter();

    match classify_watch_error(error_string) {
        WatchErrorKind::Unauthorized => {
            error!(
                "Watch authentication failed (401 Unauthorized) - RBAC may have been revoked or token expired"
            );
            error!("Verify the controller ServiceAccount can still list and watch secrets:");
            error!(
                "  kubectl auth can-i watch secrets --as=system:serviceaccount:<namespace>:secret-protection-controller --all-namespaces"
            );
            warn!(
                "Waiting {}s before retrying watch (RBAC may need time to propagate)...",
                watch_restart_delay.as_secs()
            );
            tokio::time::sleep(watch_restart_delay).await;
            None
        }
        WatchErrorKind::Expired => {
            warn!(
                "Watch resource version expired (410) - this is normal during pod restarts, watch will restart"
            );
            warn!(error_type = "410", "watch.error.resource_version_expired");
            None
        }
        WatchErrorKind::TooManyRequests => {
            let current_backoff = backoff.load(Ordering::Relaxed);
            warn!(
                "API server storage reinitializing (429), backing off for {}ms before restart...",
                current_backoff
            );
            tokio::time::sleep(Duration::from_millis(current_backoff)).await;
            let new_backoff = std::cmp::min(current_backoff.saturating_mul(2), max_backoff_ms);
            backoff.store(new_backoff, Ordering::Relaxed);
            None
        }
        WatchErrorKind::NotFound => {
            warn!(
                "Resource not found (404) - this is normal when a secret is deleted during reconciliation. Error: {}",
                error_string
            );
            Some(())
        }
        WatchErrorKind::Other => {
            error!("Controller stream error: {}", error_string);
            tokio::time::sleep(watch_restart_delay).await;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_watch_error() {
        assert_eq!(
            classify_watch_error("InitialListFailed(Api(Status { code: 404, reason: \"NotFound\" }))"),
            WatchErrorKind::NotFound
        );
        assert_eq!(
            classify_watch_error("WatchFailed(Api(Status { code: 401, reason: \"Unauthorized\" }))"),
            WatchErrorKind::Unauthorized
        );
        assert_eq!(
            classify_watch_error("WatchError(Status { code: 410, message: \"too old resource version\" })"),
            WatchErrorKind::Expired
        );
        assert_eq!(
            classify_watch_error("storage is (re)initializing"),
            WatchErrorKind::TooManyRequests
        );
        assert_eq!(classify_watch_error("connection reset by peer"), WatchErrorKind::Other);
    }

    #[tokio::test(start_paused = true)]
    async fn test_too_many_requests_doubles_backoff_up_to_max() {
        let backoff = Arc::new(AtomicU64::new(1000));
        assert!(handle_watch_stream_error("429 TooManyRequests", &backoff, 3000, Duration::from_secs(1)).await.is_none());
        assert_eq!(backoff.load(Ordering::Relaxed), 2000);
        assert!(handle_watch_stream_error("429 TooManyRequests", &backoff, 3000, Duration::from_secs(1)).await.is_none());
        assert_eq!(backoff.load(Ordering::Relaxed), 3000);
    }

    #[tokio::test]
    async fn test_not_found_continues_stream() {
        let backoff = Arc::new(AtomicU64::new(1000));
        assert!(handle_watch_stream_error("ObjectNotFound", &backoff, 3000, Duration::from_secs(1)).await.is_some());
    }
}
