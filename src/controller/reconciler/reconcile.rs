//! # Reconcile
//!
//! Decides, for one secret, whether the protection finalizer may be released.
//!
//! ## Flow
//!
//! 1. Fetch the secret. Gone means there is nothing left to do.
//! 2. Skip secrets that are not being deleted or do not carry our finalizer.
//! 3. Probe each referencing kind in order, stopping at the first holder.
//!    - A holder means wait: the secret is requeued after a fixed delay.
//!    - No holder: remove only our finalizer with a resourceVersion precondition.
//!
//! A conflicting write re-runs the whole flow from step 1, since the reference check
//! may be just as stale as the secret.

use crate::config::SharedControllerConfig;
use crate::constants::SECRET_PROTECTION_FINALIZER;
use crate::controller::reconciler::finalizer::{
    has_finalizer, is_marked_for_deletion, remove_finalizer,
};
use crate::controller::reconciler::prober::first_holder;
use crate::controller::reconciler::types::{
    GcSettings, GcState, IgnoreReason, Reconciler, ReconcilerError,
};
use crate::observability;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn, Instrument};

/// Evaluate the secret `namespace/name` once
pub async fn reconcile_secret(
    ctx: &Reconciler,
    namespace: &str,
    name: &str,
    settings: &GcSettings,
) -> Result<GcState, ReconcilerError> {
    let key = format!("{namespace}/{name}");
    let mut conflicts = 0u32;

    loop {
        let secret = match ctx.secrets.get_secret(namespace, name).await {
            Ok(Some(secret)) => secret,
            Ok(None) => return Ok(GcState::Ignore(IgnoreReason::NotFound)),
            Err(e) if e.is_not_found() => return Ok(GcState::Ignore(IgnoreReason::NotFound)),
            Err(source) => return Err(ReconcilerError::FetchSecret { key, source }),
        };

        if !is_marked_for_deletion(&secret) {
            return Ok(GcState::Ignore(IgnoreReason::NotMarkedForDeletion));
        }
        if !has_finalizer(&secret, SECRET_PROTECTION_FINALIZER) {
            return Ok(GcState::Ignore(IgnoreReason::NotProtected));
        }

        debug!(
            secret.name = name,
            secret.namespace = namespace,
            resource_version = secret.resource_version().as_deref().unwrap_or("unknown"),
            "gc.pending"
        );

        if let Some(kind) = first_holder(ctx.references.as_ref(), &secret, ctx.kinds).await? {
            return Ok(GcState::NeedsWait { kind: *kind });
        }

        match remove_finalizer(ctx.secrets.as_ref(), &secret, SECRET_PROTECTION_FINALIZER).await {
            Ok(_) => return Ok(GcState::Released),
            Err(e) if e.is_not_found() => return Ok(GcState::Ignore(IgnoreReason::NotFound)),
            Err(e) if e.is_conflict() => {
                observability::metrics::increment_conflicts();
                if conflicts >= settings.max_conflict_retries {
                    return Err(ReconcilerError::RemoveFinalizer { key, source: e });
                }
                conflicts += 1;
                debug!(
                    secret.name = name,
                    secret.namespace = namespace,
                    attempt = conflicts,
                    "gc.conflict, re-evaluating"
                );
            }
            Err(source) => return Err(ReconcilerError::RemoveFinalizer { key, source }),
        }
    }
}

/// Only secrets being deleted under our finalizer need a fresh read
fn needs_evaluation(secret: &Secret) -> bool {
    is_marked_for_deletion(secret) && has_finalizer(secret, SECRET_PROTECTION_FINALIZER)
}

/// Controller entry point for one secret trigger
pub async fn reconcile(
    secret: Arc<Secret>,
    ctx: Arc<Reconciler>,
    controller_config: SharedControllerConfig,
) -> Result<Action, ReconcilerError> {
    let name = secret.name_any();
    let namespace = secret.namespace().unwrap_or_default();
    let key = format!("{namespace}/{name}");

    // The triggering object is a watch snapshot; any later change triggers again
    if !needs_evaluation(&secret) {
        return Ok(Action::await_change());
    }

    let settings = {
        let config = controller_config.read().await;
        GcSettings::from(&*config)
    };

    let span = tracing::info_span!(
        "controller.gc.reconcile",
        secret.name = name.as_str(),
        secret.namespace = namespace.as_str(),
    );

    async move {
        let start = Instant::now();
        observability::metrics::increment_reconciliations();

        let result = reconcile_secret(&ctx, &namespace, &name, &settings).await;
        observability::metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

        let state = match result {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "gc.reconcile_failed");
                return Err(e);
            }
        };
        ctx.reset_backoff(&key);

        match state {
            GcState::Ignore(reason) => {
                debug!(reason = reason.as_str(), "gc.ignore");
                Ok(Action::await_change())
            }
            GcState::NeedsWait { kind } => {
                info!(
                    kind = kind.kind,
                    requeue_secs = settings.still_needed_requeue.as_secs(),
                    "Secret {} is still referenced by a {}, deferring deletion",
                    key,
                    kind
                );
                observability::metrics::increment_still_needed(kind.kind);
                observability::metrics::increment_requeues("still-needed");
                Ok(Action::requeue(settings.still_needed_requeue))
            }
            GcState::Released => {
                info!("Released {} finalizer from secret {}", SECRET_PROTECTION_FINALIZER, key);
                observability::metrics::increment_finalizers_removed();
                Ok(Action::await_change())
            }
        }
    }
    .instrument(span)
    .await
}
