//! # Reconciler
//!
//! Secret deletion protection.
//!
//! The reconciler:
//! - Watches `Secret` resources (all namespaces, or `WATCH_NAMESPACE`)
//! - Ignores secrets that are not being deleted under the `secret-protection` finalizer
//! - Probes every referencing kind for a resource in the same namespace that still
//!   names the secret in `spec.authSecretRef`
//! - Requeues while a reference exists, otherwise releases the finalizer

pub mod finalizer;
pub mod prober;
pub mod reconcile;
pub mod types;

// Re-export public API
pub use finalizer::{ensure_finalizer, has_finalizer, is_marked_for_deletion, remove_finalizer};
pub use prober::{first_holder, still_needed_by};
pub use reconcile::{reconcile, reconcile_secret};
pub use types::{BackoffState, GcSettings, GcState, IgnoreReason, Reconciler, ReconcilerError};
