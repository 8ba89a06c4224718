//! # Types
//!
//! Core types for the reconciler.

use crate::config::ControllerConfig;
use crate::controller::backoff::FibonacciBackoff;
use crate::crd::ReferenceKind;
use crate::store::{ReferenceLookup, SecretStore, StoreError};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("failed to fetch secret {key}: {source}")]
    FetchSecret {
        key: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to check {kind} references to {key}: {source}")]
    ReferenceCheck {
        kind: &'static str,
        key: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to remove finalizer from {key}: {source}")]
    RemoveFinalizer {
        key: String,
        #[source]
        source: StoreError,
    },
}

impl ReconcilerError {
    /// The store error behind this failure
    pub fn store_error(&self) -> &StoreError {
        match self {
            Self::FetchSecret { source, .. }
            | Self::ReferenceCheck { source, .. }
            | Self::RemoveFinalizer { source, .. } => source,
        }
    }
}

/// Why a trigger required no action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The secret no longer exists
    NotFound,
    /// Nobody has asked to delete the secret
    NotMarkedForDeletion,
    /// The protection finalizer is not (or no longer) on the secret
    NotProtected,
}

impl IgnoreReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            IgnoreReason::NotFound => "not-found",
            IgnoreReason::NotMarkedForDeletion => "not-marked-for-deletion",
            IgnoreReason::NotProtected => "not-protected",
        }
    }
}

/// Outcome of one evaluation of a secret
///
/// Recomputed from the stored secret on every trigger; nothing is carried over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcState {
    Ignore(IgnoreReason),
    /// A resource of `kind` still references the secret
    NeedsWait { kind: ReferenceKind },
    /// The protection finalizer was removed
    Released,
}

impl fmt::Display for GcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GcState::Ignore(reason) => write!(f, "ignore ({})", reason.as_str()),
            GcState::NeedsWait { kind } => write!(f, "needs-wait ({kind})"),
            GcState::Released => f.write_str("released"),
        }
    }
}

/// Per-trigger settings taken from the (hot-reloadable) controller configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcSettings {
    pub still_needed_requeue: Duration,
    pub max_conflict_retries: u32,
}

impl Default for GcSettings {
    fn default() -> Self {
        Self::from(&ControllerConfig::default())
    }
}

impl From<&ControllerConfig> for GcSettings {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            still_needed_requeue: config.still_needed_requeue_duration(),
            max_conflict_retries: config.max_conflict_retries,
        }
    }
}

/// Backoff state for a specific resource
/// Tracks error count and backoff calculator for progressive retries
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_secs, max_secs),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count += 1;
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

#[derive(Clone)]
pub struct Reconciler {
    pub secrets: Arc<dyn SecretStore>,
    pub references: Arc<dyn ReferenceLookup>,
    /// Probed in order, first holder wins
    pub kinds: &'static [ReferenceKind],
    // Backoff state per secret (identified by namespace/name)
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("kinds", &self.kinds.len())
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        secrets: Arc<dyn SecretStore>,
        references: Arc<dyn ReferenceLookup>,
        kinds: &'static [ReferenceKind],
    ) -> Self {
        Self {
            secrets,
            references,
            kinds,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Advance the error backoff for `key`, returning (delay seconds, error count)
    pub fn next_error_backoff(&self, key: &str, min_secs: u64, max_secs: u64) -> Option<(u64, u32)> {
        let mut states = self.backoff_states.lock().ok()?;
        let state = states
            .entry(key.to_string())
            .or_insert_with(|| BackoffState::new(min_secs, max_secs));
        state.increment_error();
        Some((state.backoff.next_backoff_seconds(), state.error_count))
    }

    /// Forget the error backoff for `key` after a successful reconciliation
    pub fn reset_backoff(&self, key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(key);
        }
    }
}
