//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use secret_protection_controller::prelude::*;
//! ```

// Referencing kinds and the secret reference they declare
pub use crate::crd::*;

// Store contracts and their Kubernetes implementations
pub use crate::store::{
    ApiReferenceLookup, KubeSecretStore, ObjectKey, ReferenceLookup, SecretStore, StoreError,
};

// Reference index
pub use crate::index::{register_reference_indexes, FieldIndexer, SyncState};

// Reconciler types - core controller functionality
pub use crate::controller::reconciler::{
    ensure_finalizer, has_finalizer, is_marked_for_deletion, reconcile, reconcile_secret,
    remove_finalizer, still_needed_by, BackoffState, GcSettings, GcState, IgnoreReason,
    Reconciler, ReconcilerError,
};

// Config types - for configuration management
pub use crate::config::{
    ControllerConfig, ServerConfig, SharedControllerConfig, SharedServerConfig,
};

pub use crate::constants::SECRET_PROTECTION_FINALIZER;
