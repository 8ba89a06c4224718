//! # Object Store
//!
//! The narrow contracts this controller needs from the object store.
//!
//! - `SecretStore` reads secrets and writes their finalizer list under an
//!   optimistic-concurrency precondition
//! - `ReferenceLookup` answers capped, namespace-scoped reference queries
//!
//! `kubernetes.rs` implements both against the Kubernetes API. The cached
//! `ReferenceLookup` used by the controller lives in `crate::index`.

use crate::crd::ReferenceKind;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use std::fmt;
use thiserror::Error;

pub mod kubernetes;

pub use self::kubernetes::{ApiReferenceLookup, KubeSecretStore};

/// Errors returned by store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// The object, or the resource kind itself, does not exist
    #[error("not found: {0}")]
    NotFound(String),
    /// The resourceVersion precondition of a write no longer holds
    #[error("conflict: {0}")]
    Conflict(String),
    /// A conditional write was attempted without a resourceVersion to condition on
    #[error("{0} has no resourceVersion")]
    MissingResourceVersion(String),
    /// The index for a kind has not completed its initial list yet
    #[error("index for {kind} has not synced yet")]
    NotSynced { kind: &'static str },
    /// A query named an index that was never registered
    #[error("no index {field_key} registered for {kind}")]
    UnknownIndex {
        kind: &'static str,
        field_key: String,
    },
    /// An index was registered twice
    #[error("index {field_key} is already registered for {kind}")]
    IndexConflict {
        kind: &'static str,
        field_key: String,
    },
    /// Any other API failure
    #[error("kubernetes error: {0}")]
    Kube(#[source] ::kube::Error),
}

impl StoreError {
    /// Classify a Kubernetes client error
    ///
    /// 404 becomes `NotFound` and 409 becomes `Conflict`; everything else is kept as is.
    pub fn from_kube(error: ::kube::Error) -> Self {
        match &error {
            ::kube::Error::Api(ae) if ae.code == 404 => Self::NotFound(ae.message.clone()),
            ::kube::Error::Api(ae) if ae.code == 409 => Self::Conflict(ae.message.clone()),
            _ => Self::Kube(error),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<::kube::Error> for StoreError {
    fn from(error: ::kube::Error) -> Self {
        Self::from_kube(error)
    }
}

/// Identity of a referencing object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: Option<&str>, name: &str) -> Self {
        Self {
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Secret reads and conditional finalizer writes
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch a secret, `Ok(None)` when it does not exist
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError>;

    /// Replace the finalizer list of `secret`
    ///
    /// The write is conditional on `secret`'s resourceVersion. A stale version fails
    /// with `StoreError::Conflict` and nothing is written.
    async fn update_finalizers(
        &self,
        secret: &Secret,
        finalizers: Vec<String>,
    ) -> Result<(), StoreError>;
}

/// Reference queries over one referencing kind
#[async_trait]
pub trait ReferenceLookup: Send + Sync {
    /// Up to `limit` objects of `kind` in `namespace` whose `spec.authSecretRef.name`
    /// equals `secret_name`
    ///
    /// A kind that is unknown or not served by the cluster fails with
    /// `StoreError::NotFound`.
    async fn list_referencing(
        &self,
        kind: &ReferenceKind,
        namespace: &str,
        secret_name: &str,
        limit: usize,
    ) -> Result<Vec<ObjectKey>, StoreError>;
}
