//! Common test utilities for reconciliation tests
//!
//! Provides an in-memory `SecretStore` that enforces resourceVersion preconditions
//! the way the API server does, plus builders for secrets, referencing objects and
//! a synced reference index.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::DynamicObject;
use kube::ResourceExt;
use secret_protection_controller::crd::{ReferenceKind, REFERENCE_KINDS};
use secret_protection_controller::index::{register_reference_indexes, FieldIndexer};
use secret_protection_controller::store::{SecretStore, StoreError};
use secret_protection_controller::controller::reconciler::Reconciler;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type ConflictHook = Box<dyn Fn() + Send + Sync>;

/// In-memory secret store
///
/// Every successful write bumps the stored resourceVersion. A write carrying a stale
/// version fails with `Conflict`. Removing the last finalizer of a secret being
/// deleted removes the secret, as the API server would.
#[derive(Default)]
pub struct FakeSecretStore {
    secrets: Mutex<HashMap<(String, String), Secret>>,
    next_version: AtomicU64,
    writes: AtomicUsize,
    reads: AtomicUsize,
    injected_conflicts: AtomicU32,
    on_conflict: Mutex<Option<ConflictHook>>,
}

impl FakeSecretStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_version: AtomicU64::new(100),
            ..Self::default()
        })
    }

    pub fn insert(&self, secret: Secret) {
        let key = (secret.namespace().unwrap_or_default(), secret.name_any());
        self.secrets.lock().unwrap().insert(key, secret);
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.secrets
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn finalizers(&self, namespace: &str, name: &str) -> Option<Vec<String>> {
        self.get(namespace, name).map(|s| s.finalizers().to_vec())
    }

    /// Successful finalizer writes so far
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Secret reads so far
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Fail the next `count` writes as if another client updated the secret first
    ///
    /// `hook` runs after each injected conflict, before the caller re-reads.
    pub fn inject_conflicts(&self, count: u32, hook: Option<ConflictHook>) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
        *self.on_conflict.lock().unwrap() = hook;
    }

    fn bump_version(&self, secret: &mut Secret) {
        let version = self.next_version.fetch_add(1, Ordering::SeqCst);
        secret.metadata.resource_version = Some(version.to_string());
    }
}

#[async_trait]
impl SecretStore for FakeSecretStore {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.get(namespace, name))
    }

    async fn update_finalizers(
        &self,
        secret: &Secret,
        finalizers: Vec<String>,
    ) -> Result<(), StoreError> {
        let key = (secret.namespace().unwrap_or_default(), secret.name_any());
        if secret.resource_version().is_none() {
            return Err(StoreError::MissingResourceVersion(key.1));
        }
        {
            let mut secrets = self.secrets.lock().unwrap();
            let Some(stored) = secrets.get_mut(&key) else {
                return Err(StoreError::NotFound(key.1));
            };

            let injected = self
                .injected_conflicts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if injected {
                self.bump_version(stored);
            } else if stored.resource_version() != secret.resource_version() {
                return Err(StoreError::Conflict(key.1));
            } else {
                stored.metadata.finalizers = Some(finalizers);
                self.bump_version(stored);
                self.writes.fetch_add(1, Ordering::SeqCst);
                if stored.metadata.deletion_timestamp.is_some() && stored.finalizers().is_empty() {
                    secrets.remove(&key);
                }
                return Ok(());
            }
        }

        if let Some(hook) = self.on_conflict.lock().unwrap().as_ref() {
            hook();
        }
        Err(StoreError::Conflict(key.1))
    }
}

/// A secret with resourceVersion "1"
pub fn secret(namespace: &str, name: &str, finalizers: &[&str], deleting: bool) -> Secret {
    let mut metadata = json!({
        "name": name,
        "namespace": namespace,
        "resourceVersion": "1",
        "finalizers": finalizers,
    });
    if deleting {
        metadata["deletionTimestamp"] = json!("2024-01-01T00:00:00Z");
    }
    serde_json::from_value(json!({ "apiVersion": "v1", "kind": "Secret", "metadata": metadata }))
        .unwrap()
}

/// An object of `kind` authenticating with `secret_name`
pub fn referencing(kind: &ReferenceKind, namespace: &str, name: &str, secret_name: &str) -> DynamicObject {
    DynamicObject::new(name, &kind.api_resource())
        .within(namespace)
        .data(json!({ "spec": { "authSecretRef": { "name": secret_name, "key": "token" } } }))
}

/// The kind entry from the fixed table
pub fn kind(name: &str) -> &'static ReferenceKind {
    ReferenceKind::find(name).unwrap()
}

/// An index with the reference index registered and every kind synced empty
pub fn synced_indexer() -> Arc<FieldIndexer> {
    let indexer = Arc::new(FieldIndexer::new());
    register_reference_indexes(&indexer, &REFERENCE_KINDS).unwrap();
    for kind in &REFERENCE_KINDS {
        indexer.begin_resync(kind);
        indexer.finish_resync(kind);
    }
    indexer
}

pub fn reconciler(store: &Arc<FakeSecretStore>, indexer: &Arc<FieldIndexer>) -> Reconciler {
    Reconciler::new(store.clone(), indexer.clone(), &REFERENCE_KINDS)
}
