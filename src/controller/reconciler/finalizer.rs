//! # Finalizer
//!
//! Deletion predicates and finalizer edits on secrets.
//!
//! Edits go through `SecretStore::update_finalizers`, which is conditional on the
//! secret's resourceVersion, so finalizers owned by other controllers are never lost
//! to a concurrent write.

use crate::store::{SecretStore, StoreError};
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;

/// True once deletion of the secret has been requested
pub fn is_marked_for_deletion(secret: &Secret) -> bool {
    secret.metadata.deletion_timestamp.is_some()
}

pub fn has_finalizer(secret: &Secret, finalizer: &str) -> bool {
    secret.finalizers().iter().any(|f| f == finalizer)
}

/// Remove `finalizer`, keeping every other finalizer in order
///
/// Returns `false` without writing when the finalizer is already absent.
pub async fn remove_finalizer(
    store: &dyn SecretStore,
    secret: &Secret,
    finalizer: &str,
) -> Result<bool, StoreError> {
    if !has_finalizer(secret, finalizer) {
        return Ok(false);
    }
    let remaining: Vec<String> = secret
        .finalizers()
        .iter()
        .filter(|f| f.as_str() != finalizer)
        .cloned()
        .collect();
    store.update_finalizers(secret, remaining).await?;
    Ok(true)
}

/// Add `finalizer` if missing
///
/// Returns `false` without writing when it is already present.
pub async fn ensure_finalizer(
    store: &dyn SecretStore,
    secret: &Secret,
    finalizer: &str,
) -> Result<bool, StoreError> {
    if has_finalizer(secret, finalizer) {
        return Ok(false);
    }
    let mut finalizers = secret.finalizers().to_vec();
    finalizers.push(finalizer.to_string());
    store.update_finalizers(secret, finalizers).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        writes: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl SecretStore for RecordingStore {
        async fn get_secret(&self, _: &str, _: &str) -> Result<Option<Secret>, StoreError> {
            Ok(None)
        }

        async fn update_finalizers(
            &self,
            _: &Secret,
            finalizers: Vec<String>,
        ) -> Result<(), StoreError> {
            self.writes.lock().unwrap().push(finalizers);
            Ok(())
        }
    }

    fn secret(finalizers: &[&str], deleting: bool) -> Secret {
        let mut metadata = json!({
            "name": "db-creds",
            "namespace": "ns1",
            "resourceVersion": "1",
            "finalizers": finalizers,
        });
        if deleting {
            metadata["deletionTimestamp"] = json!("2024-01-01T00:00:00Z");
        }
        serde_json::from_value(json!({ "apiVersion": "v1", "kind": "Secret", "metadata": metadata }))
            .unwrap()
    }

    #[test]
    fn test_predicates() {
        let deleting = secret(&["secret-protection"], true);
        assert!(is_marked_for_deletion(&deleting));
        assert!(has_finalizer(&deleting, "secret-protection"));
        assert!(!has_finalizer(&deleting, "other"));

        let live = secret(&[], false);
        assert!(!is_marked_for_deletion(&live));
        assert!(!has_finalizer(&live, "secret-protection"));
    }

    #[tokio::test]
    async fn test_remove_keeps_other_finalizers() {
        let store = RecordingStore::default();
        let s = secret(&["a.example/hold", "secret-protection", "b.example/hold"], true);
        assert!(remove_finalizer(&store, &s, "secret-protection").await.unwrap());
        assert_eq!(
            store.writes.lock().unwrap().as_slice(),
            &[vec!["a.example/hold".to_string(), "b.example/hold".to_string()]]
        );
    }

    #[tokio::test]
    async fn test_remove_absent_finalizer_does_not_write() {
        let store = RecordingStore::default();
        let s = secret(&["a.example/hold"], true);
        assert!(!remove_finalizer(&store, &s, "secret-protection").await.unwrap());
        assert!(store.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_finalizer_appends_once() {
        let store = RecordingStore::default();
        let s = secret(&["a.example/hold"], false);
        assert!(ensure_finalizer(&store, &s, "secret-protection").await.unwrap());
        assert_eq!(
            store.writes.lock().unwrap().as_slice(),
            &[vec!["a.example/hold".to_string(), "secret-protection".to_string()]]
        );

        let protected = secret(&["secret-protection"], false);
        assert!(!ensure_finalizer(&store, &protected, "secret-protection").await.unwrap());
        assert_eq!(store.writes.lock().unwrap().len(), 1);
    }
}
