//! # Existence Prober
//!
//! Answers "does any resource of this kind still reference the secret?"
//!
//! Queries are capped at one result and scoped to the secret's namespace. A kind
//! that is not served by the cluster counts as holding no references.

use crate::controller::reconciler::types::ReconcilerError;
use crate::crd::ReferenceKind;
use crate::store::{ReferenceLookup, StoreError};
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use tracing::debug;

pub async fn still_needed_by(
    lookup: &dyn ReferenceLookup,
    secret: &Secret,
    kind: &ReferenceKind,
) -> Result<bool, StoreError> {
    let namespace = secret.namespace().unwrap_or_default();
    let name = secret.name_any();
    match lookup.list_referencing(kind, &namespace, &name, 1).await {
        Ok(found) => Ok(!found.is_empty()),
        Err(e) if e.is_not_found() => {
            debug!(kind = kind.kind, error = %e, "reference.kind_unavailable");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// The first kind in `kinds` that still references `secret`
///
/// Stops at the first positive answer. Any lookup error aborts the whole check.
pub async fn first_holder<'a>(
    lookup: &dyn ReferenceLookup,
    secret: &Secret,
    kinds: &'a [ReferenceKind],
) -> Result<Option<&'a ReferenceKind>, ReconcilerError> {
    for kind in kinds {
        let needed = still_needed_by(lookup, secret, kind)
            .await
            .map_err(|source| ReconcilerError::ReferenceCheck {
                kind: kind.kind,
                key: format!("{}/{}", secret.namespace().unwrap_or_default(), secret.name_any()),
                source,
            })?;
        if needed {
            return Ok(Some(kind));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ObjectKey;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Answers from a fixed table and records which kinds were asked
    struct TableLookup {
        holders: Vec<(&'static str, &'static str, &'static str)>,
        missing: Vec<&'static str>,
        broken: Vec<&'static str>,
        asked: Mutex<Vec<&'static str>>,
    }

    impl TableLookup {
        fn new(holders: Vec<(&'static str, &'static str, &'static str)>) -> Self {
            Self {
                holders,
                missing: Vec::new(),
                broken: Vec::new(),
                asked: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ReferenceLookup for TableLookup {
        async fn list_referencing(
            &self,
            kind: &ReferenceKind,
            namespace: &str,
            secret_name: &str,
            limit: usize,
        ) -> Result<Vec<ObjectKey>, StoreError> {
            assert_eq!(limit, 1);
            self.asked.lock().unwrap().push(kind.kind);
            if self.missing.contains(&kind.kind) {
                return Err(StoreError::NotFound(kind.plural.to_string()));
            }
            if self.broken.contains(&kind.kind) {
                return Err(StoreError::NotSynced { kind: kind.kind });
            }
            Ok(self
                .holders
                .iter()
                .filter(|(k, ns, s)| *k == kind.kind && *ns == namespace && *s == secret_name)
                .map(|(_, ns, _)| ObjectKey::new(Some(*ns), "holder"))
                .take(limit)
                .collect())
        }
    }

    const KINDS: [ReferenceKind; 3] = [
        ReferenceKind::new("Kafka", "kafkas"),
        ReferenceKind::new("PG", "pgs"),
        ReferenceKind::new("Database", "databases"),
    ];

    fn secret() -> Secret {
        serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": { "name": "db-creds", "namespace": "ns1" }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_still_needed_is_namespace_scoped() {
        let lookup = TableLookup::new(vec![("Database", "ns2", "db-creds")]);
        assert!(!still_needed_by(&lookup, &secret(), &KINDS[2]).await.unwrap());

        let lookup = TableLookup::new(vec![("Database", "ns1", "db-creds")]);
        assert!(still_needed_by(&lookup, &secret(), &KINDS[2]).await.unwrap());
    }

    #[tokio::test]
    async fn test_not_found_is_suppressed() {
        let mut lookup = TableLookup::new(Vec::new());
        lookup.missing.push("Kafka");
        assert!(!still_needed_by(&lookup, &secret(), &KINDS[0]).await.unwrap());
    }

    #[tokio::test]
    async fn test_first_holder_short_circuits() {
        let lookup = TableLookup::new(vec![("PG", "ns1", "db-creds"), ("Database", "ns1", "db-creds")]);
        let holder = first_holder(&lookup, &secret(), &KINDS).await.unwrap();
        assert_eq!(holder.map(|k| k.kind), Some("PG"));
        assert_eq!(*lookup.asked.lock().unwrap(), vec!["Kafka", "PG"]);
    }

    #[tokio::test]
    async fn test_first_holder_propagates_errors() {
        let mut lookup = TableLookup::new(vec![("Database", "ns1", "db-creds")]);
        lookup.broken.push("PG");
        let err = first_holder(&lookup, &secret(), &KINDS).await.unwrap_err();
        assert!(matches!(err, ReconcilerError::ReferenceCheck { kind: "PG", .. }));
        assert_eq!(*lookup.asked.lock().unwrap(), vec!["Kafka", "PG"]);
    }

    #[tokio::test]
    async fn test_no_holder() {
        let lookup = TableLookup::new(Vec::new());
        assert!(first_holder(&lookup, &secret(), &KINDS).await.unwrap().is_none());
    }
}
