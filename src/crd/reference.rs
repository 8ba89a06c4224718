//! # Secret References
//!
//! The `spec.authSecretRef` field shared by every referencing kind, and the
//! extractor that feeds it into the reference index.

use kube::api::DynamicObject;
use serde::{Deserialize, Serialize};

/// Reference to the secret holding the API token a resource authenticates with
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSecretReference {
    /// Name of the secret in the resource's own namespace
    pub name: String,
    /// Key inside the secret
    #[serde(default)]
    pub key: String,
}

/// Objects that may declare the secret they authenticate with
pub trait HasSecretReference {
    /// The declared reference, or `None` when the object carries none
    fn auth_secret_ref(&self) -> Option<AuthSecretReference>;
}

impl HasSecretReference for DynamicObject {
    fn auth_secret_ref(&self) -> Option<AuthSecretReference> {
        let raw = self.data.get("spec")?.get("authSecretRef")?;
        serde_json::from_value(raw.clone()).ok()
    }
}

/// Extractor signature accepted by the reference index
pub type ExtractorFn = fn(&DynamicObject) -> Vec<String>;

/// Index values for `spec.authSecretRef.name`
///
/// Objects that do not expose a (non-empty) reference produce no values and are
/// never returned by reference queries.
pub fn secret_ref_index_fn(obj: &DynamicObject) -> Vec<String> {
    match obj.auth_secret_ref() {
        Some(reference) if !reference.name.is_empty() => vec![reference.name],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(data: serde_json::Value) -> DynamicObject {
        let ar = crate::crd::ReferenceKind::new("Database", "databases").api_resource();
        DynamicObject::new("db", &ar).within("ns1").data(data)
    }

    #[test]
    fn test_extracts_secret_name() {
        let obj = object(json!({ "spec": { "authSecretRef": { "name": "db-creds", "key": "token" } } }));
        assert_eq!(secret_ref_index_fn(&obj), vec!["db-creds".to_string()]);
        assert_eq!(
            obj.auth_secret_ref(),
            Some(AuthSecretReference {
                name: "db-creds".to_string(),
                key: "token".to_string(),
            })
        );
    }

    #[test]
    fn test_missing_reference_is_not_applicable() {
        let obj = object(json!({ "spec": { "project": "p1" } }));
        assert!(secret_ref_index_fn(&obj).is_empty());

        let no_spec = object(json!({}));
        assert!(no_spec.auth_secret_ref().is_none());
    }

    #[test]
    fn test_malformed_or_empty_reference_is_not_applicable() {
        let malformed = object(json!({ "spec": { "authSecretRef": "db-creds" } }));
        assert!(secret_ref_index_fn(&malformed).is_empty());

        let empty = object(json!({ "spec": { "authSecretRef": { "name": "" } } }));
        assert!(secret_ref_index_fn(&empty).is_empty());
    }
}
