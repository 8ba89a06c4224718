//! # Kubernetes Store
//!
//! `SecretStore` and `ReferenceLookup` backed directly by the Kubernetes API.

use crate::constants::FIELD_MANAGER;
use crate::crd::{secret_ref_index_fn, ReferenceKind};
use crate::store::{ObjectKey, ReferenceLookup, SecretStore, StoreError};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, DynamicObject, ListParams, Patch, PatchParams};
use kube::{Client, ResourceExt};
use tracing::debug;

/// Page size used when scanning a kind without a cache
const LIST_PAGE_SIZE: u32 = 500;

/// Secrets read from and written to the API server
#[derive(Clone)]
pub struct KubeSecretStore {
    client: Client,
}

impl std::fmt::Debug for KubeSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSecretStore").finish_non_exhaustive()
    }
}

impl KubeSecretStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name).await.map_err(StoreError::from_kube)
    }

    async fn update_finalizers(
        &self,
        secret: &Secret,
        finalizers: Vec<String>,
    ) -> Result<(), StoreError> {
        let name = secret.name_any();
        let namespace = secret.namespace().unwrap_or_default();
        let (patch, resource_version) = finalizer_patch(secret, finalizers)?;

        let api: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PatchParams::default()
        };
        api.patch(&name, &params, &Patch::Merge(&patch))
            .await
            .map_err(StoreError::from_kube)?;

        debug!(
            secret.name = name.as_str(),
            secret.namespace = namespace.as_str(),
            resource_version = resource_version.as_str(),
            "secret.finalizers.updated"
        );
        Ok(())
    }
}

/// Merge patch replacing the finalizer list, conditional on `secret`'s resourceVersion
///
/// The API server rejects the patch with 409 when the version is stale.
fn finalizer_patch(
    secret: &Secret,
    finalizers: Vec<String>,
) -> Result<(serde_json::Value, String), StoreError> {
    let resource_version = secret.resource_version().ok_or_else(|| {
        StoreError::MissingResourceVersion(format!(
            "secret {}/{}",
            secret.namespace().unwrap_or_default(),
            secret.name_any()
        ))
    })?;
    let patch = serde_json::json!({
        "metadata": {
            "resourceVersion": resource_version,
            "finalizers": finalizers,
        }
    });
    Ok((patch, resource_version))
}

/// Uncached reference lookup
///
/// The API server cannot select on custom resource spec fields, so this lists the
/// namespace page by page and filters client-side. Suited to one-off queries from the
/// CLI; the controller uses the watch-fed `FieldIndexer` instead.
#[derive(Clone)]
pub struct ApiReferenceLookup {
    client: Client,
}

impl std::fmt::Debug for ApiReferenceLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiReferenceLookup").finish_non_exhaustive()
    }
}

impl ApiReferenceLookup {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReferenceLookup for ApiReferenceLookup {
    async fn list_referencing(
        &self,
        kind: &ReferenceKind,
        namespace: &str,
        secret_name: &str,
        limit: usize,
    ) -> Result<Vec<ObjectKey>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let ar = kind.api_resource();
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), namespace, &ar);

        let mut found = Vec::new();
        let mut continue_token: Option<String> = None;
        loop {
            let mut params = ListParams::default().limit(LIST_PAGE_SIZE);
            if let Some(token) = continue_token.as_deref() {
                params = params.continue_token(token);
            }
            let page = api.list(&params).await.map_err(StoreError::from_kube)?;

            for obj in &page.items {
                if secret_ref_index_fn(obj).iter().any(|v| v == secret_name) {
                    found.push(ObjectKey::new(obj.namespace().as_deref(), &obj.name_any()));
                    if found.len() >= limit {
                        return Ok(found);
                    }
                }
            }

            match page.metadata.continue_ {
                Some(token) if !token.is_empty() => continue_token = Some(token),
                _ => break,
            }
        }
        Ok(found)
    }
}
