//! # ConfigMap Watch
//!
//! Watches for ConfigMap changes and hot-reloads controller configuration.

use crate::config::{ControllerConfig, ServerConfig, SharedControllerConfig, SharedServerConfig};
use futures::{pin_mut, StreamExt};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::Api;
use kube_runtime::watcher;
use std::collections::{BTreeMap, HashMap};
use tracing::{error, info, warn};

/// Start watching for ConfigMap changes and hot-reload configuration
///
/// Watches the specified ConfigMap in the controller namespace.
/// When the ConfigMap changes, reloads configuration and updates the shared config.
pub fn start_configmap_watch(
    client: kube::Client,
    namespace: &str,
    configmap_name: &str,
    controller_config: SharedControllerConfig,
    server_config: SharedServerConfig,
) {
    let namespace = namespace.to_string();
    let configmap_name = configmap_name.to_string();
    tokio::spawn(async move {
        let configmaps: Api<ConfigMap> = Api::namespaced(client, &namespace);

        info!(
            "Starting watch for ConfigMap '{}' in namespace '{}'",
            configmap_name, namespace
        );

        let watcher_config =
            watcher::Config::default().fields(&format!("metadata.name={configmap_name}"));
        let stream = watcher(configmaps, watcher_config);
        pin_mut!(stream);

        while let Some(event_result) = stream.next().await {
            match event_result {
                Ok(watcher::Event::Apply(configmap) | watcher::Event::InitApply(configmap)) => {
                    info!(
                        "ConfigMap '{}' applied, reloading configuration...",
                        configmap_name
                    );
                    reload(configmap.data.as_ref(), &controller_config, &server_config).await;
                }
                Ok(watcher::Event::Delete(_)) => {
                    warn!(
                        "ConfigMap '{}' was deleted, reverting to environment",
                        configmap_name
                    );
                    reload(None, &controller_config, &server_config).await;
                }
                Ok(watcher::Event::Init | watcher::Event::InitDone) => {}
                Err(e) => {
                    // The watcher retries on its own
                    error!("Error watching ConfigMap: {}", e);
                }
            }
        }

        warn!("ConfigMap watch stream ended");
    });
}

/// Build a key lookup over ConfigMap data layered on top of the environment
///
/// ConfigMap keys are matched case-insensitively against the environment variable
/// names (`still_needed_requeue_secs` sets `STILL_NEEDED_REQUEUE_SECS`).
pub fn config_lookup(
    data: Option<&BTreeMap<String, String>>,
) -> impl Fn(&str) -> Option<String> {
    let overrides: HashMap<String, String> = data
        .map(|d| {
            d.iter()
                .map(|(k, v)| (k.to_uppercase(), v.clone()))
                .collect()
        })
        .unwrap_or_default();
    move |key: &str| {
        overrides
            .get(key)
            .cloned()
            .or_else(|| std::env::var(key).ok())
    }
}

async fn reload(
    data: Option<&BTreeMap<String, String>>,
    controller_config: &SharedControllerConfig,
    server_config: &SharedServerConfig,
) {
    let lookup = config_lookup(data);
    let new_controller_config = ControllerConfig::from_lookup(&lookup);
    let new_server_config = ServerConfig::from_lookup(&lookup);

    *controller_config.write().await = new_controller_config.clone();
    *server_config.write().await = new_server_config;

    info!(
        still_needed_requeue_secs = new_controller_config.still_needed_requeue_secs,
        max_conflict_retries = new_controller_config.max_conflict_retries,
        error_backoff_min_secs = new_controller_config.error_backoff_min_secs,
        error_backoff_max_secs = new_controller_config.error_backoff_max_secs,
        "Configuration reloaded"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configmap_keys_override_case_insensitively() {
        let mut data = BTreeMap::new();
        data.insert("still_needed_requeue_secs".to_string(), "42".to_string());
        let config = ControllerConfig::from_lookup(config_lookup(Some(&data)));
        assert_eq!(config.still_needed_requeue_secs, 42);
    }

    #[tokio::test]
    async fn test_reload_swaps_shared_config() {
        let (controller_config, server_config) = crate::config::create_shared_config();
        let mut data = BTreeMap::new();
        data.insert("MAX_CONFLICT_RETRIES".to_string(), "9".to_string());
        data.insert("METRICS_PORT".to_string(), "9100".to_string());

        reload(Some(&data), &controller_config, &server_config).await;

        assert_eq!(controller_config.read().await.max_conflict_retries, 9);
        assert_eq!(server_config.read().await.metrics_port, 9100);
    }
}
