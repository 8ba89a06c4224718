//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! server startup, the reference index, and Kubernetes client setup.

use crate::config::{
    create_shared_config, start_configmap_watch, ControllerConfig, SharedControllerConfig,
    SharedServerConfig,
};
use crate::controller::reconciler::Reconciler;
use crate::controller::server::{start_server, ServerState};
use crate::crd::REFERENCE_KINDS;
use crate::index::{register_reference_indexes, start_index_watches, FieldIndexer};
use crate::observability;
use crate::store::KubeSecretStore;
use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Secret;
use kube::{api::Api, Client};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// Secrets watched by the controller
    pub secrets: Api<Secret>,
    /// Reconciler context
    pub reconciler: Arc<Reconciler>,
    /// Reference index fed by the per-kind watches
    pub indexer: Arc<FieldIndexer>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    /// Shared controller configuration (hot-reloadable)
    pub controller_config: SharedControllerConfig,
    /// Shared server configuration (hot-reloadable)
    pub server_config: SharedServerConfig,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.is_ready.load(Ordering::Relaxed))
            .field("index_settled", &self.indexer.all_settled())
            .finish_non_exhaustive()
    }
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins when set; otherwise the filter is derived from `LOG_LEVEL`.
pub fn init_tracing(config: &ControllerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.default_log_directive().into());

    let result = if config.log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(config.log_enable_color)
            .try_init()
    };

    if let Err(e) = result {
        // Only fails when a subscriber is already installed, which then receives this
        warn!("Tracing subscriber init returned error: {}", e);
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - Reference index registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Index watches for every referencing kind
/// - Reconciler setup
/// - ConfigMap hot-reload watch
pub async fn initialize() -> Result<InitializationResult> {
    // Required for rustls 0.23+ when no default provider is set via features.
    // An Err means a provider is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let (controller_config, server_config) = create_shared_config();
    let config = controller_config.read().await.clone();

    init_tracing(&config);

    info!("Starting Secret Protection Controller");
    info!(
        "Build info: datetime={}, git_hash={}",
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    observability::metrics::register_metrics()?;

    let indexer = Arc::new(FieldIndexer::new());
    register_reference_indexes(&indexer, &REFERENCE_KINDS)
        .context("Failed to register reference indexes")?;

    let server_state = Arc::new(ServerState::new(Some(indexer.clone())));

    // Start HTTP server for metrics and probes, and wait for it to bind
    let server_port = server_config.read().await.metrics_port;
    let server_state_clone = server_state.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle, server_config.clone()).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    start_index_watches(
        client.clone(),
        indexer.clone(),
        &REFERENCE_KINDS,
        config.watch_namespace.clone(),
    );

    let secrets: Api<Secret> = match config.watch_namespace.as_deref() {
        Some(namespace) => {
            info!("Watching secrets in namespace '{}'", namespace);
            Api::namespaced(client.clone(), namespace)
        }
        None => {
            info!("Watching secrets in all namespaces");
            Api::all(client.clone())
        }
    };

    let reconciler = Arc::new(Reconciler::new(
        Arc::new(KubeSecretStore::new(client.clone())),
        indexer.clone(),
        &REFERENCE_KINDS,
    ));

    if let Some(configmap_name) = config.config_map_name.as_deref() {
        info!(
            "Hot-reload enabled: watching ConfigMap '{}' in namespace '{}'",
            configmap_name, config.controller_namespace
        );
        start_configmap_watch(
            client.clone(),
            &config.controller_namespace,
            configmap_name,
            controller_config.clone(),
            server_config.clone(),
        );
    } else {
        info!("Hot-reload disabled (default) - configuration changes require pod restart");
    }

    info!(
        kinds = REFERENCE_KINDS.len(),
        "Controller initialized, starting watch loop..."
    );

    Ok(InitializationResult {
        client,
        secrets,
        reconciler,
        indexer,
        server_state,
        controller_config,
        server_config,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    server_config: SharedServerConfig,
) -> Result<()> {
    let config = server_config.read().await;
    let startup_timeout = std::time::Duration::from_secs(config.startup_timeout_secs);
    let poll_interval = std::time::Duration::from_millis(config.poll_interval_ms);
    drop(config);
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        // Set by start_server once bound
        if server_state.is_ready.load(Ordering::Relaxed) {
            info!("HTTP server is ready and accepting connections");
            break;
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }

    Ok(())
}
