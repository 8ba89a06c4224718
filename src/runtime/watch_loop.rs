//! # Watch Loop
//!
//! Controller watch loop that monitors Secrets and triggers reconciliation when
//! changes are detected.

use crate::config::SharedControllerConfig;
use crate::controller::reconciler::{reconcile, Reconciler};
use crate::controller::server::ServerState;
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube_runtime::{controller, watcher, Controller};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Run the controller watch loop
///
/// Sets up the Kubernetes controller over `secrets` and restarts it when the watch
/// stream ends. Returns once a shutdown signal has been received.
pub async fn run_watch_loop(
    secrets: Api<Secret>,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
    controller_config: SharedControllerConfig,
) -> Result<(), anyhow::Error> {
    let config = controller_config.read().await;
    let backoff_start_ms = config.backoff_start_ms;
    drop(config);

    let backoff_duration_ms = Arc::new(AtomicU64::new(backoff_start_ms));

    // Mark the server not ready on SIGTERM/SIGINT so no new traffic is routed here
    let shutdown_server_state = server_state.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
        shutdown_server_state.is_ready.store(false, Ordering::Relaxed);
        info!("Marked server as not ready, waiting for in-flight reconciliations to complete...");
    });

    loop {
        if !server_state.is_ready.load(Ordering::Relaxed) {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let backoff_clone = backoff_duration_ms.clone();
        let config_for_reconcile = controller_config.clone();
        let config_for_errors = controller_config.clone();
        let config_for_filter = controller_config.clone();
        let concurrency = controller_config.read().await.max_concurrent_reconciliations;

        let watch_span = tracing::span!(
            tracing::Level::INFO,
            "controller.watch",
            operation = "watch_loop"
        );
        let _watch_guard = watch_span.enter();

        info!("Starting controller watch loop...");
        let controller_future = Controller::new(secrets.clone(), watcher::Config::default())
            .with_config(controller::Config::default().concurrency(concurrency))
            .shutdown_on_signal()
            .run(
                move |obj, ctx| reconcile(obj, ctx, config_for_reconcile.clone()),
                move |obj, error, ctx| handle_reconciliation_error(obj, error, ctx, &config_for_errors),
                reconciler.clone(),
            )
            .filter_map(move |x| {
                let backoff = backoff_clone.clone();
                let config_clone = config_for_filter.clone();
                async move {
                    match &x {
                        Ok((obj, _action)) => {
                            let backoff_start = config_clone.read().await.backoff_start_ms;
                            backoff.store(backoff_start, Ordering::Relaxed);
                            debug!(secret = %obj, "watch.event.success");
                            Some(x)
                        }
                        Err(e) => {
                            let error_string = format!("{e:?}");
                            let config = config_clone.read().await;
                            let max_backoff = config.backoff_max_ms;
                            let watch_restart_delay = config.watch_restart_delay_duration();
                            drop(config);
                            handle_watch_stream_error(
                                &error_string,
                                &backoff,
                                max_backoff,
                                watch_restart_delay,
                            )
                            .await
                            .map(|()| x)
                        }
                    }
                }
            })
            .for_each(|_| futures::future::ready(()));

        controller_future.await;

        if !server_state.is_ready.load(Ordering::Relaxed) {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let delay = controller_config
            .read()
            .await
            .watch_restart_delay_after_end_duration();
        warn!(
            "Controller watch stream ended, restarting in {} seconds...",
            delay.as_secs()
        );
        tokio::time::sleep(delay).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}
