//! # Secret Protection Controller
//!
//! A Kubernetes controller that guards credential secrets against early deletion.
//!
//! ## Overview
//!
//! Resources such as `Kafka`, `PG` or `ServiceUser` authenticate with a token stored in
//! a Secret named by `spec.authSecretRef`. They may still need that token while their
//! own finalizers tear down the remote service, so the Secret carries a
//! `secret-protection` finalizer. When the Secret is deleted this controller:
//!
//! 1. **Checks every referencing kind** in the Secret's namespace using a watch-fed index
//! 2. **Requeues** while any referencing resource remains
//! 3. **Releases** its finalizer once none do, leaving other finalizers untouched
//!
//! ## Features
//!
//! - **Optimistic concurrency**: finalizer writes carry the Secret's resourceVersion
//! - **Prometheus metrics** and **health probes** on `METRICS_PORT`
//! - **Hot reload** of configuration from a ConfigMap

use anyhow::Result;
use secret_protection_controller::runtime::initialization::initialize;
use secret_protection_controller::runtime::watch_loop::run_watch_loop;

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;

    run_watch_loop(
        init.secrets,
        init.reconciler,
        init.server_state,
        init.controller_config,
    )
    .await
}
