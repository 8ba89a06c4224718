//! # Configuration
//!
//! Controller and server settings, shared behind async read/write locks so the
//! ConfigMap watch can swap them at runtime.

mod controller;
mod server;
mod watch;

pub use controller::ControllerConfig;
pub use server::ServerConfig;
pub use watch::{config_lookup, start_configmap_watch};

use std::sync::Arc;
use tokio::sync::RwLock;

/// Hot-reloadable controller configuration
pub type SharedControllerConfig = Arc<RwLock<ControllerConfig>>;

/// Hot-reloadable server configuration
pub type SharedServerConfig = Arc<RwLock<ServerConfig>>;

/// Create shared configuration from the environment
pub fn create_shared_config() -> (SharedControllerConfig, SharedServerConfig) {
    (
        Arc::new(RwLock::new(ControllerConfig::from_env())),
        Arc::new(RwLock::new(ServerConfig::from_env())),
    )
}
