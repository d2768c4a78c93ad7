//! Infrastructure Controller
//!
//! Watches two CRD types and converges them through the orchestrator:
//! - ClusterInfrastructure: per-cluster network (adopted or created) via the engine
//! - BackupInfrastructure: backup bucket, emptied before it is destroyed
//!
//! Both carry a finalizer so deleting the object tears the infrastructure down.

mod backoff;
mod config;
mod controller;
mod error;
mod metrics;
mod reconciler;
mod secrets;
mod server;
mod watcher;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt::init();

    // kube's rustls client needs a process-wide crypto provider
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        return Err(ControllerError::InvalidConfig(
            "a rustls crypto provider was already installed".to_string(),
        ));
    }

    info!("Starting Infrastructure Controller");

    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Terraform binary: {}", config.engine.binary.display());
    info!("  Templates: {}", config.engine.templates_dir.display());
    info!("  State: {}", config.engine.state_dir.display());
    info!("  Engine timeout: {}s", config.engine.command_timeout.as_secs());
    info!("  Resync interval: {}s", config.resync_interval.as_secs());
    info!("  Metrics address: {}", config.metrics_addr);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
