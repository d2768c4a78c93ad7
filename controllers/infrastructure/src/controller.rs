//! Main controller implementation.
//!
//! Wires the engine, provider registry and secret store into the reconciler,
//! then runs one watcher per CRD type next to the probe/metrics server.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::reconciler::Reconciler;
use crate::secrets::KubeSecretStore;
use crate::server::{self, ServerState};
use crate::watcher::Watcher;
use convergence_client::{ConvergenceEngine, TerraformEngine};
use crds::{BackupInfrastructure, ClusterInfrastructure};
use infra_orchestrator::provider::alicloud::AlicloudSettings;
use infra_orchestrator::{
    BackupLifecycleController, InfraLifecycleController, ObjectPurger, ProviderRegistry, SecretStore,
};
use kube::{Api, Client};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Main controller for infrastructure resources.
pub struct Controller {
    cluster_infrastructure_watcher: JoinHandle<Result<(), ControllerError>>,
    backup_infrastructure_watcher: JoinHandle<Result<(), ControllerError>>,
    server: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts its tasks.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing Infrastructure Controller");

        let kube_client = Client::try_default().await?;

        let terraform = TerraformEngine::new(config.engine.clone());
        match terraform.recorded_clusters().await {
            Ok(0) => warn!(
                "State directory {} holds no engine state; unless it is a fresh persistent volume, \
                 earlier deployments will be destroyed as no-ops",
                config.engine.state_dir.display()
            ),
            Ok(count) => info!(
                "State directory {} holds state for {} clusters",
                config.engine.state_dir.display(),
                count
            ),
            Err(e) => warn!("Cannot inspect state directory {}: {}", config.engine.state_dir.display(), e),
        }
        let engine: Arc<dyn ConvergenceEngine> = Arc::new(terraform);
        let registry = Arc::new(ProviderRegistry::with_defaults(AlicloudSettings {
            vpc_endpoint: config.alicloud_vpc_endpoint.clone(),
            object_page_size: config.object_page_size,
        }));
        let secrets: Arc<dyn SecretStore> = Arc::new(KubeSecretStore::new(kube_client.clone()));
        let metrics = Arc::new(Metrics::new()?);

        let reconciler = Arc::new(Reconciler::new(
            kube_client.clone(),
            config.namespace.clone(),
            InfraLifecycleController::new(engine.clone(), registry.clone()),
            BackupLifecycleController::new(engine, registry, ObjectPurger::new(config.purge_max_pages)),
            secrets,
            metrics.clone(),
            config.resync_interval,
        ));

        let (cluster_infrastructure_api, backup_infrastructure_api) = match config.namespace.as_deref() {
            Some(ns) => (
                Api::<ClusterInfrastructure>::namespaced(kube_client.clone(), ns),
                Api::<BackupInfrastructure>::namespaced(kube_client.clone(), ns),
            ),
            None => (
                Api::<ClusterInfrastructure>::all(kube_client.clone()),
                Api::<BackupInfrastructure>::all(kube_client.clone()),
            ),
        };

        let watcher_instance = Arc::new(Watcher::new(
            reconciler,
            cluster_infrastructure_api,
            backup_infrastructure_api,
        ));

        let server_state = ServerState::new(metrics);
        let server = {
            let state = server_state.clone();
            let addr = config.metrics_addr;
            tokio::spawn(async move { server::serve(addr, state).await })
        };

        let cluster_infrastructure_watcher = {
            let watcher = watcher_instance.clone();
            tokio::spawn(async move { watcher.watch_cluster_infrastructures().await })
        };

        let backup_infrastructure_watcher = {
            let watcher = watcher_instance.clone();
            tokio::spawn(async move { watcher.watch_backup_infrastructures().await })
        };

        server_state.mark_ready();
        info!("Infrastructure Controller initialized");

        Ok(Self {
            cluster_infrastructure_watcher,
            backup_infrastructure_watcher,
            server,
        })
    }

    /// Runs until a task stops or the process is interrupted.
    pub async fn run(self) -> Result<(), ControllerError> {
        let Self {
            mut cluster_infrastructure_watcher,
            mut backup_infrastructure_watcher,
            mut server,
        } = self;

        let result = tokio::select! {
            result = &mut cluster_infrastructure_watcher => joined("ClusterInfrastructure watcher", result),
            result = &mut backup_infrastructure_watcher => joined("BackupInfrastructure watcher", result),
            result = &mut server => joined("metrics server", result),
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                Ok(())
            }
        };

        cluster_infrastructure_watcher.abort();
        backup_infrastructure_watcher.abort();
        server.abort();

        if let Err(e) = &result {
            error!("Controller stopped: {}", e);
        }
        result
    }
}

fn joined(
    task: &str,
    result: Result<Result<(), ControllerError>, tokio::task::JoinError>,
) -> Result<(), ControllerError> {
    match result {
        Ok(Ok(())) => Err(ControllerError::Watch(format!("{} exited", task))),
        Ok(Err(e)) => Err(ControllerError::Watch(format!("{} error: {}", task, e))),
        Err(e) => Err(ControllerError::Watch(format!("{} panicked: {}", task, e))),
    }
}
