//! Kubernetes resource watchers.
//!
//! Both CRD types go through the generic `watch_resource()` helper built on
//! `kube_runtime::Controller`, which reconnects on watch errors and never runs
//! two reconciliations of the same object at once.

use crate::error::ControllerError;
use crate::reconciler::{Reconciler, BACKUP_KIND, INFRA_KIND};
use crds::{BackupInfrastructure, ClusterInfrastructure};
use futures::StreamExt;
use kube::Api;
use kube_runtime::{controller::{Action, Config as ControllerConfig}, watcher, Controller};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

type ReconcileFuture = Pin<Box<dyn Future<Output = Result<Action, ControllerError>> + Send>>;

async fn watch_resource<K, F>(
    api: Api<K>,
    reconciler: Arc<Reconciler>,
    reconcile_fn: F,
    resource_name: &'static str,
) -> Result<(), ControllerError>
where
    K: kube::Resource + Clone + Send + Sync + 'static + std::fmt::Debug + serde::de::DeserializeOwned,
    K::DynamicType: Default + std::cmp::Eq + std::hash::Hash + Clone + std::fmt::Debug + Unpin,
    F: Fn(Arc<Reconciler>, Arc<K>) -> ReconcileFuture + Send + Sync + Clone + 'static,
{
    info!("Starting {} watcher", resource_name);

    // Failed objects come back after their per-object Fibonacci delay
    let error_policy = move |obj: Arc<K>, error: &ControllerError, ctx: Arc<Reconciler>| {
        let delay = ctx.retry_delay(resource_name, obj.as_ref());
        error!(
            "Reconciliation error for {} {}: {}; requeue in {}s",
            resource_name,
            obj.meta().name.as_deref().unwrap_or_default(),
            error,
            delay.as_secs()
        );
        Action::requeue(delay)
    };

    let reconcile = move |obj: Arc<K>, ctx: Arc<Reconciler>| {
        let reconcile_fn = reconcile_fn.clone();
        async move {
            debug!(
                "Reconciling {} {}",
                resource_name,
                obj.meta().name.as_deref().unwrap_or_default()
            );
            reconcile_fn(ctx, obj).await
        }
    };

    // Debounce batches the status updates we write ourselves
    let controller_config = ControllerConfig::default()
        .debounce(Duration::from_secs(5))
        .concurrency(3);

    Controller::new(api, watcher::Config::default())
        .with_config(controller_config)
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| async move {
            if let Err(e) = res {
                error!("Controller error for {}: {}", resource_name, e);
            }
        })
        .await;

    info!("{} watcher stopped", resource_name);
    Ok(())
}

/// Watches infrastructure resources for changes.
#[derive(Clone)]
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    cluster_infrastructure_api: Api<ClusterInfrastructure>,
    backup_infrastructure_api: Api<BackupInfrastructure>,
}

impl Watcher {
    pub fn new(
        reconciler: Arc<Reconciler>,
        cluster_infrastructure_api: Api<ClusterInfrastructure>,
        backup_infrastructure_api: Api<BackupInfrastructure>,
    ) -> Self {
        Self {
            reconciler,
            cluster_infrastructure_api,
            backup_infrastructure_api,
        }
    }

    pub async fn watch_cluster_infrastructures(&self) -> Result<(), ControllerError> {
        watch_resource(
            self.cluster_infrastructure_api.clone(),
            self.reconciler.clone(),
            |reconciler, resource| {
                Box::pin(async move { reconciler.reconcile_cluster_infrastructure(&resource).await })
            },
            INFRA_KIND,
        )
        .await
    }

    pub async fn watch_backup_infrastructures(&self) -> Result<(), ControllerError> {
        watch_resource(
            self.backup_infrastructure_api.clone(),
            self.reconciler.clone(),
            |reconciler, resource| {
                Box::pin(async move { reconciler.reconcile_backup_infrastructure(&resource).await })
            },
            BACKUP_KIND,
        )
        .await
    }
}
