//! Reconciles ClusterInfrastructure and BackupInfrastructure objects.
//!
//! Live objects are converged through the orchestrator and re-converged every
//! resync interval. Objects being deleted are torn down first; the finalizer is
//! only removed once teardown succeeded, so a failed purge keeps the object.
//!
//! Engine state is keyed by cluster ID. Among objects of one kind sharing a
//! cluster ID the oldest owns that state: newer duplicates fail without
//! deploying, and deleting one leaves the state alone.

use crate::backoff::BackoffTracker;
use crate::error::ControllerError;
use crate::metrics::Metrics;
use chrono::{DateTime, SecondsFormat, Utc};
use crds::{
    BackupInfraStatus, BackupInfrastructure, BackupPhase, ClusterInfraStatus, ClusterInfrastructure,
    InfraPhase,
};
use infra_orchestrator::{
    BackupContext, BackupLifecycleController, BackupOutcome, InfraContext, InfraLifecycleController,
    OrchestratorError, PlannedDeploy, SecretStore, StorageEndpointRef, Teardown,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{ListParams, Patch, PatchParams};
use kube::{Api, Client, Resource, ResourceExt};
use kube_runtime::controller::Action;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Finalizer guarding infrastructure teardown
pub const FINALIZER: &str = "infra.microscaler.io/finalizer";

pub const INFRA_KIND: &str = "ClusterInfrastructure";
pub const BACKUP_KIND: &str = "BackupInfrastructure";

/// Reconciles infrastructure resources.
pub struct Reconciler {
    client: Client,
    namespace: Option<String>,
    infra: InfraLifecycleController,
    backup: BackupLifecycleController,
    secrets: Arc<dyn SecretStore>,
    backoff: BackoffTracker,
    metrics: Arc<Metrics>,
    resync_interval: Duration,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("infra", &self.infra)
            .field("backup", &self.backup)
            .field("namespace", &self.namespace)
            .field("resync_interval", &self.resync_interval)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// `namespace` scopes the duplicate cluster ID check like the watchers; `None` means all
    pub fn new(
        client: Client,
        namespace: Option<String>,
        infra: InfraLifecycleController,
        backup: BackupLifecycleController,
        secrets: Arc<dyn SecretStore>,
        metrics: Arc<Metrics>,
        resync_interval: Duration,
    ) -> Self {
        Self {
            client,
            namespace,
            infra,
            backup,
            secrets,
            backoff: BackoffTracker::new(),
            metrics,
            resync_interval,
        }
    }

    /// Delay before retrying an object whose reconciliation just failed
    pub fn retry_delay<K: Resource>(&self, kind: &str, obj: &K) -> Duration {
        let key = object_key(kind, obj);
        self.backoff
            .pending_retry(&key, Instant::now())
            .unwrap_or(Duration::from_secs(60))
    }

    pub async fn reconcile_cluster_infrastructure(
        &self,
        obj: &ClusterInfrastructure,
    ) -> Result<Action, ControllerError> {
        let name = obj.name_any();
        let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
        let key = resource_key(INFRA_KIND, &namespace, &name);
        let api: Api<ClusterInfrastructure> = Api::namespaced(self.client.clone(), &namespace);
        let generation = obj.meta().generation;

        if obj.meta().deletion_timestamp.is_some() {
            if !has_finalizer(obj.meta()) {
                return Ok(Action::await_change());
            }
            if let Some(wait) = self.backoff.pending_retry(&key, Instant::now()) {
                debug!("{} {}/{} is backing off, retrying destroy in {}s", INFRA_KIND, namespace, name, wait.as_secs());
                return Ok(Action::requeue(wait));
            }

            if let Some(holder) = self.competing_claim(INFRA_KIND, obj, infra_cluster_id).await? {
                warn!(
                    "{} {}/{} shares cluster ID {} with {}, leaving its infrastructure in place",
                    INFRA_KIND, namespace, name, obj.spec.cluster_id, holder
                );
                remove_finalizer(&api, obj).await?;
                self.backoff.reset(&key);
                return Ok(Action::await_change());
            }

            info!("Destroying network infrastructure for {}/{}", namespace, name);
            patch_status(&api, &name, infra_status_patch(InfraPhase::Destroying, None, None, None)).await?;

            let started = Instant::now();
            let result = self.destroy_infra(obj, &namespace).await;
            self.metrics.observe(INFRA_KIND, "destroy", result.is_ok(), started.elapsed());

            return match result {
                Ok(phase) => {
                    patch_status(&api, &name, infra_status_patch(phase, None, None, Some(Utc::now()))).await?;
                    remove_finalizer(&api, obj).await?;
                    self.backoff.reset(&key);
                    info!("✅ Destroyed network infrastructure for {}/{}", namespace, name);
                    Ok(Action::await_change())
                }
                Err(e) => {
                    let message = failure_message(&e);
                    self.record_failure(&key, &message);
                    patch_status_logged(
                        &api,
                        &name,
                        &key,
                        infra_status_patch(InfraPhase::Failed, generation, Some(&message), Some(Utc::now())),
                    )
                    .await;
                    Err(e.into())
                }
            };
        }

        if !has_finalizer(obj.meta()) {
            add_finalizer(&api, obj).await?;
        }

        let observation = Observation::of_infra(obj.status.as_ref());
        if let Some(wait) = observation.resync_remaining(generation, Utc::now(), self.resync_interval) {
            debug!("{} {}/{} is converged, next resync in {}s", INFRA_KIND, namespace, name, wait.as_secs());
            return Ok(Action::requeue(wait));
        }
        if observation.failed_at(generation)
            && let Some(wait) = self.backoff.pending_retry(&key, Instant::now())
        {
            debug!("{} {}/{} is backing off, retrying in {}s", INFRA_KIND, namespace, name, wait.as_secs());
            return Ok(Action::requeue(wait));
        }

        if let Some(holder) = self.competing_claim(INFRA_KIND, obj, infra_cluster_id).await? {
            let err = ControllerError::DuplicateClusterId {
                cluster_id: obj.spec.cluster_id.clone(),
                holder,
            };
            let message = err.to_string();
            self.record_failure(&key, &message);
            patch_status_logged(
                &api,
                &name,
                &key,
                infra_status_patch(InfraPhase::Failed, generation, Some(&message), Some(Utc::now())),
            )
            .await;
            return Err(err);
        }

        info!("Reconciling {} {}/{}", INFRA_KIND, namespace, name);
        patch_status(&api, &name, infra_status_patch(InfraPhase::Planning, None, None, None)).await?;

        let started = Instant::now();
        let result = match self.plan_infra(obj, &namespace).await {
            Ok(planned) => {
                patch_status(&api, &name, infra_status_patch(InfraPhase::Converging, None, None, None)).await?;
                self.infra.converge(planned).await
            }
            Err(e) => Err(e),
        };
        self.metrics.observe(INFRA_KIND, "deploy", result.is_ok(), started.elapsed());

        match result {
            Ok(phase) => {
                patch_status(&api, &name, infra_status_patch(phase, generation, None, Some(Utc::now()))).await?;
                self.backoff.reset(&key);
                info!("✅ {} {}/{} is {}", INFRA_KIND, namespace, name, phase.as_str());
                Ok(Action::requeue(self.resync_interval))
            }
            Err(e) => {
                let message = failure_message(&e);
                self.record_failure(&key, &message);
                patch_status_logged(
                    &api,
                    &name,
                    &key,
                    infra_status_patch(InfraPhase::Failed, generation, Some(&message), Some(Utc::now())),
                )
                .await;
                Err(e.into())
            }
        }
    }

    pub async fn reconcile_backup_infrastructure(
        &self,
        obj: &BackupInfrastructure,
    ) -> Result<Action, ControllerError> {
        let name = obj.name_any();
        let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
        let key = resource_key(BACKUP_KIND, &namespace, &name);
        let api: Api<BackupInfrastructure> = Api::namespaced(self.client.clone(), &namespace);
        let generation = obj.meta().generation;

        if obj.meta().deletion_timestamp.is_some() {
            if !has_finalizer(obj.meta()) {
                return Ok(Action::await_change());
            }
            if let Some(wait) = self.backoff.pending_retry(&key, Instant::now()) {
                debug!("{} {}/{} is backing off, retrying destroy in {}s", BACKUP_KIND, namespace, name, wait.as_secs());
                return Ok(Action::requeue(wait));
            }

            if let Some(holder) = self.competing_claim(BACKUP_KIND, obj, backup_cluster_id).await? {
                warn!(
                    "{} {}/{} shares cluster ID {} with {}, leaving its bucket in place",
                    BACKUP_KIND, namespace, name, obj.spec.cluster_id, holder
                );
                remove_finalizer(&api, obj).await?;
                self.backoff.reset(&key);
                return Ok(Action::await_change());
            }

            info!("Purging and destroying backup infrastructure for {}/{}", namespace, name);
            patch_status(&api, &name, backup_status_patch(BackupPhase::Purging, None, None, None, None)).await?;

            let started = Instant::now();
            let result = self.destroy_backup(obj, &namespace).await;
            self.metrics.observe(BACKUP_KIND, "destroy", result.is_ok(), started.elapsed());

            return match result {
                Ok(outcome) => {
                    match &outcome {
                        BackupOutcome::Destroyed { endpoint, report } => info!(
                            "✅ Destroyed bucket {} for {}/{} after deleting {} objects over {} pages",
                            endpoint.bucket_name, namespace, name, report.deleted, report.pages
                        ),
                        BackupOutcome::NothingToDestroy => {
                            info!("No backup state recorded for {}/{}, nothing to destroy", namespace, name)
                        }
                    }
                    patch_status(
                        &api,
                        &name,
                        backup_status_patch(BackupPhase::Destroyed, None, None, None, Some(Utc::now())),
                    )
                    .await?;
                    remove_finalizer(&api, obj).await?;
                    self.backoff.reset(&key);
                    Ok(Action::await_change())
                }
                Err(e) => {
                    let message = failure_message(&e);
                    self.record_failure(&key, &message);
                    patch_status_logged(
                        &api,
                        &name,
                        &key,
                        backup_status_patch(BackupPhase::Failed, None, generation, Some(&message), Some(Utc::now())),
                    )
                    .await;
                    Err(e.into())
                }
            };
        }

        if !has_finalizer(obj.meta()) {
            add_finalizer(&api, obj).await?;
        }

        let observation = Observation::of_backup(obj.status.as_ref());
        if let Some(wait) = observation.resync_remaining(generation, Utc::now(), self.resync_interval) {
            debug!("{} {}/{} is ready, next resync in {}s", BACKUP_KIND, namespace, name, wait.as_secs());
            return Ok(Action::requeue(wait));
        }
        if observation.failed_at(generation)
            && let Some(wait) = self.backoff.pending_retry(&key, Instant::now())
        {
            debug!("{} {}/{} is backing off, retrying in {}s", BACKUP_KIND, namespace, name, wait.as_secs());
            return Ok(Action::requeue(wait));
        }

        if let Some(holder) = self.competing_claim(BACKUP_KIND, obj, backup_cluster_id).await? {
            let err = ControllerError::DuplicateClusterId {
                cluster_id: obj.spec.cluster_id.clone(),
                holder,
            };
            let message = err.to_string();
            self.record_failure(&key, &message);
            patch_status_logged(
                &api,
                &name,
                &key,
                backup_status_patch(BackupPhase::Failed, None, generation, Some(&message), Some(Utc::now())),
            )
            .await;
            return Err(err);
        }

        info!("Reconciling {} {}/{}", BACKUP_KIND, namespace, name);

        let started = Instant::now();
        let result = self.deploy_backup(obj, &namespace).await;
        self.metrics.observe(BACKUP_KIND, "deploy", result.is_ok(), started.elapsed());

        match result {
            Ok(endpoint) => {
                patch_status(
                    &api,
                    &name,
                    backup_status_patch(BackupPhase::Ready, Some(&endpoint), generation, None, Some(Utc::now())),
                )
                .await?;
                self.backoff.reset(&key);
                info!(
                    "✅ {} {}/{} is ready: bucket {} at {}",
                    BACKUP_KIND, namespace, name, endpoint.bucket_name, endpoint.storage_endpoint
                );
                Ok(Action::requeue(self.resync_interval))
            }
            Err(e) => {
                let message = failure_message(&e);
                self.record_failure(&key, &message);
                patch_status_logged(
                    &api,
                    &name,
                    &key,
                    backup_status_patch(BackupPhase::Failed, None, generation, Some(&message), Some(Utc::now())),
                )
                .await;
                Err(e.into())
            }
        }
    }

    async fn plan_infra(&self, obj: &ClusterInfrastructure, namespace: &str) -> Result<PlannedDeploy, OrchestratorError> {
        let ctx = InfraContext::for_deploy(obj.spec.clone(), namespace, self.secrets.as_ref()).await?;
        self.infra.plan(&ctx).await
    }

    async fn destroy_infra(&self, obj: &ClusterInfrastructure, namespace: &str) -> Result<InfraPhase, OrchestratorError> {
        self.infra
            .destroy(&Teardown::infra(&obj.spec, namespace), self.secrets.as_ref())
            .await
    }

    async fn deploy_backup(
        &self,
        obj: &BackupInfrastructure,
        namespace: &str,
    ) -> Result<StorageEndpointRef, OrchestratorError> {
        let ctx = BackupContext::load(&obj.spec, namespace, self.secrets.as_ref()).await?;
        self.backup.deploy(&ctx).await
    }

    async fn destroy_backup(&self, obj: &BackupInfrastructure, namespace: &str) -> Result<BackupOutcome, OrchestratorError> {
        self.backup
            .destroy(&Teardown::backup(&obj.spec, namespace), self.secrets.as_ref())
            .await
    }

    /// Key of an older object of `kind` with the same cluster ID, if any
    async fn competing_claim<K>(
        &self,
        kind: &str,
        obj: &K,
        cluster_id: fn(&K) -> &str,
    ) -> Result<Option<String>, ControllerError>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
            + Clone
            + std::fmt::Debug
            + serde::de::DeserializeOwned,
    {
        let api: Api<K> = match self.namespace.as_deref() {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let wanted = cluster_id(obj);
        let objects = api.list(&ListParams::default()).await?;
        let others = objects
            .items
            .iter()
            .filter(|other| cluster_id(other) == wanted)
            .map(|other| Claimant::of(kind, other));
        Ok(competing_holder(Claimant::of(kind, obj), others))
    }

    fn record_failure(&self, key: &str, message: &str) {
        let (delay, count) = self.backoff.record_failure(key, Instant::now());
        error!(
            "{} failed ({} consecutive): {}; retrying in {}s",
            key,
            count,
            message,
            delay.as_secs()
        );
    }
}

/// What the last status says about an object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Observation {
    settled: bool,
    failed: bool,
    generation: Option<i64>,
    at: Option<DateTime<Utc>>,
}

impl Observation {
    fn of_infra(status: Option<&ClusterInfraStatus>) -> Self {
        match status {
            Some(s) => Self {
                settled: s.phase == InfraPhase::Converged,
                failed: s.phase == InfraPhase::Failed,
                generation: s.observed_generation,
                at: s.last_reconciled,
            },
            None => Self::unobserved(),
        }
    }

    fn of_backup(status: Option<&BackupInfraStatus>) -> Self {
        match status {
            Some(s) => Self {
                settled: s.phase == BackupPhase::Ready,
                failed: s.phase == BackupPhase::Failed,
                generation: s.observed_generation,
                at: s.last_reconciled,
            },
            None => Self::unobserved(),
        }
    }

    fn unobserved() -> Self {
        Self {
            settled: false,
            failed: false,
            generation: None,
            at: None,
        }
    }

    /// Time until the next resync when the current generation is already settled
    fn resync_remaining(&self, generation: Option<i64>, now: DateTime<Utc>, resync: Duration) -> Option<Duration> {
        if !self.settled || self.generation != generation {
            return None;
        }
        let elapsed = (now - self.at?).to_std().unwrap_or(Duration::ZERO);
        resync.checked_sub(elapsed).filter(|remaining| !remaining.is_zero())
    }

    /// Whether the last attempt on this generation failed
    fn failed_at(&self, generation: Option<i64>) -> bool {
        self.failed && self.generation == generation
    }
}

fn infra_cluster_id(obj: &ClusterInfrastructure) -> &str {
    &obj.spec.cluster_id
}

fn backup_cluster_id(obj: &BackupInfrastructure) -> &str {
    &obj.spec.cluster_id
}

/// An object claiming a cluster ID, ranked by age
#[derive(Debug, Clone, PartialEq, Eq)]
struct Claimant<T> {
    created: Option<T>,
    key: String,
}

impl Claimant<Time> {
    fn of<K: Resource>(kind: &str, obj: &K) -> Self {
        Self {
            created: obj.meta().creation_timestamp.clone(),
            key: object_key(kind, obj),
        }
    }
}

impl<T: Ord> Claimant<T> {
    /// Oldest first, objects without a timestamp last, ties broken by key
    fn rank(&self) -> (bool, Option<&T>, &str) {
        (self.created.is_none(), self.created.as_ref(), &self.key)
    }
}

/// Holder of the claim when it is not `own`
fn competing_holder<T: Ord>(own: Claimant<T>, others: impl IntoIterator<Item = Claimant<T>>) -> Option<String> {
    let own_key = own.key.clone();
    let holder = others
        .into_iter()
        .chain(std::iter::once(own))
        .min_by(|a, b| a.rank().cmp(&b.rank()))?;
    (holder.key != own_key).then_some(holder.key)
}

fn resource_key(kind: &str, namespace: &str, name: &str) -> String {
    format!("{}/{}/{}", kind, namespace, name)
}

fn object_key<K: Resource>(kind: &str, obj: &K) -> String {
    let meta = obj.meta();
    resource_key(
        kind,
        meta.namespace.as_deref().unwrap_or("default"),
        meta.name.as_deref().unwrap_or_default(),
    )
}

fn failure_message(err: &OrchestratorError) -> String {
    format!("{} failed: {}", err.stage(), err)
}

fn has_finalizer(meta: &ObjectMeta) -> bool {
    meta.finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|x| x == FINALIZER))
}

/// Merge patch replacing the finalizer list with or without ours
fn finalizer_patch(meta: &ObjectMeta, present: bool) -> Value {
    let mut finals: Vec<String> = meta
        .finalizers
        .clone()
        .unwrap_or_default()
        .into_iter()
        .filter(|f| f != FINALIZER)
        .collect();
    if present {
        finals.push(FINALIZER.to_string());
    }
    json!({ "metadata": { "finalizers": finals } })
}

async fn add_finalizer<K>(api: &Api<K>, obj: &K) -> Result<(), ControllerError>
where
    K: Resource + Clone + std::fmt::Debug + serde::de::DeserializeOwned,
{
    info!("Adding finalizer to {}", obj.name_any());
    api.patch(&obj.name_any(), &PatchParams::default(), &Patch::Merge(&finalizer_patch(obj.meta(), true)))
        .await?;
    Ok(())
}

async fn remove_finalizer<K>(api: &Api<K>, obj: &K) -> Result<(), ControllerError>
where
    K: Resource + Clone + std::fmt::Debug + serde::de::DeserializeOwned,
{
    info!("Removing finalizer from {}", obj.name_any());
    api.patch(&obj.name_any(), &PatchParams::default(), &Patch::Merge(&finalizer_patch(obj.meta(), false)))
        .await?;
    Ok(())
}

/// Status patch with PascalCase phase values; `None` fields are left untouched
/// except `lastError`, which is cleared
fn infra_status_patch(
    phase: InfraPhase,
    generation: Option<i64>,
    error: Option<&str>,
    reconciled_at: Option<DateTime<Utc>>,
) -> Value {
    let mut status = Map::new();
    status.insert("phase".to_string(), json!(phase.as_str()));
    status.insert("lastError".to_string(), json!(error));
    insert_observed(&mut status, generation, reconciled_at);
    json!({ "status": status })
}

fn backup_status_patch(
    phase: BackupPhase,
    endpoint: Option<&StorageEndpointRef>,
    generation: Option<i64>,
    error: Option<&str>,
    reconciled_at: Option<DateTime<Utc>>,
) -> Value {
    let mut status = Map::new();
    status.insert("phase".to_string(), json!(phase.as_str()));
    status.insert("lastError".to_string(), json!(error));
    if let Some(endpoint) = endpoint {
        status.insert("bucketName".to_string(), json!(endpoint.bucket_name));
        status.insert("storageEndpoint".to_string(), json!(endpoint.storage_endpoint));
    }
    insert_observed(&mut status, generation, reconciled_at);
    json!({ "status": status })
}

fn insert_observed(status: &mut Map<String, Value>, generation: Option<i64>, reconciled_at: Option<DateTime<Utc>>) {
    if let Some(generation) = generation {
        status.insert("observedGeneration".to_string(), json!(generation));
    }
    if let Some(at) = reconciled_at {
        status.insert(
            "lastReconciled".to_string(),
            json!(at.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
    }
}

async fn patch_status<K>(api: &Api<K>, name: &str, patch: Value) -> Result<(), ControllerError>
where
    K: Resource + Clone + std::fmt::Debug + serde::de::DeserializeOwned,
{
    api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

/// Status update on a failure path; the original error is what gets returned
async fn patch_status_logged<K>(api: &Api<K>, name: &str, key: &str, patch: Value)
where
    K: Resource + Clone + std::fmt::Debug + serde::de::DeserializeOwned,
{
    if let Err(e) = patch_status(api, name, patch).await {
        warn!("Failed to update {} error status: {}", key, e);
    }
}
