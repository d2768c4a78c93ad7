//! Backup infrastructure lifecycle
//!
//! The bucket is emptied before the engine is asked to delete it, since
//! providers refuse to delete non-empty buckets.

use crate::context::{BackupContext, StorageEndpointRef, Teardown};
use crate::error::{Operation, OrchestratorError};
use crate::infra::convergence_failed;
use crate::provider::ProviderRegistry;
use crate::purger::{ObjectPurger, PurgeReport};
use crate::secrets::SecretStore;
use convergence_client::{ConvergenceEngine, ConvergenceJob, JobId, StateLookup, StateOutputs};
use crds::{SpecError, validate_cluster_id};
use std::sync::Arc;
use tracing::info;

/// Engine output holding the bucket name
pub const BUCKET_NAME_OUTPUT: &str = "bucketName";
/// Engine output holding the storage endpoint
pub const STORAGE_ENDPOINT_OUTPUT: &str = "storageEndpoint";

const ENDPOINT_OUTPUTS: [&str; 2] = [BUCKET_NAME_OUTPUT, STORAGE_ENDPOINT_OUTPUT];

/// Result of a successful backup destroy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    /// The bucket was purged and the engine destroyed it
    Destroyed {
        endpoint: StorageEndpointRef,
        report: PurgeReport,
    },
    /// No backup state was recorded; no secret was read and neither the store
    /// nor the engine teardown was called
    NothingToDestroy,
}

/// Deploys and destroys backup storage through the convergence engine
#[derive(Clone)]
pub struct BackupLifecycleController {
    engine: Arc<dyn ConvergenceEngine>,
    registry: Arc<ProviderRegistry>,
    purger: ObjectPurger,
}

impl std::fmt::Debug for BackupLifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupLifecycleController")
            .field("registry", &self.registry)
            .field("purger", &self.purger)
            .finish_non_exhaustive()
    }
}

impl BackupLifecycleController {
    pub fn new(engine: Arc<dyn ConvergenceEngine>, registry: Arc<ProviderRegistry>, purger: ObjectPurger) -> Self {
        Self {
            engine,
            registry,
            purger,
        }
    }

    /// Converge the backup bucket and return where it lives
    pub async fn deploy(&self, ctx: &BackupContext) -> Result<StorageEndpointRef, OrchestratorError> {
        validate_cluster_id(ctx.cluster_id())?;
        let id = ctx.job_id();
        let capabilities = self.registry.get(ctx.provider())?;
        let builder = &capabilities.config_builder;
        let variables = builder
            .variables(ctx.credentials())
            .map_err(|source| convergence_failed(Operation::Apply, &id, source))?;

        info!("Applying backup bucket {} for job {}", ctx.backup().bucket, id);
        let job = ConvergenceJob::new(id.clone())
            .with_variables(variables)
            .initialize_with(builder.backup_template(), builder.backup_config(ctx.backup()));
        self.engine
            .apply(&job)
            .await
            .map_err(|source| convergence_failed(Operation::Apply, &id, source))?;

        match self.engine.state_output_variables(&id, &ENDPOINT_OUTPUTS).await {
            StateLookup::Found(outputs) => endpoint_from(&id, &outputs),
            StateLookup::NotFound => Err(OrchestratorError::NotFoundState {
                job: id.to_string(),
                names: ENDPOINT_OUTPUTS.iter().map(ToString::to_string).collect(),
            }),
            StateLookup::Error(source) => Err(OrchestratorError::StateQuery {
                job: id.to_string(),
                source,
            }),
        }
    }

    /// Purge and tear down the backup bucket named by `teardown`
    ///
    /// The bucket comes from recorded state, never from the resource. Without
    /// recorded state this succeeds with [`BackupOutcome::NothingToDestroy`]
    /// before any secret is read, and skips engine teardown entirely,
    /// including any access resources a failed earlier apply may have left.
    /// A failed purge returns before the engine is called.
    pub async fn destroy(&self, teardown: &Teardown, secrets: &dyn SecretStore) -> Result<BackupOutcome, OrchestratorError> {
        let capabilities = self.registry.get(teardown.provider())?;
        let Some(id) = teardown.job_id() else {
            info!("Cluster ID of the resource names no backup job, nothing to destroy");
            return Ok(BackupOutcome::NothingToDestroy);
        };

        let endpoint = match self.engine.state_output_variables(&id, &ENDPOINT_OUTPUTS).await {
            StateLookup::Found(outputs) => endpoint_from(&id, &outputs)?,
            StateLookup::NotFound => {
                info!(
                    "Skipping backup bucket deletion for job {}: no storage endpoint in state",
                    id
                );
                return Ok(BackupOutcome::NothingToDestroy);
            }
            StateLookup::Error(source) => {
                return Err(OrchestratorError::StateQuery {
                    job: id.to_string(),
                    source,
                });
            }
        };

        if teardown.region().trim().is_empty() {
            return Err(SpecError::EmptyField("region").into());
        }
        let credentials = teardown.credentials(secrets).await?;
        let store = capabilities
            .clients
            .object_store(&endpoint, teardown.region(), &credentials)?;
        info!("Purging bucket {} for job {}", endpoint.bucket_name, id);
        let report = self
            .purger
            .purge(store.as_ref())
            .await
            .map_err(|source| OrchestratorError::Purge {
                bucket: endpoint.bucket_name.clone(),
                source,
            })?;

        let variables = capabilities
            .config_builder
            .variables(&credentials)
            .map_err(|source| convergence_failed(Operation::Destroy, &id, source))?;
        self.engine
            .destroy(&ConvergenceJob::new(id.clone()).with_variables(variables))
            .await
            .map_err(|source| convergence_failed(Operation::Destroy, &id, source))?;

        info!("Destroyed backup bucket {} for job {}", endpoint.bucket_name, id);
        Ok(BackupOutcome::Destroyed { endpoint, report })
    }
}

fn endpoint_from(id: &JobId, outputs: &StateOutputs) -> Result<StorageEndpointRef, OrchestratorError> {
    let require = |name: &str| {
        outputs
            .require(name)
            .map(str::to_string)
            .map_err(|source| OrchestratorError::StateQuery {
                job: id.to_string(),
                source,
            })
    };
    Ok(StorageEndpointRef {
        bucket_name: require(BUCKET_NAME_OUTPUT)?,
        storage_endpoint: require(STORAGE_ENDPOINT_OUTPUT)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CloudCredentials;
    use crate::provider::alicloud::AlicloudSettings;
    use crate::secrets::InMemorySecretStore;
    use convergence_client::{MockConvergenceEngine, Purpose};
    use crds::{BackupInfraSpec, BackupSpec, ProviderKind, SecretReference};

    fn ctx() -> BackupContext {
        BackupContext::new(
            ProviderKind::Alicloud,
            "alpha",
            BackupSpec {
                bucket: "alpha".to_string(),
                region: "cn-hangzhou".to_string(),
            },
            CloudCredentials::new("id", "secret"),
        )
    }

    fn controller(engine: &MockConvergenceEngine) -> BackupLifecycleController {
        BackupLifecycleController::new(
            Arc::new(engine.clone()),
            Arc::new(ProviderRegistry::with_defaults(AlicloudSettings::default())),
            ObjectPurger::default(),
        )
    }

    #[tokio::test]
    async fn test_deploy_reports_recorded_endpoint() {
        let engine = MockConvergenceEngine::new();
        engine.set_state_outputs(
            JobId::new("alpha", Purpose::Backup),
            StateOutputs::from_iter([
                (BUCKET_NAME_OUTPUT, "alpha"),
                (STORAGE_ENDPOINT_OUTPUT, "oss-cn-hangzhou.aliyuncs.com"),
            ]),
        );

        let endpoint = controller(&engine).deploy(&ctx()).await.unwrap();
        assert_eq!(endpoint.storage_endpoint, "oss-cn-hangzhou.aliyuncs.com");
        assert_eq!(engine.apply_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_deploy_without_outputs_is_not_found_state() {
        let engine = MockConvergenceEngine::new();
        let err = controller(&engine).deploy(&ctx()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::NotFoundState { .. }));
    }

    fn teardown(cluster_id: &str, region: &str) -> Teardown {
        Teardown::backup(
            &BackupInfraSpec {
                provider: ProviderKind::Alicloud,
                region: region.to_string(),
                cluster_id: cluster_id.to_string(),
                bucket: None,
                credentials_secret_ref: SecretReference::new("backup"),
            },
            "shoot-ns",
        )
    }

    #[tokio::test]
    async fn test_destroy_state_query_failure_stops_before_destroy() {
        let engine = MockConvergenceEngine::new();
        engine.fail_state_queries("backend unreachable");

        let err = controller(&engine)
            .destroy(&teardown("alpha", "cn-hangzhou"), &InMemorySecretStore::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::StateQuery { .. }));
        assert!(engine.destroy_calls().is_empty());
    }

    #[tokio::test]
    async fn test_deploy_rejects_path_like_cluster_id() {
        let engine = MockConvergenceEngine::new();
        let ctx = BackupContext::new(
            ProviderKind::Alicloud,
            "../alpha",
            BackupSpec {
                bucket: "alpha".to_string(),
                region: "cn-hangzhou".to_string(),
            },
            CloudCredentials::new("id", "secret"),
        );

        let err = controller(&engine).deploy(&ctx).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidSpec(SpecError::InvalidClusterId(_))));
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_destroy_with_state_requires_region() {
        let engine = MockConvergenceEngine::new();
        engine.set_state_outputs(
            JobId::new("alpha", Purpose::Backup),
            StateOutputs::from_iter([
                (BUCKET_NAME_OUTPUT, "alpha"),
                (STORAGE_ENDPOINT_OUTPUT, "oss-cn-hangzhou.aliyuncs.com"),
            ]),
        );

        let err = controller(&engine)
            .destroy(&teardown("alpha", ""), &InMemorySecretStore::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidSpec(SpecError::EmptyField("region"))));
        assert!(engine.destroy_calls().is_empty());
    }
}
