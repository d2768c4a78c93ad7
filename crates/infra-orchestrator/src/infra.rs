//! Network infrastructure lifecycle
//!
//! Deploy: `Idle -> Planning -> Converging -> Converged | Failed`, split into
//! `plan` and `converge` so callers can report each phase.
//! Destroy: `Idle -> Destroying -> Destroyed | Failed`.
//! Both calls return only once the engine has finished.

use crate::context::{InfraContext, Teardown};
use crate::discovery::NetworkPlan;
use crate::error::{Operation, OrchestratorError};
use crate::provider::{ProviderCapabilities, ProviderRegistry};
use crate::secrets::{SSH_PUBLIC_KEY, SecretError, SecretStore};
use convergence_client::{ConvergenceEngine, ConvergenceJob, JobId};
use crds::InfraPhase;
use std::sync::Arc;
use tracing::{info, warn};

/// Logs phase transitions of one job
struct PhaseLog {
    job: String,
    phase: InfraPhase,
}

impl PhaseLog {
    fn start(job: &JobId) -> Self {
        Self::resume(job, InfraPhase::Idle)
    }

    fn advance(&mut self, next: InfraPhase) {
        info!("Job {}: {} -> {}", self.job, self.phase.as_str(), next.as_str());
        self.phase = next;
    }

    fn resume(job: &JobId, phase: InfraPhase) -> Self {
        Self {
            job: job.to_string(),
            phase,
        }
    }

    fn fail(&self, e: &OrchestratorError) {
        warn!(
            "Job {}: {} -> {} at stage {}: {}",
            self.job,
            self.phase.as_str(),
            InfraPhase::Failed.as_str(),
            e.stage(),
            e
        );
    }

    fn finish(mut self, result: Result<(), OrchestratorError>, done: InfraPhase) -> Result<InfraPhase, OrchestratorError> {
        match result {
            Ok(()) => {
                self.advance(done);
                Ok(done)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }
}

/// A deploy whose network is planned and whose engine job is bound
///
/// Produced by [`InfraLifecycleController::plan`]; handing it to
/// [`InfraLifecycleController::converge`] runs the engine.
#[derive(Debug)]
pub struct PlannedDeploy {
    job: ConvergenceJob,
    plan: NetworkPlan,
}

impl PlannedDeploy {
    pub fn plan(&self) -> &NetworkPlan {
        &self.plan
    }

    pub fn job_id(&self) -> &JobId {
        self.job.id()
    }
}

/// Deploys and destroys network infrastructure through the convergence engine
#[derive(Clone)]
pub struct InfraLifecycleController {
    engine: Arc<dyn ConvergenceEngine>,
    registry: Arc<ProviderRegistry>,
}

impl std::fmt::Debug for InfraLifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfraLifecycleController")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl InfraLifecycleController {
    pub fn new(engine: Arc<dyn ConvergenceEngine>, registry: Arc<ProviderRegistry>) -> Self {
        Self { engine, registry }
    }

    /// Converge the network infrastructure of `ctx`
    ///
    /// Returns [`InfraPhase::Converged`] on success. Adoption happens whenever
    /// the cluster names an existing network, and a failed discovery aborts
    /// before the engine is called.
    pub async fn deploy(&self, ctx: &InfraContext) -> Result<InfraPhase, OrchestratorError> {
        let planned = self.plan(ctx).await?;
        self.converge(planned).await
    }

    /// Planning phase of a deploy: validation, discovery and config building
    ///
    /// Nothing is applied; the engine is only asked for prior state outputs.
    pub async fn plan(&self, ctx: &InfraContext) -> Result<PlannedDeploy, OrchestratorError> {
        let id = ctx.job_id();
        let mut log = PhaseLog::start(&id);
        log.advance(InfraPhase::Planning);
        self.discover_and_bind(ctx, &id).await.inspect_err(|e| log.fail(e))
    }

    async fn discover_and_bind(&self, ctx: &InfraContext, id: &JobId) -> Result<PlannedDeploy, OrchestratorError> {
        let spec = ctx.spec();
        spec.validate()?;
        let capabilities = self.registry.get(ctx.provider())?;
        let ssh_public_key = ctx.ssh_public_key().ok_or_else(|| SecretError::MissingKey {
            namespace: spec.ssh_key_secret_ref.namespace.clone().unwrap_or_default(),
            name: spec.ssh_key_secret_ref.name.clone(),
            key: SSH_PUBLIC_KEY.to_string(),
        })?;

        let network = capabilities.clients.network_client(&spec.region, ctx.credentials())?;
        let plan = capabilities
            .discovery
            .plan_network(spec, id, network.as_ref(), self.engine.as_ref())
            .await?;
        let builder = &capabilities.config_builder;
        let config = builder.infra_config(spec, &plan, ssh_public_key);
        let variables = builder
            .variables(ctx.credentials())
            .map_err(|source| convergence_failed(Operation::Apply, id, source))?;

        let job = ConvergenceJob::new(id.clone())
            .with_variables(variables)
            .initialize_with(builder.infra_template(), config);
        Ok(PlannedDeploy { job, plan })
    }

    /// Converging phase of a deploy: apply the planned job
    pub async fn converge(&self, planned: PlannedDeploy) -> Result<InfraPhase, OrchestratorError> {
        let id = planned.job.id().clone();
        let mut log = PhaseLog::resume(&id, InfraPhase::Planning);
        log.advance(InfraPhase::Converging);
        let result = self
            .engine
            .apply(&planned.job)
            .await
            .map_err(|source| convergence_failed(Operation::Apply, &id, source));
        log.finish(result, InfraPhase::Converged)
    }

    /// Tear down the network infrastructure named by `teardown`
    ///
    /// Uses the same variables environment as deploy. A job without recorded
    /// state is destroyed without reading any secret, so a resource whose
    /// credentials are already gone can still be deleted.
    pub async fn destroy(&self, teardown: &Teardown, secrets: &dyn SecretStore) -> Result<InfraPhase, OrchestratorError> {
        let capabilities = self.registry.get(teardown.provider())?;
        let Some(id) = teardown.job_id() else {
            info!("Cluster ID of the resource names no engine job, nothing to destroy");
            return Ok(InfraPhase::Destroyed);
        };
        let mut log = PhaseLog::start(&id);
        log.advance(InfraPhase::Destroying);
        let result = self.teardown(capabilities, teardown, &id, secrets).await;
        log.finish(result, InfraPhase::Destroyed)
    }

    async fn teardown(
        &self,
        capabilities: &ProviderCapabilities,
        teardown: &Teardown,
        id: &JobId,
        secrets: &dyn SecretStore,
    ) -> Result<(), OrchestratorError> {
        let recorded = self
            .engine
            .has_state(id)
            .await
            .map_err(|source| OrchestratorError::StateQuery {
                job: id.to_string(),
                source,
            })?;
        if !recorded {
            info!("No state recorded for job {}, nothing to destroy", id);
            return Ok(());
        }

        let credentials = teardown.credentials(secrets).await?;
        let variables = capabilities
            .config_builder
            .variables(&credentials)
            .map_err(|source| convergence_failed(Operation::Destroy, id, source))?;
        let job = ConvergenceJob::new(id.clone()).with_variables(variables);
        self.engine
            .destroy(&job)
            .await
            .map_err(|source| convergence_failed(Operation::Destroy, id, source))
    }
}

pub(crate) fn convergence_failed(
    operation: Operation,
    id: &JobId,
    source: convergence_client::ConvergenceError,
) -> OrchestratorError {
    OrchestratorError::Convergence {
        operation,
        job: id.to_string(),
        source,
    }
}
