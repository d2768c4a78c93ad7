//! Infrastructure convergence orchestrator
//!
//! Decides whether a cluster's network is adopted or created, builds the
//! deterministic engine configuration, drives the convergence engine through
//! apply/destroy, and empties backup buckets before tearing them down.
//!
//! # Example
//!
//! ```no_run
//! use infra_orchestrator::{
//!     InfraContext, InfraLifecycleController, InMemorySecretStore, ProviderRegistry,
//! };
//! use infra_orchestrator::provider::alicloud::AlicloudSettings;
//! use convergence_client::{TerraformEngine, TerraformEngineConfig};
//! use std::sync::Arc;
//!
//! # async fn example(spec: crds::ClusterInfraSpec) -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Arc::new(TerraformEngine::new(TerraformEngineConfig::default()));
//! let registry = Arc::new(ProviderRegistry::with_defaults(AlicloudSettings::default()));
//! let secrets = InMemorySecretStore::new();
//!
//! let ctx = InfraContext::for_deploy(spec, "garden-dev", &secrets).await?;
//! let phase = InfraLifecycleController::new(engine, registry).deploy(&ctx).await?;
//! # Ok(())
//! # }
//! ```

pub mod backup;
pub mod config_builder;
pub mod context;
pub mod discovery;
pub mod error;
pub mod provider;
pub mod purger;
pub mod secrets;
pub mod infra;

pub use backup::{BackupLifecycleController, BackupOutcome};
pub use config_builder::ProviderConfigBuilder;
pub use context::{BackupContext, CloudCredentials, InfraContext, StorageEndpointRef, Teardown};
pub use discovery::{DiscoveredNetwork, NetworkPlan, ResourceDiscovery, StandardDiscovery};
pub use error::{Operation, OrchestratorError, Stage};
pub use infra::{InfraLifecycleController, PlannedDeploy};
pub use provider::{ProviderCapabilities, ProviderClients, ProviderRegistry};
pub use purger::{ObjectPurger, PurgeError, PurgeReport, DEFAULT_MAX_PAGES};
pub use secrets::{InMemorySecretStore, SecretData, SecretError, SecretStore};
