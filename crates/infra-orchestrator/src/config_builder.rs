//! Provider configuration builder
//!
//! Turns a spec plus its [`NetworkPlan`] into the configuration handed to the
//! convergence engine. Builders are pure: identical input always yields
//! byte-identical configuration, and nothing external is contacted.

use crate::context::CloudCredentials;
use crate::discovery::NetworkPlan;
use convergence_client::{ConvergenceConfig, ConvergenceError, VariablesEnvironment};
use crds::{BackupSpec, ClusterInfraSpec};

pub trait ProviderConfigBuilder: Send + Sync {
    /// Template bound to network infrastructure jobs
    fn infra_template(&self) -> &str;

    /// Template bound to backup infrastructure jobs
    fn backup_template(&self) -> &str;

    fn infra_config(&self, spec: &ClusterInfraSpec, plan: &NetworkPlan, ssh_public_key: &str) -> ConvergenceConfig;

    fn backup_config(&self, backup: &BackupSpec) -> ConvergenceConfig;

    /// Sensitive engine variables carrying the credentials
    ///
    /// Deploy and destroy of a job must use the same environment.
    fn variables(&self, credentials: &CloudCredentials) -> Result<VariablesEnvironment, ConvergenceError>;
}
