//! Resource discovery
//!
//! Resolves what the network block of the configuration must contain: either
//! the attributes of an adopted network, or the CIDR of one to be created.
//! Only read-only provider queries and engine state reads happen here.

use crate::error::OrchestratorError;
use async_trait::async_trait;
use cloud_client::{DEFAULT_INTERNET_CHARGE_TYPE, NetworkClient};
use convergence_client::{ConvergenceEngine, JobId, StateLookup};
use crds::{ClusterInfraSpec, SpecError};
use tracing::{debug, info};

/// Engine output of the infra job holding the network ID
pub const NETWORK_ID_OUTPUT: &str = "vpc_id";

/// Attributes of an existing network being adopted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredNetwork {
    pub network_id: String,
    pub cidr: String,
    pub nat_gateway_id: String,
    pub snat_table_id: String,
    pub internet_charge_type: String,
}

/// Network half of the configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkPlan {
    /// A new network is created with this CIDR
    Fresh { cidr: String, internet_charge_type: String },
    /// An existing network is adopted; creation is never attempted
    Adopted(DiscoveredNetwork),
}

impl NetworkPlan {
    pub fn creates_network(&self) -> bool {
        matches!(self, NetworkPlan::Fresh { .. })
    }

    pub fn cidr(&self) -> &str {
        match self {
            NetworkPlan::Fresh { cidr, .. } => cidr,
            NetworkPlan::Adopted(network) => &network.cidr,
        }
    }

    pub fn internet_charge_type(&self) -> &str {
        match self {
            NetworkPlan::Fresh {
                internet_charge_type, ..
            } => internet_charge_type,
            NetworkPlan::Adopted(network) => &network.internet_charge_type,
        }
    }
}

/// Produces the [`NetworkPlan`] for a spec
#[async_trait]
pub trait ResourceDiscovery: Send + Sync {
    /// Plan the network for `spec`
    ///
    /// `job` is the infra job whose prior state keys the charge type lookup.
    async fn plan_network(
        &self,
        spec: &ClusterInfraSpec,
        job: &JobId,
        network: &dyn NetworkClient,
        engine: &dyn ConvergenceEngine,
    ) -> Result<NetworkPlan, OrchestratorError>;
}

/// Discovery shared by providers whose network exposes a CIDR, a NAT gateway
/// and charged public addresses
#[derive(Debug, Clone)]
pub struct StandardDiscovery {
    default_charge_type: String,
}

impl Default for StandardDiscovery {
    fn default() -> Self {
        Self::new(DEFAULT_INTERNET_CHARGE_TYPE)
    }
}

impl StandardDiscovery {
    pub fn new(default_charge_type: impl Into<String>) -> Self {
        Self {
            default_charge_type: default_charge_type.into(),
        }
    }

    /// Charge type of the network recorded in the last converged state
    ///
    /// Without prior state (nothing converged yet) the provider default is used.
    pub async fn resolve_charge_type(
        &self,
        job: &JobId,
        network: &dyn NetworkClient,
        engine: &dyn ConvergenceEngine,
    ) -> Result<String, OrchestratorError> {
        match engine.state_output_variables(job, &[NETWORK_ID_OUTPUT]).await {
            StateLookup::Found(outputs) => {
                let network_id = outputs
                    .require(NETWORK_ID_OUTPUT)
                    .map_err(|source| OrchestratorError::StateQuery {
                        job: job.to_string(),
                        source,
                    })?
                    .to_string();
                let charge_type = network
                    .internet_charge_type(&network_id)
                    .await
                    .map_err(|source| OrchestratorError::Discovery {
                        network_id: network_id.clone(),
                        source,
                    })?;
                debug!("Charge type of network {} is {}", network_id, charge_type);
                Ok(charge_type)
            }
            StateLookup::NotFound => {
                debug!(
                    "No converged network for job {}, using default charge type {}",
                    job, self.default_charge_type
                );
                Ok(self.default_charge_type.clone())
            }
            StateLookup::Error(source) => Err(OrchestratorError::StateQuery {
                job: job.to_string(),
                source,
            }),
        }
    }
}

#[async_trait]
impl ResourceDiscovery for StandardDiscovery {
    async fn plan_network(
        &self,
        spec: &ClusterInfraSpec,
        job: &JobId,
        network: &dyn NetworkClient,
        engine: &dyn ConvergenceEngine,
    ) -> Result<NetworkPlan, OrchestratorError> {
        let Some(network_id) = spec.network.id.as_deref() else {
            let cidr = spec.network.cidr.clone().ok_or(SpecError::MissingNetworkCidr)?;
            let internet_charge_type = self.resolve_charge_type(job, network, engine).await?;
            return Ok(NetworkPlan::Fresh {
                cidr,
                internet_charge_type,
            });
        };

        let discovery_failed = |source| OrchestratorError::Discovery {
            network_id: network_id.to_string(),
            source,
        };
        let cidr = network.network_cidr(network_id).await.map_err(discovery_failed)?;
        let gateway = network.nat_gateway(network_id).await.map_err(discovery_failed)?;
        let internet_charge_type = self.resolve_charge_type(job, network, engine).await?;

        info!(
            "Adopting network {} ({}) with NAT gateway {}",
            network_id, cidr, gateway.nat_gateway_id
        );
        Ok(NetworkPlan::Adopted(DiscoveredNetwork {
            network_id: network_id.to_string(),
            cidr,
            nat_gateway_id: gateway.nat_gateway_id,
            snat_table_id: gateway.snat_table_id,
            internet_charge_type,
        }))
    }
}
