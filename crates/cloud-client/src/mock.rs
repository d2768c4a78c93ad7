//! Mock network client for unit testing
//!
//! Networks are registered in memory; queries for unknown networks return
//! [`CloudError::NotFound`].

use crate::error::CloudError;
use crate::models::{DEFAULT_INTERNET_CHARGE_TYPE, NatGatewayInfo};
use crate::network_trait::NetworkClient;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone)]
struct MockNetwork {
    cidr: String,
    nat_gateway: Option<NatGatewayInfo>,
    charge_type: Option<String>,
}

/// Mock provider network API
#[derive(Debug, Clone, Default)]
pub struct MockNetworkClient {
    networks: Arc<Mutex<HashMap<String, MockNetwork>>>,
    calls: Arc<Mutex<Vec<String>>>,
    fail_all: Arc<Mutex<bool>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockNetworkClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a network with its CIDR and NAT gateway
    pub fn add_network(
        &self,
        network_id: impl Into<String>,
        cidr: impl Into<String>,
        nat_gateway_id: impl Into<String>,
        snat_table_id: impl Into<String>,
    ) {
        lock(&self.networks).insert(
            network_id.into(),
            MockNetwork {
                cidr: cidr.into(),
                nat_gateway: Some(NatGatewayInfo {
                    nat_gateway_id: nat_gateway_id.into(),
                    snat_table_id: snat_table_id.into(),
                }),
                charge_type: None,
            },
        );
    }

    /// Register a network without a NAT gateway
    pub fn add_bare_network(&self, network_id: impl Into<String>, cidr: impl Into<String>) {
        lock(&self.networks).insert(
            network_id.into(),
            MockNetwork {
                cidr: cidr.into(),
                nat_gateway: None,
                charge_type: None,
            },
        );
    }

    /// Set the charge type of the addresses bound to a network's gateway
    pub fn set_charge_type(&self, network_id: &str, charge_type: impl Into<String>) {
        if let Some(network) = lock(&self.networks).get_mut(network_id) {
            network.charge_type = Some(charge_type.into());
        }
    }

    /// Make every query fail with an API error
    pub fn fail_all(&self) {
        *lock(&self.fail_all) = true;
    }

    /// Queries made so far, as `"<method>:<id>"`
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    fn record(&self, method: &str, id: &str) -> Result<Option<MockNetwork>, CloudError> {
        lock(&self.calls).push(format!("{method}:{id}"));
        if *lock(&self.fail_all) {
            return Err(CloudError::Api {
                code: "Throttling".to_string(),
                message: "request was denied due to flow control".to_string(),
            });
        }
        Ok(lock(&self.networks).get(id).cloned())
    }
}

#[async_trait::async_trait]
impl NetworkClient for MockNetworkClient {
    async fn network_cidr(&self, network_id: &str) -> Result<String, CloudError> {
        self.record("network_cidr", network_id)?
            .map(|n| n.cidr)
            .ok_or_else(|| CloudError::NotFound(format!("VPC {network_id}")))
    }

    async fn nat_gateway(&self, network_id: &str) -> Result<NatGatewayInfo, CloudError> {
        self.record("nat_gateway", network_id)?
            .and_then(|n| n.nat_gateway)
            .ok_or_else(|| CloudError::NotFound(format!("NAT gateway of VPC {network_id}")))
    }

    async fn internet_charge_type(&self, network_id: &str) -> Result<String, CloudError> {
        Ok(self
            .record("internet_charge_type", network_id)?
            .and_then(|n| n.charge_type)
            .unwrap_or_else(|| DEFAULT_INTERNET_CHARGE_TYPE.to_string()))
    }
}
