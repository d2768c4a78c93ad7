//! Network discovery trait
//!
//! Implemented by provider clients and by the mock used in tests.

use crate::error::CloudError;
use crate::models::NatGatewayInfo;
use async_trait::async_trait;

/// Read-only network queries against a cloud provider
#[async_trait]
pub trait NetworkClient: Send + Sync {
    /// CIDR block of an existing network
    async fn network_cidr(&self, network_id: &str) -> Result<String, CloudError>;

    /// NAT gateway attached to an existing network
    async fn nat_gateway(&self, network_id: &str) -> Result<NatGatewayInfo, CloudError>;

    /// Internet charge type of the public addresses bound to a network's NAT gateway
    ///
    /// Returns [`DEFAULT_INTERNET_CHARGE_TYPE`](crate::DEFAULT_INTERNET_CHARGE_TYPE)
    /// when the network has no gateway or no address is bound to it.
    async fn internet_charge_type(&self, network_id: &str) -> Result<String, CloudError>;
}
