//! Provider network models

use serde::Deserialize;

/// Charge type assumed when no public address is bound
pub const DEFAULT_INTERNET_CHARGE_TYPE: &str = "PayByTraffic";

/// NAT gateway of a network together with its SNAT table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NatGatewayInfo {
    pub nat_gateway_id: String,
    pub snat_table_id: String,
}

/// Error body returned by the RPC API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApiErrorResponse {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeVpcsResponse {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub vpcs: VpcList,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VpcList {
    #[serde(default)]
    pub vpc: Vec<Vpc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Vpc {
    pub vpc_id: String,
    #[serde(default)]
    pub cidr_block: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeNatGatewaysResponse {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub nat_gateways: NatGatewayList,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NatGatewayList {
    #[serde(default)]
    pub nat_gateway: Vec<NatGateway>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NatGateway {
    pub nat_gateway_id: String,
    #[serde(default)]
    pub snat_table_ids: SnatTableIds,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SnatTableIds {
    #[serde(default)]
    pub snat_table_id: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeEipAddressesResponse {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub eip_addresses: EipAddressList,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EipAddressList {
    #[serde(default)]
    pub eip_address: Vec<EipAddress>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EipAddress {
    #[serde(default)]
    pub allocation_id: Option<String>,
    #[serde(default)]
    pub internet_charge_type: String,
}
