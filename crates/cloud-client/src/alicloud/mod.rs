//! Alicloud VPC API client
//!
//! Uses the RPC-style API (`https://vpc.aliyuncs.com`, version 2016-04-28)
//! with JSON responses and HMAC-SHA1 signed query strings.

pub mod signer;

use crate::error::CloudError;
use crate::models::{
    ApiErrorResponse, DEFAULT_INTERNET_CHARGE_TYPE, DescribeEipAddressesResponse, DescribeNatGatewaysResponse,
    DescribeVpcsResponse, NatGatewayInfo,
};
use crate::network_trait::NetworkClient;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Public VPC endpoint
pub const DEFAULT_VPC_ENDPOINT: &str = "https://vpc.aliyuncs.com";
const VPC_API_VERSION: &str = "2016-04-28";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Alicloud VPC API client
pub struct AlicloudClient {
    client: Client,
    endpoint: String,
    region: String,
    access_key_id: String,
    access_key_secret: String,
}

impl fmt::Debug for AlicloudClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlicloudClient")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

impl AlicloudClient {
    /// Create a new client for one region
    ///
    /// # Errors
    /// Returns an error if the region or a key is empty, or the HTTP client cannot be built.
    pub fn new(
        region: impl Into<String>,
        access_key_id: impl Into<String>,
        access_key_secret: impl Into<String>,
    ) -> Result<Self, CloudError> {
        let region = region.into();
        let access_key_id = access_key_id.into();
        let access_key_secret = access_key_secret.into();
        if region.is_empty() {
            return Err(CloudError::InvalidConfig("region must not be empty".to_string()));
        }
        if access_key_id.is_empty() || access_key_secret.is_empty() {
            return Err(CloudError::InvalidConfig("access key must not be empty".to_string()));
        }

        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            endpoint: DEFAULT_VPC_ENDPOINT.to_string(),
            region,
            access_key_id,
            access_key_secret,
        })
    }

    /// Override the API endpoint (private endpoints, test servers)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Signed query string for one API action
    fn signed_query(
        &self,
        action: &str,
        extra: &[(&str, &str)],
        nonce: &str,
        timestamp: &str,
    ) -> Result<String, CloudError> {
        let mut params: BTreeMap<String, String> = [
            ("Action", action),
            ("Version", VPC_API_VERSION),
            ("Format", "JSON"),
            ("RegionId", self.region.as_str()),
            ("AccessKeyId", self.access_key_id.as_str()),
            ("SignatureMethod", "HMAC-SHA1"),
            ("SignatureVersion", "1.0"),
            ("SignatureNonce", nonce),
            ("Timestamp", timestamp),
        ]
        .into_iter()
        .chain(extra.iter().copied())
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let signature = signer::sign("GET", &params, &self.access_key_secret)?;
        params.insert("Signature".to_string(), signature);
        Ok(signer::canonical_query(&params))
    }

    async fn call<T: DeserializeOwned>(&self, action: &str, extra: &[(&str, &str)]) -> Result<T, CloudError> {
        let nonce = uuid::Uuid::new_v4().to_string();
        let timestamp = chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string();
        let url = format!("{}/?{}", self.endpoint, self.signed_query(action, extra, &nonce, &timestamp)?);
        debug!("Calling Alicloud {} in {}", action, self.region);

        let response = self.client.get(&url).header("Accept", "application/json").send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<ApiErrorResponse>(&body) {
                Ok(err) => CloudError::Api {
                    code: err.code,
                    message: err.message,
                },
                Err(_) => CloudError::Api {
                    code: status.as_u16().to_string(),
                    message: body.chars().take(500).collect(),
                },
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            CloudError::InvalidResponse(format!(
                "{action}: {e} - Response (first 500 chars): {}",
                body.chars().take(500).collect::<String>()
            ))
        })
    }
}

#[async_trait::async_trait]
impl NetworkClient for AlicloudClient {
    async fn network_cidr(&self, network_id: &str) -> Result<String, CloudError> {
        let resp: DescribeVpcsResponse = self.call("DescribeVpcs", &[("VpcId", network_id)]).await?;
        let vpc = resp
            .vpcs
            .vpc
            .into_iter()
            .find(|v| v.vpc_id == network_id)
            .ok_or_else(|| CloudError::NotFound(format!("VPC {network_id}")))?;
        if vpc.cidr_block.is_empty() {
            return Err(CloudError::InvalidResponse(format!("VPC {network_id} has no CIDR block")));
        }
        Ok(vpc.cidr_block)
    }

    async fn nat_gateway(&self, network_id: &str) -> Result<NatGatewayInfo, CloudError> {
        let resp: DescribeNatGatewaysResponse = self.call("DescribeNatGateways", &[("VpcId", network_id)]).await?;
        let gateway = resp
            .nat_gateways
            .nat_gateway
            .into_iter()
            .next()
            .ok_or_else(|| CloudError::NotFound(format!("NAT gateway of VPC {network_id}")))?;
        let snat_table_id = gateway
            .snat_table_ids
            .snat_table_id
            .into_iter()
            .next()
            .ok_or_else(|| {
                CloudError::InvalidResponse(format!("NAT gateway {} has no SNAT table", gateway.nat_gateway_id))
            })?;
        Ok(NatGatewayInfo {
            nat_gateway_id: gateway.nat_gateway_id,
            snat_table_id,
        })
    }

    async fn internet_charge_type(&self, network_id: &str) -> Result<String, CloudError> {
        let gateway = match self.nat_gateway(network_id).await {
            Ok(gateway) => gateway,
            Err(CloudError::NotFound(_)) => return Ok(DEFAULT_INTERNET_CHARGE_TYPE.to_string()),
            Err(e) => return Err(e),
        };
        let resp: DescribeEipAddressesResponse = self
            .call(
                "DescribeEipAddresses",
                &[
                    ("AssociatedInstanceType", "Nat"),
                    ("AssociatedInstanceId", gateway.nat_gateway_id.as_str()),
                ],
            )
            .await?;
        Ok(resp
            .eip_addresses
            .eip_address
            .into_iter()
            .map(|eip| eip.internet_charge_type)
            .find(|charge| !charge.is_empty())
            .unwrap_or_else(|| DEFAULT_INTERNET_CHARGE_TYPE.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> AlicloudClient {
        AlicloudClient::new("cn-hangzhou", "testid", "testsecret").unwrap()
    }

    #[test]
    fn test_new_rejects_empty_credentials() {
        assert!(matches!(
            AlicloudClient::new("cn-hangzhou", "", "secret"),
            Err(CloudError::InvalidConfig(_))
        ));
        assert!(matches!(
            AlicloudClient::new("", "id", "secret"),
            Err(CloudError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_with_endpoint_trims_trailing_slash() {
        let client = client().with_endpoint("http://127.0.0.1:9000/");
        assert_eq!(client.endpoint(), "http://127.0.0.1:9000");
    }

    #[test]
    fn test_signed_query_is_sorted_and_signed() {
        let query = client()
            .signed_query("DescribeVpcs", &[("VpcId", "vpc-1")], "nonce-1", "2024-01-02T03:04:05Z")
            .unwrap();
        let keys: Vec<&str> = query.split('&').filter_map(|kv| kv.split('=').next()).collect();
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        assert_eq!(keys, sorted);
        assert!(query.contains("Action=DescribeVpcs"));
        assert!(query.contains("RegionId=cn-hangzhou"));
        assert!(query.contains("Timestamp=2024-01-02T03%3A04%3A05Z"));
        assert!(query.contains("VpcId=vpc-1"));
        assert!(query.contains("Signature="));
    }

    #[test]
    fn test_signed_query_is_deterministic_for_fixed_nonce() {
        let c = client();
        let a = c.signed_query("DescribeVpcs", &[], "n", "2024-01-02T03:04:05Z").unwrap();
        let b = c.signed_query("DescribeVpcs", &[], "n", "2024-01-02T03:04:05Z").unwrap();
        assert_eq!(a, b);
    }
}
