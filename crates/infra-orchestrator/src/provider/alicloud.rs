//! Alicloud capability set
//!
//! Network infrastructure is a VPC with a NAT gateway and SNAT table; backup
//! infrastructure is an OSS bucket. Both are converged from the
//! `alicloud-infra` and `alicloud-backup` templates.

use super::{ProviderCapabilities, ProviderClients};
use crate::config_builder::ProviderConfigBuilder;
use crate::context::{CloudCredentials, StorageEndpointRef};
use crate::discovery::{NetworkPlan, StandardDiscovery};
use crate::error::OrchestratorError;
use cloud_client::{AlicloudClient, NetworkClient};
use convergence_client::{ConvergenceConfig, ConvergenceError, VariablesEnvironment};
use crds::{BackupSpec, ClusterInfraSpec};
use object_store_client::{ObjectStore, S3ObjectStore, S3StoreConfig};
use serde_json::json;
use std::sync::Arc;

pub const INFRA_TEMPLATE: &str = "alicloud-infra";
pub const BACKUP_TEMPLATE: &str = "alicloud-backup";

/// Engine expressions resolved by the template when the VPC is created
pub const VPC_ID_PLACEHOLDER: &str = "${alicloud_vpc.vpc.id}";
pub const NAT_GATEWAY_ID_PLACEHOLDER: &str = "${alicloud_nat_gateway.nat_gateway.id}";
pub const SNAT_TABLE_ID_PLACEHOLDER: &str = "${alicloud_nat_gateway.nat_gateway.snat_table_ids}";

/// Client settings for Alicloud
#[derive(Debug, Clone)]
pub struct AlicloudSettings {
    /// VPC API endpoint override
    pub vpc_endpoint: Option<String>,
    /// Keys requested per bucket listing page
    pub object_page_size: usize,
}

impl Default for AlicloudSettings {
    fn default() -> Self {
        Self {
            vpc_endpoint: None,
            object_page_size: object_store_client::s3::DEFAULT_PAGE_SIZE,
        }
    }
}

pub fn capabilities(settings: AlicloudSettings) -> ProviderCapabilities {
    ProviderCapabilities {
        discovery: Arc::new(StandardDiscovery::default()),
        config_builder: Arc::new(AlicloudConfigBuilder),
        clients: Arc::new(AlicloudClients { settings }),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlicloudConfigBuilder;

impl ProviderConfigBuilder for AlicloudConfigBuilder {
    fn infra_template(&self) -> &str {
        INFRA_TEMPLATE
    }

    fn backup_template(&self) -> &str {
        BACKUP_TEMPLATE
    }

    fn infra_config(&self, spec: &ClusterInfraSpec, plan: &NetworkPlan, ssh_public_key: &str) -> ConvergenceConfig {
        let (vpc_id, nat_gateway_id, snat_table_id) = match plan {
            NetworkPlan::Fresh { .. } => (
                VPC_ID_PLACEHOLDER,
                NAT_GATEWAY_ID_PLACEHOLDER,
                SNAT_TABLE_ID_PLACEHOLDER,
            ),
            NetworkPlan::Adopted(network) => (
                network.network_id.as_str(),
                network.nat_gateway_id.as_str(),
                network.snat_table_id.as_str(),
            ),
        };
        let zones: Vec<_> = spec
            .zone_workers()
            .map(|(zone, worker)| json!({"name": zone, "cidr": {"worker": worker}}))
            .collect();

        ConvergenceConfig::new(json!({
            "alicloud": {"region": spec.region},
            "create": {"vpc": plan.creates_network()},
            "vpc": {
                "cidr": plan.cidr(),
                "id": vpc_id,
                "natGatewayID": nat_gateway_id,
                "snatTableID": snat_table_id,
                "internetChargeType": plan.internet_charge_type(),
            },
            "clusterName": spec.cluster_id,
            "sshPublicKey": ssh_public_key,
            "zones": zones,
        }))
    }

    fn backup_config(&self, backup: &BackupSpec) -> ConvergenceConfig {
        ConvergenceConfig::new(json!({
            "alicloud": {"region": backup.region},
            "bucket": {"name": backup.bucket},
        }))
    }

    fn variables(&self, credentials: &CloudCredentials) -> Result<VariablesEnvironment, ConvergenceError> {
        let mut env = VariablesEnvironment::new();
        env.insert("ACCESS_KEY_ID", credentials.access_key_id.as_str());
        env.insert("ACCESS_KEY_SECRET", credentials.access_key_secret.as_str());
        Ok(env)
    }
}

/// Builds Alicloud VPC and OSS clients
#[derive(Debug, Clone)]
pub struct AlicloudClients {
    settings: AlicloudSettings,
}

impl ProviderClients for AlicloudClients {
    fn network_client(
        &self,
        region: &str,
        credentials: &CloudCredentials,
    ) -> Result<Arc<dyn NetworkClient>, OrchestratorError> {
        let client = AlicloudClient::new(
            region,
            credentials.access_key_id.as_str(),
            credentials.access_key_secret.as_str(),
        )
        .map_err(OrchestratorError::ProviderClient)?;
        let client = match &self.settings.vpc_endpoint {
            Some(endpoint) => client.with_endpoint(endpoint.as_str()),
            None => client,
        };
        Ok(Arc::new(client))
    }

    fn object_store(
        &self,
        endpoint: &StorageEndpointRef,
        region: &str,
        credentials: &CloudCredentials,
    ) -> Result<Arc<dyn ObjectStore>, OrchestratorError> {
        let config = S3StoreConfig::new(
            endpoint.bucket_name.as_str(),
            region,
            &endpoint.storage_endpoint,
            credentials.access_key_id.as_str(),
            credentials.access_key_secret.as_str(),
        )
        .with_page_size(self.settings.object_page_size);
        Ok(Arc::new(S3ObjectStore::new(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::DiscoveredNetwork;
    use crds::{NetworkSpec, ProviderKind, SecretReference};

    fn spec() -> ClusterInfraSpec {
        ClusterInfraSpec {
            provider: ProviderKind::Alicloud,
            region: "eu-central-1".to_string(),
            zones: vec!["eu-central-1a".to_string(), "eu-central-1b".to_string()],
            worker_cidrs: vec!["10.1.0.0/19".to_string(), "10.1.32.0/19".to_string()],
            network: NetworkSpec {
                id: None,
                cidr: Some("10.1.0.0/16".to_string()),
            },
            cluster_id: "shoot--dev--alpha".to_string(),
            ssh_key_secret_ref: SecretReference::new("ssh"),
            credentials_secret_ref: SecretReference::new("cloud"),
        }
    }

    fn fresh() -> NetworkPlan {
        NetworkPlan::Fresh {
            cidr: "10.1.0.0/16".to_string(),
            internet_charge_type: "PayByTraffic".to_string(),
        }
    }

    #[test]
    fn test_zones_keep_input_order() {
        let config = AlicloudConfigBuilder.infra_config(&spec(), &fresh(), "ssh-rsa AAAA");
        assert_eq!(
            config.pointer("/zones").unwrap(),
            &json!([
                {"name": "eu-central-1a", "cidr": {"worker": "10.1.0.0/19"}},
                {"name": "eu-central-1b", "cidr": {"worker": "10.1.32.0/19"}},
            ])
        );
        assert_eq!(config.pointer("/clusterName").unwrap(), "shoot--dev--alpha");
        assert_eq!(config.pointer("/alicloud/region").unwrap(), "eu-central-1");
        assert_eq!(config.pointer("/sshPublicKey").unwrap(), "ssh-rsa AAAA");
    }

    #[test]
    fn test_adopted_network_uses_discovered_ids() {
        let plan = NetworkPlan::Adopted(DiscoveredNetwork {
            network_id: "vpc-1".to_string(),
            cidr: "10.0.0.0/16".to_string(),
            nat_gateway_id: "ngw-1".to_string(),
            snat_table_id: "stb-1".to_string(),
            internet_charge_type: "PayByBandwidth".to_string(),
        });
        let config = AlicloudConfigBuilder.infra_config(&spec(), &plan, "key");
        assert_eq!(config.pointer("/create/vpc").unwrap(), false);
        assert_eq!(config.pointer("/vpc/id").unwrap(), "vpc-1");
        assert_eq!(config.pointer("/vpc/internetChargeType").unwrap(), "PayByBandwidth");
    }

    #[test]
    fn test_backup_config_shape() {
        let backup = BackupSpec {
            bucket: "alpha-backup".to_string(),
            region: "eu-central-1".to_string(),
        };
        assert_eq!(
            AlicloudConfigBuilder.backup_config(&backup).value(),
            &json!({"alicloud": {"region": "eu-central-1"}, "bucket": {"name": "alpha-backup"}})
        );
    }

    #[test]
    fn test_variables_carry_prefixed_credentials() {
        let env = AlicloudConfigBuilder
            .variables(&CloudCredentials::new("AKID", "SECRET"))
            .unwrap();
        assert_eq!(env.get("TF_VAR_ACCESS_KEY_ID"), Some("AKID"));
        assert_eq!(env.get("TF_VAR_ACCESS_KEY_SECRET"), Some("SECRET"));
    }

    #[test]
    fn test_object_store_for_recorded_endpoint() {
        let clients = AlicloudClients {
            settings: AlicloudSettings::default(),
        };
        let endpoint = StorageEndpointRef {
            bucket_name: "alpha-backup".to_string(),
            storage_endpoint: "oss-eu-central-1.aliyuncs.com".to_string(),
        };
        assert!(
            clients
                .object_store(&endpoint, "eu-central-1", &CloudCredentials::new("AKID", "SECRET"))
                .is_ok()
        );
    }
}
