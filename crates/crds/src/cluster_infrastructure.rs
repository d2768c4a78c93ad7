//! ClusterInfrastructure CRD
//!
//! Declares the per-cluster network infrastructure: region, zones with their
//! worker CIDRs, and either an existing network to adopt or a CIDR for a new one.

use crate::error::SpecError;
use crate::provider::ProviderKind;
use crate::references::SecretReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "infra.microscaler.io",
    version = "v1alpha1",
    kind = "ClusterInfrastructure",
    namespaced,
    status = "ClusterInfraStatus",
    shortname = "cinfra",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInfraSpec {
    /// Cloud provider hosting the cluster
    #[serde(default)]
    pub provider: ProviderKind,

    /// Provider region (e.g. "eu-central-1")
    pub region: String,

    /// Availability zones, in order
    pub zones: Vec<String>,

    /// Worker CIDR per zone; entry i belongs to `zones[i]`
    pub worker_cidrs: Vec<String>,

    /// Network to adopt or create
    #[serde(default)]
    pub network: NetworkSpec,

    /// Cluster identifier, used as the infrastructure name and engine job name
    pub cluster_id: String,

    /// Secret carrying the SSH public key (`id_rsa.pub`)
    pub ssh_key_secret_ref: SecretReference,

    /// Secret carrying the provider credentials (`accessKeyID`, `accessKeySecret`)
    pub credentials_secret_ref: SecretReference,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    /// Existing network (VPC) identifier; when set the network is adopted, never created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// CIDR for a newly created network
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,
}

impl ClusterInfraSpec {
    /// Whether an existing network must be adopted
    pub fn adopts_existing_network(&self) -> bool {
        self.network.id.is_some()
    }

    /// Zones paired with their worker CIDR, in input order
    pub fn zone_workers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.zones
            .iter()
            .zip(self.worker_cidrs.iter())
            .map(|(zone, cidr)| (zone.as_str(), cidr.as_str()))
    }

    /// Check the field invariants before anything external is contacted
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.region.trim().is_empty() {
            return Err(SpecError::EmptyField("region"));
        }
        validate_cluster_id(&self.cluster_id)?;
        if self.zones.is_empty() {
            return Err(SpecError::NoZones);
        }
        if self.zones.len() != self.worker_cidrs.len() {
            return Err(SpecError::ZoneWorkerMismatch {
                zones: self.zones.len(),
                workers: self.worker_cidrs.len(),
            });
        }
        for cidr in &self.worker_cidrs {
            validate_cidr(cidr)?;
        }
        match (&self.network.id, &self.network.cidr) {
            (Some(id), _) if id.trim().is_empty() => Err(SpecError::EmptyField("network.id")),
            (Some(_), _) => Ok(()),
            (None, Some(cidr)) => validate_cidr(cidr),
            (None, None) => Err(SpecError::MissingNetworkCidr),
        }
    }
}

/// Longest cluster identifier accepted, as for a DNS label
const MAX_CLUSTER_ID_LEN: usize = 63;

/// Validate a cluster identifier as a DNS label
///
/// The identifier becomes a path segment of the engine state, so separators
/// and dot segments are never accepted.
pub fn validate_cluster_id(cluster_id: &str) -> Result<(), SpecError> {
    if cluster_id.is_empty() {
        return Err(SpecError::EmptyField("clusterId"));
    }
    let allowed = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-';
    let valid = cluster_id.len() <= MAX_CLUSTER_ID_LEN
        && cluster_id.chars().all(allowed)
        && !cluster_id.starts_with('-')
        && !cluster_id.ends_with('-');
    if !valid {
        return Err(SpecError::InvalidClusterId(cluster_id.to_string()));
    }
    Ok(())
}

/// Validate `address/prefix` notation for IPv4 and IPv6
pub fn validate_cidr(cidr: &str) -> Result<(), SpecError> {
    let invalid = || SpecError::InvalidCidr(cidr.to_string());
    let (address, prefix) = cidr.split_once('/').ok_or_else(invalid)?;
    let address: IpAddr = address.parse().map_err(|_| invalid())?;
    let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
    let max = if address.is_ipv4() { 32 } else { 128 };
    if prefix > max {
        return Err(invalid());
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInfraStatus {
    /// Lifecycle phase of the network infrastructure
    pub phase: InfraPhase,

    /// Generation last converged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Error message if the last operation failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    /// Last reconciliation timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconciled: Option<chrono::DateTime<chrono::Utc>>,
}

/// Network infrastructure lifecycle phase
///
/// Deploy: Idle -> Planning -> Converging -> Converged | Failed.
/// Destroy: Idle -> Destroying -> Destroyed | Failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum InfraPhase {
    #[default]
    #[serde(alias = "idle")]
    Idle,
    #[serde(alias = "planning")]
    Planning,
    #[serde(alias = "converging")]
    Converging,
    #[serde(alias = "converged")]
    Converged,
    #[serde(alias = "destroying")]
    Destroying,
    #[serde(alias = "destroyed")]
    Destroyed,
    #[serde(alias = "failed")]
    Failed,
}

impl InfraPhase {
    /// PascalCase value written into `.status.phase`
    pub fn as_str(&self) -> &'static str {
        match self {
            InfraPhase::Idle => "Idle",
            InfraPhase::Planning => "Planning",
            InfraPhase::Converging => "Converging",
            InfraPhase::Converged => "Converged",
            InfraPhase::Destroying => "Destroying",
            InfraPhase::Destroyed => "Destroyed",
            InfraPhase::Failed => "Failed",
        }
    }

    /// Whether no further transition follows without a new request
    pub fn is_terminal(&self) -> bool {
        matches!(self, InfraPhase::Converged | InfraPhase::Destroyed | InfraPhase::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
            ssh_key_secret_ref: SecretReference::new("ssh-keypair"),
            credentials_secret_ref: SecretReference::new("cloudprovider"),
        }
    }

    #[test]
    fn test_valid_fresh_network_spec() {
        assert_eq!(spec().validate(), Ok(()));
    }

    #[test]
    fn test_zone_worker_mismatch_rejected() {
        let mut s = spec();
        s.worker_cidrs.pop();
        assert_eq!(
            s.validate(),
            Err(SpecError::ZoneWorkerMismatch { zones: 2, workers: 1 })
        );
    }

    #[test]
    fn test_fresh_network_requires_cidr() {
        let mut s = spec();
        s.network.cidr = None;
        assert_eq!(s.validate(), Err(SpecError::MissingNetworkCidr));
    }

    #[test]
    fn test_adopted_network_needs_no_cidr() {
        let mut s = spec();
        s.network = NetworkSpec {
            id: Some("vpc-123".to_string()),
            cidr: None,
        };
        assert!(s.adopts_existing_network());
        assert_eq!(s.validate(), Ok(()));
    }

    #[test]
    fn test_zone_workers_preserve_order() {
        let s = spec();
        let pairs: Vec<_> = s.zone_workers().collect();
        assert_eq!(
            pairs,
            vec![("eu-central-1a", "10.1.0.0/19"), ("eu-central-1b", "10.1.32.0/19")]
        );
    }

    #[test]
    fn test_validate_cidr() {
        assert!(validate_cidr("10.0.0.0/16").is_ok());
        assert!(validate_cidr("fd00::/64").is_ok());
        assert!(validate_cidr("10.0.0.0/33").is_err());
        assert!(validate_cidr("10.0.0.0").is_err());
        assert!(validate_cidr("not-an-ip/8").is_err());
    }

    #[test]
    fn test_cluster_id_must_be_dns_label() {
        assert_eq!(validate_cluster_id("shoot--dev--alpha"), Ok(()));
        assert_eq!(validate_cluster_id("a"), Ok(()));
        assert_eq!(validate_cluster_id(""), Err(SpecError::EmptyField("clusterId")));
        for bad in ["../x", "a/b", "..", "Shoot", "-alpha", "alpha-", "a.b"] {
            assert_eq!(
                validate_cluster_id(bad),
                Err(SpecError::InvalidClusterId(bad.to_string())),
                "{bad}"
            );
        }
        assert!(validate_cluster_id(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_path_like_cluster_id_rejected() {
        let mut s = spec();
        s.cluster_id = "../../etc".to_string();
        assert_eq!(s.validate(), Err(SpecError::InvalidClusterId("../../etc".to_string())));
    }

    #[test]
    fn test_phase_accepts_lowercase() {
        let phase: InfraPhase = serde_json::from_str("\"converged\"").unwrap();
        assert_eq!(phase, InfraPhase::Converged);
        assert_eq!(serde_json::to_string(&InfraPhase::Failed).unwrap(), "\"Failed\"");
    }
}
