//! Configuration building is a pure function of its inputs

mod common;

use common::{cluster_spec, creating};
use infra_orchestrator::provider::alicloud::AlicloudConfigBuilder;
use infra_orchestrator::{DiscoveredNetwork, NetworkPlan, ProviderConfigBuilder};

fn adopted() -> NetworkPlan {
    NetworkPlan::Adopted(DiscoveredNetwork {
        network_id: "net-123".to_string(),
        cidr: "10.0.0.0/16".to_string(),
        nat_gateway_id: "ngw-1".to_string(),
        snat_table_id: "snat-1".to_string(),
        internet_charge_type: "PayByTraffic".to_string(),
    })
}

#[test]
fn test_identical_input_builds_identical_bytes() {
    let spec = cluster_spec(creating("10.1.0.0/16"));
    let first = AlicloudConfigBuilder.infra_config(&spec, &adopted(), "ssh-rsa AAAA");
    let second = AlicloudConfigBuilder.infra_config(&spec.clone(), &adopted(), "ssh-rsa AAAA");

    assert_eq!(first.to_bytes().unwrap(), second.to_bytes().unwrap());
}

#[test]
fn test_different_key_changes_bytes() {
    let spec = cluster_spec(creating("10.1.0.0/16"));
    let a = AlicloudConfigBuilder.infra_config(&spec, &adopted(), "ssh-rsa AAAA");
    let b = AlicloudConfigBuilder.infra_config(&spec, &adopted(), "ssh-rsa BBBB");

    assert_ne!(a.to_bytes().unwrap(), b.to_bytes().unwrap());
}
