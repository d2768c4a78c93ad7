//! Shared fixtures for orchestrator integration tests

#![allow(dead_code)]

use cloud_client::{MockNetworkClient, NetworkClient};
use convergence_client::MockConvergenceEngine;
use crds::{BackupInfraSpec, BackupSpec, ClusterInfraSpec, NetworkSpec, ProviderKind, SecretReference};
use infra_orchestrator::provider::alicloud::AlicloudConfigBuilder;
use infra_orchestrator::secrets::{ACCESS_KEY_ID, ACCESS_KEY_SECRET};
use infra_orchestrator::{
    BackupContext, CloudCredentials, InMemorySecretStore, InfraContext, ObjectPurger, OrchestratorError,
    ProviderCapabilities, ProviderClients, ProviderRegistry, StandardDiscovery, StorageEndpointRef, Teardown,
};
use object_store_client::{MockObjectStore, ObjectStore};
use std::sync::{Arc, Mutex};

/// Clients handing out shared mocks instead of real provider clients
pub struct StaticClients {
    pub network: MockNetworkClient,
    pub store: MockObjectStore,
    pub requested_endpoints: Mutex<Vec<StorageEndpointRef>>,
}

impl ProviderClients for StaticClients {
    fn network_client(
        &self,
        _region: &str,
        _credentials: &CloudCredentials,
    ) -> Result<Arc<dyn NetworkClient>, OrchestratorError> {
        Ok(Arc::new(self.network.clone()))
    }

    fn object_store(
        &self,
        endpoint: &StorageEndpointRef,
        _region: &str,
        _credentials: &CloudCredentials,
    ) -> Result<Arc<dyn ObjectStore>, OrchestratorError> {
        self.requested_endpoints
            .lock()
            .unwrap()
            .push(endpoint.clone());
        Ok(Arc::new(self.store.clone()))
    }
}

/// Engine, mocks and a registry wired together
pub struct Harness {
    pub engine: MockConvergenceEngine,
    pub clients: Arc<StaticClients>,
    pub registry: Arc<ProviderRegistry>,
    pub journal: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    pub fn new(store: MockObjectStore) -> Self {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let engine = MockConvergenceEngine::new().with_journal(Arc::clone(&journal));
        let clients = Arc::new(StaticClients {
            network: MockNetworkClient::new(),
            store: store.with_journal(Arc::clone(&journal)),
            requested_endpoints: Mutex::new(Vec::new()),
        });

        let mut registry = ProviderRegistry::new();
        registry.register(
            ProviderKind::Alicloud,
            ProviderCapabilities {
                discovery: Arc::new(StandardDiscovery::default()),
                config_builder: Arc::new(AlicloudConfigBuilder),
                clients: Arc::clone(&clients) as Arc<dyn ProviderClients>,
            },
        );

        Self {
            engine,
            clients,
            registry: Arc::new(registry),
            journal,
        }
    }

    pub fn infra(&self) -> infra_orchestrator::InfraLifecycleController {
        infra_orchestrator::InfraLifecycleController::new(Arc::new(self.engine.clone()), Arc::clone(&self.registry))
    }

    pub fn backup(&self) -> infra_orchestrator::BackupLifecycleController {
        infra_orchestrator::BackupLifecycleController::new(
            Arc::new(self.engine.clone()),
            Arc::clone(&self.registry),
            ObjectPurger::default(),
        )
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }
}

pub fn credentials() -> CloudCredentials {
    CloudCredentials::new("AKID", "SECRET")
}

pub fn cluster_spec(network: NetworkSpec) -> ClusterInfraSpec {
    ClusterInfraSpec {
        provider: ProviderKind::Alicloud,
        region: "cn-hangzhou".to_string(),
        zones: vec!["cn-hangzhou-a".to_string(), "cn-hangzhou-b".to_string()],
        worker_cidrs: vec!["10.0.0.0/19".to_string(), "10.0.32.0/19".to_string()],
        network,
        cluster_id: "shoot--dev--alpha".to_string(),
        ssh_key_secret_ref: SecretReference::new("ssh-keypair"),
        credentials_secret_ref: SecretReference::new("cloudprovider"),
    }
}

pub fn adopting(id: &str) -> NetworkSpec {
    NetworkSpec {
        id: Some(id.to_string()),
        cidr: None,
    }
}

pub fn creating(cidr: &str) -> NetworkSpec {
    NetworkSpec {
        id: None,
        cidr: Some(cidr.to_string()),
    }
}

pub fn infra_context(network: NetworkSpec) -> InfraContext {
    InfraContext::new(
        cluster_spec(network),
        credentials(),
        Some("ssh-rsa AAAAB3Nza alpha".to_string()),
    )
}

pub fn backup_context() -> BackupContext {
    BackupContext::new(
        ProviderKind::Alicloud,
        "shoot--dev--alpha",
        BackupSpec {
            bucket: "shoot--dev--alpha".to_string(),
            region: "cn-hangzhou".to_string(),
        },
        credentials(),
    )
}

/// Namespace of the resources under test
pub const NAMESPACE: &str = "garden-dev";

/// Secret store holding the `cloudprovider` credentials both specs reference
pub fn secrets() -> InMemorySecretStore {
    let secrets = InMemorySecretStore::new();
    secrets.insert(NAMESPACE, "cloudprovider", &[(ACCESS_KEY_ID, "AKID"), (ACCESS_KEY_SECRET, "SECRET")]);
    secrets
}

pub fn infra_teardown() -> Teardown {
    Teardown::infra(&cluster_spec(creating("10.1.0.0/16")), NAMESPACE)
}

pub fn backup_infra_spec() -> BackupInfraSpec {
    BackupInfraSpec {
        provider: ProviderKind::Alicloud,
        region: "cn-hangzhou".to_string(),
        cluster_id: "shoot--dev--alpha".to_string(),
        bucket: None,
        credentials_secret_ref: SecretReference::new("cloudprovider"),
    }
}

pub fn backup_teardown() -> Teardown {
    Teardown::backup(&backup_infra_spec(), NAMESPACE)
}
