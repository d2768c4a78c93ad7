//! Provider capability sets
//!
//! The lifecycle controllers are provider-agnostic; everything that differs
//! per cloud is looked up here by the resource's [`ProviderKind`].

pub mod alicloud;

use crate::config_builder::ProviderConfigBuilder;
use crate::context::{CloudCredentials, StorageEndpointRef};
use crate::discovery::ResourceDiscovery;
use crate::error::OrchestratorError;
use cloud_client::NetworkClient;
use crds::ProviderKind;
use object_store_client::ObjectStore;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Constructs provider clients scoped to one invocation's credentials
pub trait ProviderClients: Send + Sync {
    fn network_client(
        &self,
        region: &str,
        credentials: &CloudCredentials,
    ) -> Result<Arc<dyn NetworkClient>, OrchestratorError>;

    fn object_store(
        &self,
        endpoint: &StorageEndpointRef,
        region: &str,
        credentials: &CloudCredentials,
    ) -> Result<Arc<dyn ObjectStore>, OrchestratorError>;
}

/// Everything the lifecycle controllers need from one provider
#[derive(Clone)]
pub struct ProviderCapabilities {
    pub discovery: Arc<dyn ResourceDiscovery>,
    pub config_builder: Arc<dyn ProviderConfigBuilder>,
    pub clients: Arc<dyn ProviderClients>,
}

impl fmt::Debug for ProviderCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCapabilities")
            .field("infra_template", &self.config_builder.infra_template())
            .field("backup_template", &self.config_builder.backup_template())
            .finish_non_exhaustive()
    }
}

/// Capability sets keyed by provider
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, ProviderCapabilities>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in provider
    pub fn with_defaults(alicloud: alicloud::AlicloudSettings) -> Self {
        let mut registry = Self::new();
        registry.register(ProviderKind::Alicloud, alicloud::capabilities(alicloud));
        registry
    }

    pub fn register(&mut self, kind: ProviderKind, capabilities: ProviderCapabilities) {
        self.providers.insert(kind, capabilities);
    }

    pub fn get(&self, kind: ProviderKind) -> Result<&ProviderCapabilities, OrchestratorError> {
        self.providers
            .get(&kind)
            .ok_or(OrchestratorError::UnsupportedProvider(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_registry_rejects_provider() {
        let err = ProviderRegistry::new().get(ProviderKind::Alicloud).unwrap_err();
        assert!(matches!(err, OrchestratorError::UnsupportedProvider(ProviderKind::Alicloud)));
    }

    #[test]
    fn test_defaults_register_alicloud() {
        let registry = ProviderRegistry::with_defaults(alicloud::AlicloudSettings::default());
        let caps = registry.get(ProviderKind::Alicloud).unwrap();
        assert_eq!(caps.config_builder.infra_template(), "alicloud-infra");
    }
}
