//! Per-invocation orchestration context
//!
//! A context is built fresh for every deploy call from the resource and the
//! secrets it references, and is only ever borrowed by the components that
//! consume it. Destroy calls take a [`Teardown`] instead, which resolves
//! credentials only once engine state shows there is something to tear down.

use crate::error::OrchestratorError;
use crate::secrets::{ACCESS_KEY_ID, ACCESS_KEY_SECRET, SSH_PUBLIC_KEY, SecretData, SecretError, SecretStore};
use convergence_client::{JobId, Purpose};
use crds::{BackupInfraSpec, BackupSpec, ClusterInfraSpec, ProviderKind, SecretReference, validate_cluster_id};
use std::fmt;

/// Provider access key pair
#[derive(Clone, PartialEq, Eq)]
pub struct CloudCredentials {
    pub access_key_id: String,
    pub access_key_secret: String,
}

impl fmt::Debug for CloudCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudCredentials")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

impl CloudCredentials {
    pub fn new(access_key_id: impl Into<String>, access_key_secret: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
        }
    }

    pub fn from_secret(secret: &SecretData) -> Result<Self, SecretError> {
        Ok(Self {
            access_key_id: secret.require_string(ACCESS_KEY_ID)?,
            access_key_secret: secret.require_string(ACCESS_KEY_SECRET)?,
        })
    }
}

/// Bucket and endpoint recorded by the backup job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEndpointRef {
    pub bucket_name: String,
    pub storage_endpoint: String,
}

/// Inputs of one network infrastructure deploy
#[derive(Debug, Clone)]
pub struct InfraContext {
    spec: ClusterInfraSpec,
    credentials: CloudCredentials,
    ssh_public_key: Option<String>,
}

impl InfraContext {
    pub fn new(spec: ClusterInfraSpec, credentials: CloudCredentials, ssh_public_key: Option<String>) -> Self {
        Self {
            spec,
            credentials,
            ssh_public_key,
        }
    }

    /// Load credentials and the SSH public key referenced by the resource
    ///
    /// `namespace` applies to references without their own namespace.
    pub async fn for_deploy(
        spec: ClusterInfraSpec,
        namespace: &str,
        secrets: &dyn SecretStore,
    ) -> Result<Self, OrchestratorError> {
        let credentials = load_credentials(&spec.credentials_secret_ref, namespace, secrets).await?;
        let ssh_ref = &spec.ssh_key_secret_ref;
        let ssh_public_key = secrets
            .get(ssh_ref.namespace_or(namespace), &ssh_ref.name)
            .await?
            .require_string(SSH_PUBLIC_KEY)?;
        Ok(Self::new(spec, credentials, Some(ssh_public_key)))
    }

    pub fn spec(&self) -> &ClusterInfraSpec {
        &self.spec
    }

    pub fn credentials(&self) -> &CloudCredentials {
        &self.credentials
    }

    pub fn ssh_public_key(&self) -> Option<&str> {
        self.ssh_public_key.as_deref()
    }

    pub fn provider(&self) -> ProviderKind {
        self.spec.provider
    }

    pub fn job_id(&self) -> JobId {
        JobId::new(&self.spec.cluster_id, Purpose::Infra)
    }
}

/// Inputs of one backup infrastructure deploy
#[derive(Debug, Clone)]
pub struct BackupContext {
    provider: ProviderKind,
    cluster_id: String,
    backup: BackupSpec,
    credentials: CloudCredentials,
}

impl BackupContext {
    pub fn new(
        provider: ProviderKind,
        cluster_id: impl Into<String>,
        backup: BackupSpec,
        credentials: CloudCredentials,
    ) -> Self {
        Self {
            provider,
            cluster_id: cluster_id.into(),
            backup,
            credentials,
        }
    }

    /// Resolve the bucket and load the storage credentials referenced by the resource
    pub async fn load(
        spec: &BackupInfraSpec,
        namespace: &str,
        secrets: &dyn SecretStore,
    ) -> Result<Self, OrchestratorError> {
        let backup = spec.backup_spec()?;
        let credentials = load_credentials(&spec.credentials_secret_ref, namespace, secrets).await?;
        Ok(Self::new(spec.provider, &spec.cluster_id, backup, credentials))
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    pub fn backup(&self) -> &BackupSpec {
        &self.backup
    }

    pub fn credentials(&self) -> &CloudCredentials {
        &self.credentials
    }

    pub fn job_id(&self) -> JobId {
        JobId::new(&self.cluster_id, Purpose::Backup)
    }
}

/// Inputs of one destroy call
///
/// Built without validating the rest of the resource: an object that never
/// deployed must still be deletable. The region is only checked by callers
/// that find state to tear down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Teardown {
    provider: ProviderKind,
    cluster_id: String,
    purpose: Purpose,
    region: String,
    credentials_secret_ref: SecretReference,
}

impl Teardown {
    pub fn infra(spec: &ClusterInfraSpec, namespace: &str) -> Self {
        Self::new(
            spec.provider,
            &spec.cluster_id,
            Purpose::Infra,
            &spec.region,
            resolved(&spec.credentials_secret_ref, namespace),
        )
    }

    pub fn backup(spec: &BackupInfraSpec, namespace: &str) -> Self {
        Self::new(
            spec.provider,
            &spec.cluster_id,
            Purpose::Backup,
            &spec.region,
            resolved(&spec.credentials_secret_ref, namespace),
        )
    }

    /// `credentials_secret_ref` must carry its namespace
    pub fn new(
        provider: ProviderKind,
        cluster_id: impl Into<String>,
        purpose: Purpose,
        region: impl Into<String>,
        credentials_secret_ref: SecretReference,
    ) -> Self {
        Self {
            provider,
            cluster_id: cluster_id.into(),
            purpose,
            region: region.into(),
            credentials_secret_ref,
        }
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Engine job to tear down, or `None` when the cluster ID could never
    /// have named one
    pub fn job_id(&self) -> Option<JobId> {
        validate_cluster_id(&self.cluster_id)
            .ok()
            .map(|()| JobId::new(&self.cluster_id, self.purpose))
    }

    pub async fn credentials(&self, secrets: &dyn SecretStore) -> Result<CloudCredentials, OrchestratorError> {
        load_credentials(&self.credentials_secret_ref, "", secrets).await
    }
}

fn resolved(reference: &SecretReference, namespace: &str) -> SecretReference {
    SecretReference::with_namespace(&reference.name, reference.namespace_or(namespace))
}

async fn load_credentials(
    reference: &SecretReference,
    namespace: &str,
    secrets: &dyn SecretStore,
) -> Result<CloudCredentials, OrchestratorError> {
    let secret = secrets.get(reference.namespace_or(namespace), &reference.name).await?;
    Ok(CloudCredentials::from_secret(&secret)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::InMemorySecretStore;
    use crds::{NetworkSpec, SecretReference};

    fn spec() -> ClusterInfraSpec {
        ClusterInfraSpec {
            provider: ProviderKind::Alicloud,
            region: "cn-hangzhou".to_string(),
            zones: vec!["cn-hangzhou-a".to_string()],
            worker_cidrs: vec!["10.1.0.0/19".to_string()],
            network: NetworkSpec {
                id: None,
                cidr: Some("10.1.0.0/16".to_string()),
            },
            cluster_id: "shoot--dev--alpha".to_string(),
            ssh_key_secret_ref: SecretReference::new("ssh-keypair"),
            credentials_secret_ref: SecretReference::with_namespace("cloud", "garden"),
        }
    }

    #[tokio::test]
    async fn test_for_deploy_resolves_both_secrets() {
        let secrets = InMemorySecretStore::new();
        secrets.insert("garden", "cloud", &[(ACCESS_KEY_ID, "AKID"), (ACCESS_KEY_SECRET, "SECRET")]);
        secrets.insert("shoot-ns", "ssh-keypair", &[(SSH_PUBLIC_KEY, "ssh-rsa AAAA")]);

        let ctx = InfraContext::for_deploy(spec(), "shoot-ns", &secrets).await.unwrap();
        assert_eq!(ctx.credentials(), &CloudCredentials::new("AKID", "SECRET"));
        assert_eq!(ctx.ssh_public_key(), Some("ssh-rsa AAAA"));
        assert_eq!(ctx.job_id(), JobId::new("shoot--dev--alpha", Purpose::Infra));
    }

    #[tokio::test]
    async fn test_missing_credentials_secret() {
        let secrets = InMemorySecretStore::new();
        secrets.insert("shoot-ns", "ssh-keypair", &[(SSH_PUBLIC_KEY, "ssh-rsa AAAA")]);
        let err = InfraContext::for_deploy(spec(), "shoot-ns", &secrets).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Secret(SecretError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_teardown_resolves_credentials_lazily() {
        let secrets = InMemorySecretStore::new();
        let local = ClusterInfraSpec {
            credentials_secret_ref: SecretReference::new("cloud"),
            ..spec()
        };
        let teardown = Teardown::infra(&local, "shoot-ns");
        assert_eq!(teardown.job_id(), Some(JobId::new("shoot--dev--alpha", Purpose::Infra)));
        assert!(matches!(
            teardown.credentials(&secrets).await,
            Err(OrchestratorError::Secret(SecretError::NotFound { .. }))
        ));

        secrets.insert("shoot-ns", "cloud", &[(ACCESS_KEY_ID, "AKID"), (ACCESS_KEY_SECRET, "SECRET")]);
        assert_eq!(
            teardown.credentials(&secrets).await.unwrap(),
            CloudCredentials::new("AKID", "SECRET")
        );
    }

    #[test]
    fn test_teardown_ignores_invalid_bucket_and_region() {
        let backup = BackupInfraSpec {
            provider: ProviderKind::Alicloud,
            region: String::new(),
            cluster_id: "ab".to_string(),
            bucket: Some("Bad_Name".to_string()),
            credentials_secret_ref: SecretReference::new("backup"),
        };
        assert!(backup.backup_spec().is_err());

        let teardown = Teardown::backup(&backup, "shoot-ns");
        assert_eq!(teardown.job_id(), Some(JobId::new("ab", Purpose::Backup)));
        assert_eq!(teardown.region(), "");
    }

    #[test]
    fn test_teardown_without_valid_cluster_id_names_no_job() {
        let escaping = ClusterInfraSpec {
            cluster_id: "../other".to_string(),
            ..spec()
        };
        assert_eq!(Teardown::infra(&escaping, "shoot-ns").job_id(), None);
    }

    #[test]
    fn test_credentials_debug_hides_secret() {
        let rendered = format!("{:?}", CloudCredentials::new("AKID", "SECRET"));
        assert!(rendered.contains("AKID"));
        assert!(!rendered.contains("SECRET"));
    }
}
