//! Secret material port
//!
//! Secrets are keyed byte blobs. The controller backs [`SecretStore`] with
//! Kubernetes Secrets; [`InMemorySecretStore`] serves tests and local runs.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Secret key holding the provider access key ID
pub const ACCESS_KEY_ID: &str = "accessKeyID";
/// Secret key holding the provider access key secret
pub const ACCESS_KEY_SECRET: &str = "accessKeySecret";
/// Secret key holding the SSH public key
pub const SSH_PUBLIC_KEY: &str = "id_rsa.pub";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecretError {
    #[error("Secret {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },

    #[error("Secret {namespace}/{name} has no key '{key}'")]
    MissingKey {
        namespace: String,
        name: String,
        key: String,
    },

    #[error("Secret {namespace}/{name} key '{key}' is not valid UTF-8")]
    InvalidUtf8 {
        namespace: String,
        name: String,
        key: String,
    },

    #[error("Secret backend error: {0}")]
    Backend(String),
}

/// Contents of one secret
///
/// `Debug` lists key names only.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecretData {
    namespace: String,
    name: String,
    data: BTreeMap<String, Vec<u8>>,
}

impl fmt::Debug for SecretData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretData")
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .field("keys", &self.data.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SecretData {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, data: BTreeMap<String, Vec<u8>>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            data,
        }
    }

    pub fn data(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.data
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.data.get(key).map(Vec::as_slice)
    }

    /// Value of `key` as a string, failing if it is absent or not UTF-8
    pub fn require_string(&self, key: &str) -> Result<String, SecretError> {
        let bytes = self.get(key).ok_or_else(|| SecretError::MissingKey {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            key: key.to_string(),
        })?;
        String::from_utf8(bytes.to_vec()).map_err(|_| SecretError::InvalidUtf8 {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            key: key.to_string(),
        })
    }
}

/// Keyed secret lookup
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<SecretData, SecretError>;
}

/// Secret store held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemorySecretStore {
    secrets: Arc<Mutex<HashMap<(String, String), BTreeMap<String, Vec<u8>>>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a secret from string values
    pub fn insert(&self, namespace: &str, name: &str, entries: &[(&str, &str)]) {
        let data = entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.as_bytes().to_vec()))
            .collect();
        lock(&self.secrets).insert((namespace.to_string(), name.to_string()), data);
    }

    pub fn remove(&self, namespace: &str, name: &str) {
        lock(&self.secrets).remove(&(namespace.to_string(), name.to_string()));
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<SecretData, SecretError> {
        lock(&self.secrets)
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .map(|data| SecretData::new(namespace, name, data))
            .ok_or_else(|| SecretError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_lookup() {
        let store = InMemorySecretStore::new();
        store.insert("garden", "cloud", &[(ACCESS_KEY_ID, "AKID")]);

        let secret = store.get("garden", "cloud").await.unwrap();
        assert_eq!(secret.require_string(ACCESS_KEY_ID).unwrap(), "AKID");
        assert!(matches!(
            secret.require_string(ACCESS_KEY_SECRET),
            Err(SecretError::MissingKey { .. })
        ));
        assert!(matches!(
            store.get("garden", "other").await,
            Err(SecretError::NotFound { .. })
        ));
    }

    #[test]
    fn test_debug_hides_values() {
        let data = BTreeMap::from([(ACCESS_KEY_SECRET.to_string(), b"hunter2".to_vec())]);
        let rendered = format!("{:?}", SecretData::new("ns", "cloud", data));
        assert!(rendered.contains(ACCESS_KEY_SECRET));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_invalid_utf8_is_reported() {
        let data = BTreeMap::from([(SSH_PUBLIC_KEY.to_string(), vec![0xff, 0xfe])]);
        let secret = SecretData::new("ns", "ssh", data);
        assert!(matches!(
            secret.require_string(SSH_PUBLIC_KEY),
            Err(SecretError::InvalidUtf8 { .. })
        ));
    }
}
