//! BackupInfrastructure CRD
//!
//! Declares the dedicated backup bucket (and its access resources) for a cluster.

use crate::cluster_infrastructure::validate_cluster_id;
use crate::error::SpecError;
use crate::provider::ProviderKind;
use crate::references::SecretReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Upper bound on bucket name length accepted by S3-compatible stores
const MAX_BUCKET_NAME_LEN: usize = 63;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "infra.microscaler.io",
    version = "v1alpha1",
    kind = "BackupInfrastructure",
    namespaced,
    status = "BackupInfraStatus",
    shortname = "binfra",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Bucket","type":"string","jsonPath":".status.bucketName"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfraSpec {
    /// Cloud provider hosting the bucket
    #[serde(default)]
    pub provider: ProviderKind,

    /// Provider region of the bucket
    pub region: String,

    /// Cluster identifier; the bucket name is derived from it unless `bucket` is set
    pub cluster_id: String,

    /// Explicit bucket name override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,

    /// Secret carrying storage-scoped credentials (`accessKeyID`, `accessKeySecret`)
    pub credentials_secret_ref: SecretReference,
}

/// Bucket to converge: identifier plus region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSpec {
    pub bucket: String,
    pub region: String,
}

impl BackupInfraSpec {
    /// Build the `BackupSpec` for this resource
    pub fn backup_spec(&self) -> Result<BackupSpec, SpecError> {
        validate_cluster_id(&self.cluster_id)?;
        if self.region.trim().is_empty() {
            return Err(SpecError::EmptyField("region"));
        }
        let bucket = match &self.bucket {
            Some(explicit) => {
                let derived = bucket_name_for(explicit)?;
                if &derived != explicit {
                    return Err(SpecError::InvalidBucketName(explicit.clone()));
                }
                derived
            }
            None => bucket_name_for(&self.cluster_id)?,
        };
        Ok(BackupSpec {
            bucket,
            region: self.region.clone(),
        })
    }
}

/// Derive a bucket name from a cluster identifier
///
/// Lowercases, maps anything outside `[a-z0-9-]` to `-`, trims leading and
/// trailing dashes and caps the length at 63 characters.
pub fn bucket_name_for(identifier: &str) -> Result<String, SpecError> {
    let mapped: String = identifier
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' { c } else { '-' })
        .collect();
    let mut name = mapped.trim_matches('-').to_string();
    name.truncate(MAX_BUCKET_NAME_LEN);
    let name = name.trim_end_matches('-').to_string();
    if name.len() < 3 {
        return Err(SpecError::InvalidBucketName(identifier.to_string()));
    }
    Ok(name)
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfraStatus {
    /// Lifecycle phase of the backup infrastructure
    pub phase: BackupPhase,

    /// Bucket name reported by the last successful apply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_name: Option<String>,

    /// Storage endpoint reported by the last successful apply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_endpoint: Option<String>,

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

/// Backup infrastructure lifecycle phase
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum BackupPhase {
    #[default]
    #[serde(alias = "pending")]
    Pending,
    #[serde(alias = "ready")]
    Ready,
    #[serde(alias = "purging")]
    Purging,
    #[serde(alias = "destroyed")]
    Destroyed,
    #[serde(alias = "failed")]
    Failed,
}

impl BackupPhase {
    /// PascalCase value written into `.status.phase`
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupPhase::Pending => "Pending",
            BackupPhase::Ready => "Ready",
            BackupPhase::Purging => "Purging",
            BackupPhase::Destroyed => "Destroyed",
            BackupPhase::Failed => "Failed",
        }
    }
}
