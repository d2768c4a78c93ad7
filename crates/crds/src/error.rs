//! Spec validation errors

use thiserror::Error;

/// Errors raised when a spec violates its invariants
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpecError {
    /// Zones and worker CIDRs are index-aligned and must have equal length
    #[error("zone count ({zones}) does not match worker CIDR count ({workers})")]
    ZoneWorkerMismatch { zones: usize, workers: usize },

    /// At least one zone is required
    #[error("at least one availability zone is required")]
    NoZones,

    /// A fresh network needs a CIDR to create it with
    #[error("network CIDR is required when no existing network ID is given")]
    MissingNetworkCidr,

    /// Malformed CIDR notation
    #[error("invalid CIDR '{0}'")]
    InvalidCidr(String),

    /// Required field left empty
    #[error("field '{0}' must not be empty")]
    EmptyField(&'static str),

    /// Cluster identifiers name engine jobs and state directories
    #[error("cluster ID '{0}' must be 1-63 lowercase alphanumerics or '-', starting and ending alphanumeric")]
    InvalidClusterId(String),

    /// Bucket name cannot be derived from the given identifier
    #[error("cannot derive a bucket name from '{0}'")]
    InvalidBucketName(String),
}
