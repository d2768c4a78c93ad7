//! Orchestrator errors
//!
//! Every public operation either succeeds or returns exactly one error whose
//! [`Stage`] names where it stopped.

use crate::purger::PurgeError;
use crate::secrets::SecretError;
use cloud_client::CloudError;
use convergence_client::ConvergenceError;
use crds::{ProviderKind, SpecError};
use object_store_client::StorageError;
use std::fmt;
use thiserror::Error;

/// Engine operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Apply,
    Destroy,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Apply => write!(f, "apply"),
            Operation::Destroy => write!(f, "destroy"),
        }
    }
}

/// Stage at which an operation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    InvalidSpec,
    Discovery,
    NotFoundState,
    StateQuery,
    Convergence,
    Purge,
    Secret,
    Storage,
    ProviderClient,
    UnsupportedProvider,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::InvalidSpec => "invalid_spec",
            Stage::Discovery => "discovery",
            Stage::NotFoundState => "not_found_state",
            Stage::StateQuery => "state_query",
            Stage::Convergence => "convergence",
            Stage::Purge => "purge",
            Stage::Secret => "secret",
            Stage::Storage => "storage",
            Stage::ProviderClient => "provider_client",
            Stage::UnsupportedProvider => "unsupported_provider",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by the lifecycle controllers
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Spec rejected before anything external was contacted
    #[error("Invalid spec: {0}")]
    InvalidSpec(#[from] SpecError),

    /// Provider lookup for an adopted network failed
    #[error("Discovery of network {network_id} failed: {source}")]
    Discovery {
        network_id: String,
        #[source]
        source: CloudError,
    },

    /// Expected engine output is absent
    #[error("No state outputs {names:?} recorded for job {job}")]
    NotFoundState { job: String, names: Vec<String> },

    /// Reading engine state failed
    #[error("State query for job {job} failed: {source}")]
    StateQuery {
        job: String,
        #[source]
        source: ConvergenceError,
    },

    /// Engine apply/destroy failed
    #[error("Engine {operation} of job {job} failed: {source}")]
    Convergence {
        operation: Operation,
        job: String,
        #[source]
        source: ConvergenceError,
    },

    /// Emptying the bucket failed; the bucket was not torn down
    #[error("Purge of bucket {bucket} failed: {source}")]
    Purge {
        bucket: String,
        #[source]
        source: PurgeError,
    },

    #[error("Secret error: {0}")]
    Secret(#[from] SecretError),

    /// Object store client could not be set up
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Provider client could not be set up
    #[error("Provider client error: {0}")]
    ProviderClient(#[source] CloudError),

    #[error("Provider {0} is not supported")]
    UnsupportedProvider(ProviderKind),
}

impl OrchestratorError {
    pub fn stage(&self) -> Stage {
        match self {
            OrchestratorError::InvalidSpec(_) => Stage::InvalidSpec,
            OrchestratorError::Discovery { .. } => Stage::Discovery,
            OrchestratorError::NotFoundState { .. } => Stage::NotFoundState,
            OrchestratorError::StateQuery { .. } => Stage::StateQuery,
            OrchestratorError::Convergence { .. } => Stage::Convergence,
            OrchestratorError::Purge { .. } => Stage::Purge,
            OrchestratorError::Secret(_) => Stage::Secret,
            OrchestratorError::Storage(_) => Stage::Storage,
            OrchestratorError::ProviderClient(_) => Stage::ProviderClient,
            OrchestratorError::UnsupportedProvider(_) => Stage::UnsupportedProvider,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_of_each_error() {
        assert_eq!(
            OrchestratorError::InvalidSpec(SpecError::NoZones).stage(),
            Stage::InvalidSpec
        );
        assert_eq!(
            OrchestratorError::Purge {
                bucket: "b".to_string(),
                source: PurgeError::PageLimitExceeded { max_pages: 1 },
            }
            .stage(),
            Stage::Purge
        );
        assert_eq!(
            OrchestratorError::UnsupportedProvider(ProviderKind::Alicloud).stage(),
            Stage::UnsupportedProvider
        );
    }

    #[test]
    fn test_convergence_error_message_names_job() {
        let err = OrchestratorError::Convergence {
            operation: Operation::Destroy,
            job: "alpha/backup".to_string(),
            source: ConvergenceError::Engine("bucket not empty".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Engine destroy of job alpha/backup failed: Engine error: bucket not empty"
        );
    }
}
