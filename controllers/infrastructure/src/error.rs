//! Controller-specific error types.
//!
//! Orchestration failures arrive wrapped as `Orchestrator`; everything else
//! here is Kubernetes plumbing, start-up configuration, or the metrics server.

use infra_orchestrator::OrchestratorError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the Infrastructure Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Deploy or destroy failed in the orchestrator
    #[error("{} failed: {}", .0.stage(), .0)]
    Orchestrator(#[from] OrchestratorError),

    /// Another object of the same kind already owns the cluster's engine state
    #[error("cluster ID '{cluster_id}' is already claimed by {holder}")]
    DuplicateClusterId { cluster_id: String, holder: String },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Metrics registration or encoding failed
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Metrics/probe server failed
    #[error("Server error: {0}")]
    Server(String),
}
