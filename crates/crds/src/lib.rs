//! Infrastructure CRD Definitions
//!
//! Kubernetes Custom Resource Definitions consumed by the infrastructure
//! controller, plus the plain data-model types the orchestrator works on.

pub mod backup_infrastructure;
pub mod cluster_infrastructure;
pub mod error;
pub mod provider;
pub mod references;

pub use backup_infrastructure::*;
pub use cluster_infrastructure::*;
pub use error::SpecError;
pub use provider::ProviderKind;
pub use references::SecretReference;

/// API group shared by every CRD in this crate
pub const API_GROUP: &str = "infra.microscaler.io";
