//! ConvergenceEngine trait for mocking
//!
//! This trait abstracts the engine driver so orchestration logic can be
//! tested with a recording mock instead of a real Terraform installation.

use crate::error::ConvergenceError;
use crate::job::{ConvergenceJob, JobId};
use crate::state::{StateLookup, StateOutputs};

/// Operations of an idempotent infrastructure convergence engine
///
/// All calls block the caller until the engine reports a terminal result.
#[async_trait::async_trait]
pub trait ConvergenceEngine: Send + Sync {
    /// Converge live infrastructure toward the job's bound configuration
    ///
    /// Re-applying an unchanged configuration must not create duplicates.
    async fn apply(&self, job: &ConvergenceJob) -> Result<(), ConvergenceError>;

    /// Tear down previously converged infrastructure; succeeds when nothing exists
    async fn destroy(&self, job: &ConvergenceJob) -> Result<(), ConvergenceError>;

    /// Whether any state is recorded for the job, including state left by a failed apply
    async fn has_state(&self, id: &JobId) -> Result<bool, ConvergenceError>;

    /// Read named outputs of the last successful apply
    async fn state_output_variables(&self, id: &JobId, names: &[&str]) -> StateLookup<StateOutputs>;
}
