//! Convergence Engine Client
//!
//! Drives an infrastructure convergence engine through apply/destroy jobs and
//! reads named outputs from the state of the last successful apply.
//!
//! # Example
//!
//! ```no_run
//! use convergence_client::{
//!     ConvergenceConfig, ConvergenceEngine, ConvergenceJob, JobId, Purpose, TerraformEngine,
//!     TerraformEngineConfig, VariablesEnvironment,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = TerraformEngine::new(TerraformEngineConfig::default());
//!
//! let job = ConvergenceJob::new(JobId::new("shoot--dev--alpha", Purpose::Infra))
//!     .with_variables(VariablesEnvironment::new())
//!     .initialize_with("alicloud-infra", ConvergenceConfig::new(serde_json::json!({})));
//! engine.apply(&job).await?;
//!
//! let outputs = engine
//!     .state_output_variables(job.id(), &["vpc_id"])
//!     .await
//!     .into_option()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Jobs**: one engine state per (name, purpose) pair
//! - **Sensitive variables**: credentials travel as a redacted variables environment
//! - **Tagged state lookup**: `Found` / `NotFound` / `Error`, never error-text sniffing
//! - **Terraform driver**: templates + `terraform.tfvars.json`, bounded command runtime

pub mod environment;
pub mod error;
pub mod job;
pub mod state;
pub mod terraform;
#[path = "trait.rs"]
pub mod engine_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use engine_trait::ConvergenceEngine;
pub use environment::VariablesEnvironment;
pub use error::ConvergenceError;
pub use job::{ConvergenceConfig, ConvergenceJob, JobId, Purpose, TemplateBinding};
pub use state::{StateLookup, StateOutputs};
pub use terraform::{TerraformEngine, TerraformEngineConfig};
#[cfg(feature = "test-util")]
pub use mock::{EngineCall, MockConvergenceEngine};
