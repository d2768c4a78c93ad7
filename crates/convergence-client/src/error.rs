//! Convergence engine errors

use thiserror::Error;

/// Errors that can occur while driving the convergence engine
#[derive(Debug, Error)]
pub enum ConvergenceError {
    /// Filesystem or process spawn error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An engine command exited unsuccessfully
    #[error("{command} failed with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    /// An engine command exceeded its time budget
    #[error("{command} timed out after {after_secs}s")]
    Timeout { command: String, after_secs: u64 },

    /// The named template does not exist
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    /// Apply was requested without binding a template and configuration
    #[error("Job {0} was not initialized with a template")]
    NotInitialized(String),

    /// A required variable could not be taken from its source
    #[error("Missing variable: {0}")]
    MissingVariable(String),

    /// The state file could not be interpreted
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Engine-specific failure reported verbatim
    #[error("Engine error: {0}")]
    Engine(String),
}
