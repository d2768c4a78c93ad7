//! Cloud client errors

use thiserror::Error;

/// Errors that can occur when querying the provider network API
#[derive(Debug, Error)]
pub enum CloudError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider rejected the request
    #[error("API error {code}: {message}")]
    Api { code: String, message: String },

    /// The queried resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// JSON deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Response decoded but is missing expected data
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Client could not be constructed from the given settings
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
