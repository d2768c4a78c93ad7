//! Object store errors

use thiserror::Error;

/// Errors that can occur when talking to the object store
#[derive(Debug, Error)]
pub enum StorageError {
    /// Listing a page failed
    #[error("List error: {0}")]
    List(String),

    /// Deleting a batch failed
    #[error("Delete error on key '{key}': {message}")]
    Delete { key: String, message: String },

    /// The bucket does not exist
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    /// Store could not be configured
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
