//! Object store trait

use crate::error::StorageError;
use crate::models::ObjectPage;
use async_trait::async_trait;

/// Paged listing and batch deletion over a single bucket
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List one page of keys, starting after `cursor` or at the beginning
    async fn list_objects(&self, cursor: Option<&str>) -> Result<ObjectPage, StorageError>;

    /// Delete a batch of keys; the batch fails as a unit
    async fn delete_objects(&self, keys: &[String]) -> Result<(), StorageError>;
}
