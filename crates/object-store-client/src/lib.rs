//! Object store client
//!
//! Lists a bucket one page at a time and deletes keys in batches. Used to
//! empty backup buckets before their infrastructure is destroyed.
//!
//! # Example
//!
//! ```no_run
//! use object_store_client::{ObjectStore, S3ObjectStore, S3StoreConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = S3ObjectStore::new(S3StoreConfig::for_alicloud(
//!     "etcd-backup-alpha",
//!     "cn-hangzhou",
//!     "access-key-id",
//!     "access-key-secret",
//! ))?;
//!
//! let page = store.list_objects(None).await?;
//! store.delete_objects(&page.keys).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod models;
pub mod s3;
#[path = "trait.rs"]
pub mod store_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use error::StorageError;
pub use models::ObjectPage;
pub use s3::{S3ObjectStore, S3StoreConfig};
pub use store_trait::ObjectStore;
#[cfg(feature = "test-util")]
pub use mock::MockObjectStore;
