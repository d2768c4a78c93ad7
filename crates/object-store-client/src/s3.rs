//! S3-compatible object store
//!
//! Alicloud OSS buckets are reached through their S3-compatible endpoint
//! `https://oss-<region>.aliyuncs.com`.

use crate::error::StorageError;
use crate::models::ObjectPage;
use crate::store_trait::ObjectStore;
use s3::Bucket;
use s3::Region;
use s3::creds::Credentials;
use std::fmt;
use tracing::debug;

/// Keys requested per listing page
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Connection settings for one bucket
#[derive(Clone)]
pub struct S3StoreConfig {
    pub bucket: String,
    pub region: String,
    pub endpoint: String,
    pub access_key_id: String,
    pub access_key_secret: String,
    pub page_size: usize,
}

impl fmt::Debug for S3StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3StoreConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl S3StoreConfig {
    /// Settings for a bucket behind an explicit endpoint
    ///
    /// Endpoints given without a scheme (as recorded in engine state) use HTTPS.
    pub fn new(
        bucket: impl Into<String>,
        region: impl Into<String>,
        endpoint: &str,
        access_key_id: impl Into<String>,
        access_key_secret: impl Into<String>,
    ) -> Self {
        let endpoint = endpoint.trim_end_matches('/');
        let endpoint = if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            format!("https://{endpoint}")
        };
        Self {
            bucket: bucket.into(),
            region: region.into(),
            endpoint,
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Settings for an OSS bucket in `region`
    pub fn for_alicloud(
        bucket: impl Into<String>,
        region: impl Into<String>,
        access_key_id: impl Into<String>,
        access_key_secret: impl Into<String>,
    ) -> Self {
        let region = region.into();
        Self {
            bucket: bucket.into(),
            endpoint: alicloud_storage_endpoint(&region),
            region,
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

/// S3-compatible endpoint of OSS in a region
pub fn alicloud_storage_endpoint(region: &str) -> String {
    format!("https://oss-{region}.aliyuncs.com")
}

/// Object store backed by the S3 protocol
pub struct S3ObjectStore {
    bucket: Box<Bucket>,
    page_size: usize,
}

impl fmt::Debug for S3ObjectStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3ObjectStore")
            .field("bucket", &self.bucket.name())
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl S3ObjectStore {
    /// Open a bucket handle; no request is made until the first call
    ///
    /// # Errors
    /// Returns an error if the credentials or bucket settings are rejected.
    pub fn new(config: S3StoreConfig) -> Result<Self, StorageError> {
        if config.bucket.is_empty() {
            return Err(StorageError::InvalidConfig("bucket name must not be empty".to_string()));
        }
        let credentials = Credentials::new(
            Some(config.access_key_id.as_str()),
            Some(config.access_key_secret.as_str()),
            None,
            None,
            None,
        )
        .map_err(|e| StorageError::InvalidConfig(format!("credentials: {e}")))?;
        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
        };
        let bucket = Bucket::new(&config.bucket, region, credentials)
            .map_err(|e| StorageError::InvalidConfig(format!("bucket {}: {e}", config.bucket)))?;

        Ok(Self {
            bucket,
            page_size: config.page_size.max(1),
        })
    }

    pub fn bucket_name(&self) -> String {
        self.bucket.name()
    }
}

#[async_trait::async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list_objects(&self, cursor: Option<&str>) -> Result<ObjectPage, StorageError> {
        debug!("Listing bucket {} (cursor: {:?})", self.bucket.name(), cursor);
        let (result, status) = self
            .bucket
            .list_page(
                String::new(),
                None,
                cursor.map(str::to_string),
                None,
                Some(self.page_size),
            )
            .await
            .map_err(|e| StorageError::List(e.to_string()))?;

        if status == 404 {
            return Err(StorageError::BucketNotFound(self.bucket.name()));
        }
        if !(200..300).contains(&status) {
            return Err(StorageError::List(format!("unexpected status {status}")));
        }

        Ok(ObjectPage {
            keys: result.contents.into_iter().map(|o| o.key).collect(),
            is_truncated: result.is_truncated,
            next_cursor: result.next_continuation_token,
        })
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<(), StorageError> {
        debug!("Deleting {} objects from bucket {}", keys.len(), self.bucket.name());
        for key in keys {
            let response = self.bucket.delete_object(key).await.map_err(|e| StorageError::Delete {
                key: key.clone(),
                message: e.to_string(),
            })?;
            let status = response.status_code();
            // 404 means the key is already gone.
            if !(200..300).contains(&status) && status != 404 {
                return Err(StorageError::Delete {
                    key: key.clone(),
                    message: format!("unexpected status {status}"),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alicloud_endpoint() {
        assert_eq!(
            alicloud_storage_endpoint("eu-central-1"),
            "https://oss-eu-central-1.aliyuncs.com"
        );
    }

    #[test]
    fn test_endpoint_without_scheme_uses_https() {
        let config = S3StoreConfig::new("b", "cn-beijing", "oss-cn-beijing.aliyuncs.com/", "id", "secret");
        assert_eq!(config.endpoint, "https://oss-cn-beijing.aliyuncs.com");
        let config = S3StoreConfig::new("b", "cn-beijing", "http://127.0.0.1:9000", "id", "secret");
        assert_eq!(config.endpoint, "http://127.0.0.1:9000");
    }

    #[test]
    fn test_config_debug_hides_secret() {
        let config = S3StoreConfig::for_alicloud("bucket-a", "cn-beijing", "AKID", "super-secret");
        let rendered = format!("{config:?}");
        assert!(rendered.contains("bucket-a"));
        assert!(!rendered.contains("super-secret"));
    }

    #[test]
    fn test_page_size_is_at_least_one() {
        let config = S3StoreConfig::for_alicloud("b", "r", "id", "secret").with_page_size(0);
        assert_eq!(config.page_size, 1);
    }

    #[test]
    fn test_new_rejects_empty_bucket() {
        let config = S3StoreConfig::for_alicloud("", "cn-beijing", "id", "secret");
        assert!(matches!(S3ObjectStore::new(config), Err(StorageError::InvalidConfig(_))));
    }
}
