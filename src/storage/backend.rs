// Backend handle seam: everything the bucket client delegates to

use async_trait::async_trait;
use bytes::Bytes;

use crate::types::{ObjectListing, StorageResult};

/// Operations an object-storage service exposes to `BucketClient`.
///
/// Implementations pass backend faults through as `StorageError` without
/// retrying or translating them.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool>;

    /// Names of every bucket visible to the credentials
    async fn list_buckets(&self) -> StorageResult<Vec<String>>;

    async fn create_bucket(&self, bucket: &str) -> StorageResult<String>;

    async fn delete_bucket(&self, bucket: &str) -> StorageResult<()>;

    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> StorageResult<()>;

    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Bytes>;

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()>;

    async fn object_exists(&self, bucket: &str, key: &str) -> StorageResult<bool>;

    /// First page of objects, optionally restricted to a key prefix
    async fn list_objects(&self, bucket: &str, prefix: Option<&str>) -> StorageResult<ObjectListing>;
}
