//! In-process storage backend
//!
//! Keeps buckets and objects in memory with the same observable behaviour
//! as S3 for the calls `BucketClient` makes: missing buckets are errors,
//! deleting a missing key is a no-op, non-empty buckets cannot be deleted
//! and listings are paged.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::backend::StorageBackend;
use crate::types::{ObjectListing, ObjectSummary, StorageError, StorageResult};

const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    last_modified: String,
}

#[derive(Debug, Default)]
struct State {
    buckets: BTreeMap<String, BTreeMap<String, StoredObject>>,
    /// Extra names reported by `list_buckets` without backing storage
    listing_extras: Vec<String>,
}

#[derive(Debug)]
pub struct MemoryBackend {
    state: RwLock<State>,
    page_size: usize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Make `list_buckets` report `name` one extra time, as an inconsistent
    /// backend might
    pub async fn add_listing_entry(&self, name: impl Into<String>) {
        self.state.write().await.listing_extras.push(name.into());
    }

    pub async fn object_count(&self, bucket: &str) -> usize {
        self.state
            .read()
            .await
            .buckets
            .get(bucket)
            .map_or(0, BTreeMap::len)
    }
}

fn no_such_bucket(bucket: &str) -> StorageError {
    StorageError::backend(404, format!("NoSuchBucket: {}", bucket))
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool> {
        Ok(self.state.read().await.buckets.contains_key(bucket))
    }

    async fn list_buckets(&self) -> StorageResult<Vec<String>> {
        let state = self.state.read().await;
        Ok(state
            .buckets
            .keys()
            .chain(state.listing_extras.iter())
            .cloned()
            .collect())
    }

    async fn create_bucket(&self, bucket: &str) -> StorageResult<String> {
        let mut state = self.state.write().await;
        if state.buckets.contains_key(bucket) {
            return Err(StorageError::backend(
                409,
                format!("BucketAlreadyOwnedByYou: {}", bucket),
            ));
        }
        state.buckets.insert(bucket.to_string(), BTreeMap::new());
        Ok(bucket.to_string())
    }

    async fn delete_bucket(&self, bucket: &str) -> StorageResult<()> {
        let mut state = self.state.write().await;
        match state.buckets.get(bucket) {
            None => Err(no_such_bucket(bucket)),
            Some(objects) if !objects.is_empty() => Err(StorageError::backend(
                409,
                format!("BucketNotEmpty: {}", bucket),
            )),
            Some(_) => {
                state.buckets.remove(bucket);
                Ok(())
            }
        }
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> StorageResult<()> {
        let mut state = self.state.write().await;
        let objects = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket(bucket))?;
        objects.insert(
            key.to_string(),
            StoredObject {
                data,
                last_modified: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            },
        );
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Bytes> {
        let state = self.state.read().await;
        let objects = state.buckets.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        objects
            .get(key)
            .map(|object| object.data.clone())
            .ok_or_else(|| StorageError::backend(404, format!("NoSuchKey: {}", key)))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let mut state = self.state.write().await;
        let objects = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket(bucket))?;
        objects.remove(key);
        Ok(())
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        let state = self.state.read().await;
        let objects = state.buckets.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        Ok(objects.contains_key(key))
    }

    async fn list_objects(&self, bucket: &str, prefix: Option<&str>) -> StorageResult<ObjectListing> {
        let state = self.state.read().await;
        let objects = state.buckets.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        let prefix = prefix.unwrap_or_default();

        let mut matching = objects.iter().filter(|(key, _)| key.starts_with(prefix));
        let page: Vec<ObjectSummary> = matching
            .by_ref()
            .take(self.page_size)
            .map(|(key, object)| ObjectSummary {
                key: key.clone(),
                size: object.data.len() as u64,
                last_modified: object.last_modified.clone(),
                e_tag: None,
            })
            .collect();
        let is_truncated = matching.next().is_some();

        Ok(ObjectListing {
            bucket: bucket.to_string(),
            next_continuation_token: if is_truncated {
                page.last().map(|o| o.key.clone())
            } else {
                None
            },
            objects: page,
            is_truncated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_object_lifecycle() {
        let backend = MemoryBackend::new();
        assert_ok!(backend.create_bucket("b").await);
        assert_ok!(backend.put_object("b", "k", Bytes::from_static(b"hello")).await);

        assert!(backend.object_exists("b", "k").await.unwrap());
        assert_eq!(&backend.get_object("b", "k").await.unwrap()[..], b"hello");

        assert_ok!(backend.delete_object("b", "k").await);
        assert!(!backend.object_exists("b", "k").await.unwrap());
        // deleting again is a no-op, as on S3
        assert_ok!(backend.delete_object("b", "k").await);
    }

    #[tokio::test]
    async fn test_missing_bucket_fails() {
        let backend = MemoryBackend::new();
        let err = backend.put_object("nope", "k", Bytes::new()).await.unwrap_err();
        assert!(matches!(err, StorageError::Backend { status: 404, .. }));
        assert_err!(backend.list_objects("nope", None).await);
        assert_err!(backend.delete_bucket("nope").await);
    }

    #[tokio::test]
    async fn test_duplicate_create_and_non_empty_delete_fail() {
        let backend = MemoryBackend::new();
        assert_ok!(backend.create_bucket("b").await);
        assert_err!(backend.create_bucket("b").await);

        assert_ok!(backend.put_object("b", "k", Bytes::new()).await);
        let err = backend.delete_bucket("b").await.unwrap_err();
        assert!(matches!(err, StorageError::Backend { status: 409, .. }));
    }

    #[tokio::test]
    async fn test_listing_is_paged_and_prefixed() {
        let backend = MemoryBackend::new().with_page_size(2);
        backend.create_bucket("b").await.unwrap();
        for key in ["docs/a", "docs/b", "docs/c", "other/d"] {
            backend.put_object("b", key, Bytes::from_static(b"x")).await.unwrap();
        }

        let first = backend.list_objects("b", Some("docs/")).await.unwrap();
        assert_eq!(first.keys().collect::<Vec<_>>(), ["docs/a", "docs/b"]);
        assert!(first.is_truncated);
        assert_eq!(first.next_continuation_token.as_deref(), Some("docs/b"));

        let other = backend.list_objects("b", Some("other/")).await.unwrap();
        assert_eq!(other.len(), 1);
        assert!(!other.is_truncated);
    }

    #[tokio::test]
    async fn test_listing_entries_show_up_in_bucket_list() {
        let backend = MemoryBackend::new();
        backend.create_bucket("b").await.unwrap();
        backend.add_listing_entry("b").await;

        let names = backend.list_buckets().await.unwrap();
        assert_eq!(names, ["b", "b"]);
    }
}
