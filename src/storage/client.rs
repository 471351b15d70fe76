//! Bucket-scoped CRUD client
//!
//! `BucketClient` forwards every call to a [`StorageBackend`], adding only a
//! few local checks: an active bucket must be selected, directory uploads
//! need an existing directory, and downloads must leave a file behind.
//!
//! Clients are immutable. Switching buckets (`with_bucket`, bucket creation
//! and deletion) hands back a new client that shares the same backend.

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::future::{self, Future};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

use super::backend::StorageBackend;
use super::s3_backend::S3Backend;
use crate::config::{StorageConfig, DEFAULT_UPLOAD_CONCURRENCY};
use crate::types::{FailedUpload, ObjectListing, StorageError, StorageResult, UploadOutcome};

pub struct BucketClient<B: StorageBackend> {
    backend: Arc<B>,
    bucket: Option<String>,
    upload_concurrency: usize,
}

impl<B: StorageBackend> Clone for BucketClient<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            bucket: self.bucket.clone(),
            upload_concurrency: self.upload_concurrency,
        }
    }
}

impl<B: StorageBackend> std::fmt::Debug for BucketClient<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketClient")
            .field("bucket", &self.bucket)
            .field("upload_concurrency", &self.upload_concurrency)
            .finish_non_exhaustive()
    }
}

impl BucketClient<S3Backend> {
    /// Build an S3 backend from config and target the configured bucket, if any
    pub async fn from_config(config: &StorageConfig) -> StorageResult<Self> {
        let backend = Arc::new(S3Backend::from_config(config)?);
        let client = match &config.bucket {
            Some(bucket) => Self::connect(backend, bucket.clone()).await?,
            None => Self::new(backend),
        };
        Ok(client.with_upload_concurrency(config.upload_concurrency))
    }
}

impl<B: StorageBackend> BucketClient<B> {
    /// A client with no active bucket
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            bucket: None,
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
        }
    }

    /// Target `bucket`. A missing bucket is only reported, so the client can
    /// still be used to create it.
    pub async fn connect(backend: Arc<B>, bucket: impl Into<String>) -> StorageResult<Self> {
        let client = Self::new(backend).with_bucket(bucket);
        if let Some(name) = client.bucket_name() {
            if !client.backend.bucket_exists(name).await? {
                info!(
                    "Bucket {} needs creation before additional methods can be called",
                    name
                );
            }
        }
        Ok(client)
    }

    pub fn with_bucket(&self, bucket: impl Into<String>) -> Self {
        Self {
            bucket: Some(bucket.into()),
            ..self.clone()
        }
    }

    pub fn without_bucket(&self) -> Self {
        Self {
            bucket: None,
            ..self.clone()
        }
    }

    pub fn with_upload_concurrency(mut self, concurrency: usize) -> Self {
        self.upload_concurrency = concurrency.max(1);
        self
    }

    pub fn bucket_name(&self) -> Option<&str> {
        self.bucket.as_deref()
    }

    /// The underlying backend, for calls outside this client's surface
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn shared_backend(&self) -> Arc<B> {
        Arc::clone(&self.backend)
    }

    fn active_bucket(&self) -> StorageResult<&str> {
        self.bucket_name().ok_or(StorageError::NoActiveBucket)
    }

    /// Resolve `name` if it already exists, otherwise create it. An existing
    /// bucket must show up exactly once in the bucket listing.
    pub async fn create_bucket_if_absent(&self, name: &str) -> StorageResult<Self> {
        if self.backend.bucket_exists(name).await? {
            info!("Bucket already exists. Returning bucket: {}", name);

            let matches: Vec<String> = self
                .backend
                .list_buckets()
                .await?
                .into_iter()
                .filter(|bucket| bucket == name)
                .collect();

            return match matches.as_slice() {
                [only] => Ok(self.with_bucket(only.clone())),
                _ => Err(StorageError::BucketLookup {
                    name: name.to_string(),
                    matches: matches.len(),
                }),
            };
        }

        let created = self.backend.create_bucket(name).await?;
        info!("Created bucket {}", created);
        Ok(self.with_bucket(created))
    }

    /// Delete `name` if it exists. Returns the client to keep using, which
    /// never has an active bucket, and whether a deletion happened.
    pub async fn delete_bucket_if_present(&self, name: &str) -> StorageResult<(Self, bool)> {
        if self.backend.bucket_exists(name).await? {
            self.backend.delete_bucket(name).await?;
            info!("Deleted bucket {}", name);
            return Ok((self.without_bucket(), true));
        }

        info!("Bucket {} does not exist", name);
        Ok((self.without_bucket(), false))
    }

    pub async fn upload_file(&self, key: &str, local_file: impl AsRef<Path>) -> StorageResult<()> {
        let bucket = self.active_bucket()?;
        self.put_file(bucket, key, local_file.as_ref()).await
    }

    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> StorageResult<()> {
        let data = fs::read(path).await?;
        debug!("Uploading {} ({} bytes) to {}/{}", path.display(), data.len(), bucket, key);
        self.backend.put_object(bucket, key, Bytes::from(data)).await
    }

    /// Upload a directory under a prefix named after the directory itself
    pub async fn upload_directory_named(&self, local_dir: impl AsRef<Path>) -> StorageResult<UploadOutcome> {
        let local_dir = local_dir.as_ref();
        let prefix = local_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.upload_directory(&prefix, local_dir).await
    }

    /// Recursively upload `local_dir` under `prefix`, waiting for every file
    pub async fn upload_directory(
        &self,
        prefix: &str,
        local_dir: impl AsRef<Path>,
    ) -> StorageResult<UploadOutcome> {
        self.upload_directory_until(prefix, local_dir, future::pending::<()>())
            .await
    }

    /// Like [`upload_directory`](Self::upload_directory), but stops waiting
    /// as soon as `cancel` resolves and reports `UploadOutcome::Cancelled`.
    pub async fn upload_directory_until<F>(
        &self,
        prefix: &str,
        local_dir: impl AsRef<Path>,
        cancel: F,
    ) -> StorageResult<UploadOutcome>
    where
        F: Future<Output = ()>,
    {
        let bucket = self.active_bucket()?;
        let local_dir = local_dir.as_ref();
        let is_dir = fs::metadata(local_dir)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(StorageError::NotADirectory(local_dir.to_path_buf()));
        }

        let files = collect_files(local_dir).await?;
        let total = files.len();
        info!(
            "Uploading {} file(s) from {} to {}/{}",
            total,
            local_dir.display(),
            bucket,
            prefix
        );

        let mut uploads = stream::iter(files.into_iter().map(|(path, relative)| {
            let key = join_key(prefix, &relative);
            async move {
                let result = self.put_file(bucket, &key, &path).await;
                (key, result)
            }
        }))
        .buffer_unordered(self.upload_concurrency);

        let mut uploaded = Vec::with_capacity(total);
        let mut failed = Vec::new();
        tokio::pin!(cancel);

        loop {
            tokio::select! {
                biased;

                _ = &mut cancel => {
                    let remaining = total - uploaded.len() - failed.len();
                    warn!(
                        "Directory upload to {}/{} cancelled with {} file(s) failed and {} unfinished",
                        bucket, prefix, failed.len(), remaining
                    );
                    uploaded.sort();
                    return Ok(UploadOutcome::Cancelled { uploaded, failed, remaining });
                }
                next = uploads.next() => match next {
                    Some((key, Ok(()))) => uploaded.push(key),
                    Some((key, Err(error))) => {
                        warn!("Failed to upload {}: {}", key, error);
                        failed.push(FailedUpload { key, error });
                    }
                    None => break,
                },
            }
        }

        uploaded.sort();
        if failed.is_empty() {
            Ok(UploadOutcome::Completed { uploaded })
        } else {
            Ok(UploadOutcome::PartiallyCompleted { uploaded, failed })
        }
    }

    /// Delete one object. Missing keys are left to the backend's semantics.
    pub async fn delete_object(&self, key: &str) -> StorageResult<()> {
        let bucket = self.active_bucket()?;
        self.backend.delete_object(bucket, key).await
    }

    /// First page of the active bucket's objects
    pub async fn list_objects(&self) -> StorageResult<ObjectListing> {
        let bucket = self.active_bucket()?;
        let listing = self.backend.list_objects(bucket, None).await?;
        if listing.is_truncated {
            debug!("Listing of {} truncated after {} objects", bucket, listing.len());
        }
        Ok(listing)
    }

    pub async fn object_exists(&self, key: &str) -> StorageResult<bool> {
        let bucket = self.active_bucket()?;
        self.backend.object_exists(bucket, key).await
    }

    /// Fetch `key` into `local_path`, creating parent directories. The remote
    /// object is left in place. Returns the absolute path written.
    pub async fn download_object_to_file(
        &self,
        key: &str,
        local_path: impl AsRef<Path>,
    ) -> StorageResult<PathBuf> {
        let bucket = self.active_bucket()?;
        let data = self.backend.get_object(bucket, key).await?;

        let target = absolute(local_path.as_ref())?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&target, &data).await?;

        if !fs::try_exists(&target).await? {
            return Err(StorageError::NotFound(target));
        }
        debug!("Downloaded {}/{} to {}", bucket, key, target.display());
        Ok(target)
    }
}

fn absolute(path: &Path) -> StorageResult<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn join_key(prefix: &str, relative: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        relative.to_string()
    } else {
        format!("{}/{}", prefix, relative)
    }
}

/// Every regular file below `root`, paired with its `/`-separated path
/// relative to `root`. Symlinked directories are not followed and dangling
/// symlinks are skipped.
async fn collect_files(root: &Path) -> StorageResult<Vec<(PathBuf, String)>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                pending.push(path);
                continue;
            }

            match fs::metadata(&path).await {
                Ok(meta) if meta.is_file() => {}
                Ok(_) => continue,
                Err(e) => {
                    warn!("Skipping unreadable entry {}: {}", path.display(), e);
                    continue;
                }
            }

            let relative = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.push((path, relative));
        }
    }

    files.sort();
    Ok(files)
}
