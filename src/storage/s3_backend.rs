// S3-compatible backend built on rust-s3

use async_trait::async_trait;
use bytes::Bytes;
use s3::bucket_ops::BucketConfiguration;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::region::Region;
use s3::Bucket;
use tracing::debug;

use super::backend::StorageBackend;
use super::credentials::CredentialSource;
use crate::config::StorageConfig;
use crate::types::{ObjectListing, ObjectSummary, StorageError, StorageResult};

#[derive(Debug, Clone)]
pub struct S3Backend {
    region: Region,
    credentials: Credentials,
    path_style: bool,
}

impl S3Backend {
    pub fn new(region: Region, credentials: Credentials) -> Self {
        Self {
            region,
            credentials,
            path_style: false,
        }
    }

    /// Use path-style addressing (`endpoint/bucket/key`), as MinIO and most
    /// self-hosted S3 services expect
    pub fn with_path_style(mut self) -> Self {
        self.path_style = true;
        self
    }

    pub fn from_config(config: &StorageConfig) -> StorageResult<Self> {
        let region = match &config.endpoint {
            Some(endpoint) => Region::Custom {
                region: config.region.clone(),
                endpoint: endpoint.clone(),
            },
            None => config
                .region
                .parse::<Region>()
                .map_err(|e| StorageError::Config(format!("invalid region {:?}: {}", config.region, e)))?,
        };
        let credentials = config.credential_source().resolve()?;

        let backend = Self::new(region, credentials);
        Ok(if config.path_style {
            backend.with_path_style()
        } else {
            backend
        })
    }

    /// Convenience constructor for explicit credentials and region
    pub fn connect(source: &CredentialSource, region: Region) -> StorageResult<Self> {
        Ok(Self::new(region, source.resolve()?))
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Raw rust-s3 handle for operations outside this crate's surface
    pub fn handle(&self, bucket: &str) -> StorageResult<Bucket> {
        let handle = Bucket::new(bucket, self.region.clone(), self.credentials.clone())?;
        Ok(if self.path_style {
            handle.with_path_style()
        } else {
            handle
        })
    }
}

fn is_not_found(error: &S3Error) -> bool {
    matches!(error, S3Error::HttpFailWithBody(404, _))
}

#[async_trait]
impl StorageBackend for S3Backend {
    async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool> {
        Ok(self.handle(bucket)?.exists().await?)
    }

    async fn list_buckets(&self) -> StorageResult<Vec<String>> {
        let response = Bucket::list_buckets(self.region.clone(), self.credentials.clone()).await?;
        Ok(response.bucket_names().collect())
    }

    async fn create_bucket(&self, bucket: &str) -> StorageResult<String> {
        let config = BucketConfiguration::default();
        let response = if self.path_style {
            Bucket::create_with_path_style(bucket, self.region.clone(), self.credentials.clone(), config)
                .await?
        } else {
            Bucket::create(bucket, self.region.clone(), self.credentials.clone(), config).await?
        };

        if !response.success() {
            return Err(StorageError::backend(response.response_code, response.response_text));
        }
        debug!("Created bucket {}", response.bucket.name);
        Ok(response.bucket.name.clone())
    }

    async fn delete_bucket(&self, bucket: &str) -> StorageResult<()> {
        let status = self.handle(bucket)?.delete().await?;
        if !(200..300).contains(&status) {
            return Err(StorageError::backend(status, format!("failed to delete bucket {}", bucket)));
        }
        Ok(())
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> StorageResult<()> {
        let response = self.handle(bucket)?.put_object(key, &data).await?;
        debug!("PUT {}/{} -> {}", bucket, key, response.status_code());
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Bytes> {
        let response = self.handle(bucket)?.get_object(key).await?;
        Ok(response.bytes().clone())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.handle(bucket)?.delete_object(key).await?;
        Ok(())
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        match self.handle(bucket)?.head_object(key).await {
            Ok((_, status)) => Ok((200..300).contains(&status)),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_objects(&self, bucket: &str, prefix: Option<&str>) -> StorageResult<ObjectListing> {
        let (page, _) = self
            .handle(bucket)?
            .list_page(prefix.unwrap_or_default().to_string(), None, None, None, None)
            .await?;

        Ok(ObjectListing {
            bucket: page.name,
            objects: page
                .contents
                .into_iter()
                .map(|object| ObjectSummary {
                    key: object.key,
                    size: object.size,
                    last_modified: object.last_modified,
                    e_tag: object.e_tag,
                })
                .collect(),
            is_truncated: page.is_truncated,
            next_continuation_token: page.next_continuation_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn backend_for(server: &mockito::ServerGuard) -> S3Backend {
        let region = Region::Custom {
            region: "us-east-1".to_string(),
            endpoint: server.url(),
        };
        let source = CredentialSource::Static {
            access_key: "AKIAEXAMPLE".to_string(),
            secret_key: "secret-key".to_string(),
        };
        S3Backend::connect(&source, region).unwrap().with_path_style()
    }

    #[tokio::test]
    async fn test_missing_object_is_not_an_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("HEAD", "/test-bucket/missing.txt")
            .with_status(404)
            .create_async()
            .await;

        let backend = backend_for(&server).await;
        let exists = backend.object_exists("test-bucket", "missing.txt").await.unwrap();

        assert!(!exists);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_object_returns_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/test-bucket/Documents/testfile.txt")
            .with_status(200)
            .with_body("This is a test file.")
            .create_async()
            .await;

        let backend = backend_for(&server).await;
        let body = backend
            .get_object("test-bucket", "Documents/testfile.txt")
            .await
            .unwrap();

        assert_eq!(&body[..], b"This is a test file.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_put_object_hits_path_style_url() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/test-bucket/Documents/testfile.txt")
            .with_status(200)
            .create_async()
            .await;

        let backend = backend_for(&server).await;
        backend
            .put_object(
                "test-bucket",
                "Documents/testfile.txt",
                Bytes::from_static(b"This is a test file."),
            )
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_backend_errors_pass_through() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/test-bucket/secret.txt")
            .with_status(403)
            .with_body("AccessDenied")
            .create_async()
            .await;

        let backend = backend_for(&server).await;
        let err = backend.get_object("test-bucket", "secret.txt").await.unwrap_err();

        assert!(matches!(err, StorageError::S3(S3Error::HttpFailWithBody(403, _))));
    }

    const LIST_BUCKETS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListAllMyBucketsResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Owner><ID>owner-id</ID><DisplayName>owner</DisplayName></Owner>
  <Buckets>
    <Bucket><Name>test-bucket</Name><CreationDate>2024-01-01T00:00:00.000Z</CreationDate></Bucket>
  </Buckets>
</ListAllMyBucketsResult>"#;

    const LIST_OBJECTS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>test-bucket</Name>
  <Prefix></Prefix>
  <KeyCount>2</KeyCount>
  <MaxKeys>2</MaxKeys>
  <IsTruncated>true</IsTruncated>
  <NextContinuationToken>token-2</NextContinuationToken>
  <Contents>
    <Key>Documents/a.txt</Key>
    <LastModified>2024-01-01T00:00:00.000Z</LastModified>
    <ETag>"etag-a"</ETag>
    <Size>5</Size>
    <StorageClass>STANDARD</StorageClass>
  </Contents>
  <Contents>
    <Key>Documents/b.txt</Key>
    <LastModified>2024-01-02T00:00:00.000Z</LastModified>
    <ETag>"etag-b"</ETag>
    <Size>7</Size>
    <StorageClass>STANDARD</StorageClass>
  </Contents>
</ListBucketResult>"#;

    #[tokio::test]
    async fn test_bucket_exists_reads_bucket_listing() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/xml")
            .with_body(LIST_BUCKETS_XML)
            .expect_at_least(1)
            .create_async()
            .await;

        let backend = backend_for(&server).await;

        assert!(backend.bucket_exists("test-bucket").await.unwrap());
        assert!(!backend.bucket_exists("other").await.unwrap());
        assert_eq!(backend.list_buckets().await.unwrap(), ["test-bucket"]);
    }

    #[tokio::test]
    async fn test_list_objects_maps_first_page() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Regex(r"^/test-bucket/?$".to_string()))
            .with_status(200)
            .with_header("content-type", "application/xml")
            .with_body(LIST_OBJECTS_XML)
            .create_async()
            .await;

        let backend = backend_for(&server).await;
        let listing = backend.list_objects("test-bucket", None).await.unwrap();

        assert_eq!(listing.bucket, "test-bucket");
        assert_eq!(listing.keys().collect::<Vec<_>>(), ["Documents/a.txt", "Documents/b.txt"]);
        assert_eq!(listing.objects[1].size, 7);
        assert_eq!(listing.objects[0].last_modified, "2024-01-01T00:00:00.000Z");
        assert!(listing.is_truncated);
        assert_eq!(listing.next_continuation_token.as_deref(), Some("token-2"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_bucket_conflict_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", mockito::Matcher::Any)
            .with_status(409)
            .with_body("<Error><Code>BucketAlreadyExists</Code></Error>")
            .create_async()
            .await;

        let backend = backend_for(&server).await;
        let err = backend.create_bucket("test-bucket").await.unwrap_err();

        assert!(matches!(
            err,
            StorageError::S3(S3Error::HttpFailWithBody(409, _)) | StorageError::Backend { status: 409, .. }
        ));
    }

    #[test]
    fn test_from_config_with_endpoint() {
        let config = StorageConfig {
            endpoint: Some("http://localhost:9000".to_string()),
            access_key_id: Some("minio".to_string()),
            secret_access_key: Some("minio123".to_string()),
            path_style: true,
            ..StorageConfig::default()
        };
        let backend = S3Backend::from_config(&config).unwrap();

        assert!(matches!(backend.region(), Region::Custom { endpoint, .. } if endpoint == "http://localhost:9000"));
        assert_eq!(backend.credentials().access_key.as_deref(), Some("minio"));
        assert_eq!(backend.handle("test-bucket").unwrap().name, "test-bucket");
    }
}
