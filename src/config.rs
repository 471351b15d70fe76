use serde::Deserialize;
use std::env;

use crate::storage::CredentialSource;
use crate::types::{StorageError, StorageResult};

pub const DEFAULT_REGION: &str = "us-west-2";
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 8;

#[derive(Clone, Deserialize)]
pub struct StorageConfig {
    pub bucket: Option<String>,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Access and secret keys are stored base64-encoded
    pub credentials_encoded: bool,
    pub endpoint: Option<String>,
    pub path_style: bool,
    pub upload_concurrency: usize,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted = |key: &Option<String>| key.as_ref().map(|_| "<redacted>");
        f.debug_struct("StorageConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("access_key_id", &redacted(&self.access_key_id))
            .field("secret_access_key", &redacted(&self.secret_access_key))
            .field("credentials_encoded", &self.credentials_encoded)
            .field("endpoint", &self.endpoint)
            .field("path_style", &self.path_style)
            .field("upload_concurrency", &self.upload_concurrency)
            .finish()
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            region: DEFAULT_REGION.to_string(),
            access_key_id: None,
            secret_access_key: None,
            credentials_encoded: false,
            endpoint: None,
            path_style: false,
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
        }
    }
}

impl StorageConfig {
    pub fn from_env() -> StorageResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> StorageResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            bucket: non_empty("S3_BUCKET"),
            region: non_empty("S3_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            access_key_id: non_empty("AWS_ACCESS_KEY_ID"),
            secret_access_key: non_empty("AWS_SECRET_ACCESS_KEY"),
            credentials_encoded: parse_var(&non_empty, "S3_CREDENTIALS_ENCODED", false)?,
            endpoint: non_empty("S3_ENDPOINT"),
            path_style: parse_var(&non_empty, "S3_PATH_STYLE", false)?,
            upload_concurrency: parse_var(
                &non_empty,
                "S3_UPLOAD_CONCURRENCY",
                DEFAULT_UPLOAD_CONCURRENCY,
            )?,
        })
    }

    /// Explicit keys win; otherwise fall back to the ambient provider chain
    pub fn credential_source(&self) -> CredentialSource {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(access_key), Some(secret_key)) if self.credentials_encoded => {
                CredentialSource::Encoded {
                    access_key: access_key.clone(),
                    secret_key: secret_key.clone(),
                }
            }
            (Some(access_key), Some(secret_key)) => CredentialSource::Static {
                access_key: access_key.clone(),
                secret_key: secret_key.clone(),
            },
            _ => CredentialSource::Ambient,
        }
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> StorageResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| StorageError::Config(format!("{}={:?}: {}", key, raw, e))),
        None => Ok(default),
    }
}
