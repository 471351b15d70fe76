// Type definitions shared by the storage layer

use std::path::PathBuf;

use s3::creds::error::CredentialsError;
use s3::error::S3Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("No active bucket selected")]
    NoActiveBucket,

    #[error("Local directory does not exist: {0}. Only valid directories may be uploaded")]
    NotADirectory(PathBuf),

    #[error("Expected {0} to exist")]
    NotFound(PathBuf),

    #[error("Expected exactly one bucket named '{name}', found {matches}")]
    BucketLookup { name: String, matches: usize },

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Credentials error: {0}")]
    Credentials(#[from] CredentialsError),

    #[error("S3 error: {0}")]
    S3(#[from] S3Error),

    #[error("Backend error ({status}): {message}")]
    Backend { status: u16, message: String },
}

impl StorageError {
    pub fn backend(status: u16, message: impl Into<String>) -> Self {
        StorageError::Backend {
            status,
            message: message.into(),
        }
    }
}

/// One entry of a bucket listing
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e_tag: Option<String>,
}

/// A single page of objects from one bucket.
///
/// Only the first page is ever fetched; `is_truncated` tells the caller
/// that more objects exist beyond it.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ObjectListing {
    pub bucket: String,
    pub objects: Vec<ObjectSummary>,
    pub is_truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_continuation_token: Option<String>,
}

impl ObjectListing {
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.objects.iter().map(|o| o.key.as_str())
    }
}

#[derive(Debug)]
pub struct FailedUpload {
    pub key: String,
    pub error: StorageError,
}

/// How a directory upload ended
#[derive(Debug)]
pub enum UploadOutcome {
    Completed {
        uploaded: Vec<String>,
    },
    PartiallyCompleted {
        uploaded: Vec<String>,
        failed: Vec<FailedUpload>,
    },
    /// The cancel signal fired before every file finished. `remaining`
    /// counts the files that neither uploaded nor failed, including ones
    /// that were in flight and abandoned.
    Cancelled {
        uploaded: Vec<String>,
        failed: Vec<FailedUpload>,
        remaining: usize,
    },
}

impl UploadOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, UploadOutcome::Completed { .. })
    }

    pub fn uploaded(&self) -> &[String] {
        match self {
            UploadOutcome::Completed { uploaded }
            | UploadOutcome::PartiallyCompleted { uploaded, .. }
            | UploadOutcome::Cancelled { uploaded, .. } => uploaded,
        }
    }
}

impl std::fmt::Display for UploadOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadOutcome::Completed { uploaded } => {
                write!(f, "completed: {} file(s) uploaded", uploaded.len())
            }
            UploadOutcome::PartiallyCompleted { uploaded, failed } => write!(
                f,
                "partially completed: {} uploaded, {} failed",
                uploaded.len(),
                failed.len()
            ),
            UploadOutcome::Cancelled {
                uploaded,
                failed,
                remaining,
            } => write!(
                f,
                "cancelled: {} uploaded, {} failed, {} not finished",
                uploaded.len(),
                failed.len(),
                remaining
            ),
        }
    }
}
