// Bucket Client - thin bucket-scoped CRUD over S3-compatible object storage

pub mod config;
pub mod storage;
pub mod types;
pub mod utils;

// Re-exports for convenience
pub use config::StorageConfig;
pub use storage::{BucketClient, CredentialSource, MemoryBackend, S3Backend, StorageBackend};
pub use types::{ObjectListing, ObjectSummary, StorageError, StorageResult, UploadOutcome};
