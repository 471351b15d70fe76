// Storage layer: a bucket-scoped client over pluggable object-storage backends

pub mod backend;
pub mod client;
pub mod credentials;
pub mod memory;
pub mod s3_backend;

pub use backend::StorageBackend;
pub use client::BucketClient;
pub use credentials::CredentialSource;
pub use memory::MemoryBackend;
pub use s3_backend::S3Backend;
