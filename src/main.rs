use anyhow::{bail, Context};
use bucket_client::{utils::init_logger, BucketClient, StorageConfig, UploadOutcome};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "bucketctl", version, about = "Bucket-scoped CRUD against S3-compatible storage")]
struct Cli {
    /// Bucket to operate on (overrides S3_BUCKET)
    #[arg(long, global = true)]
    bucket: Option<String>,

    /// Region (overrides S3_REGION)
    #[arg(long, global = true)]
    region: Option<String>,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a bucket unless it already exists
    CreateBucket { name: String },
    /// Delete a bucket if it exists
    DeleteBucket { name: String },
    /// Upload one local file to KEY
    Upload { key: String, file: PathBuf },
    /// Recursively upload a directory (Ctrl-C cancels)
    UploadDir {
        dir: PathBuf,
        /// Key prefix; defaults to the directory's name
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Print the first page of objects as JSON
    List,
    /// Check whether KEY exists
    Exists { key: String },
    /// Download KEY to a local file
    Download { key: String, target: PathBuf },
    /// Delete KEY
    Delete { key: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_logger(cli.log_dir.as_deref());

    let mut config = StorageConfig::from_env()?;
    if let Some(bucket) = cli.bucket {
        config.bucket = Some(bucket);
    }
    if let Some(region) = cli.region {
        config.region = region;
    }
    info!(
        "Using region {} with {:?} credentials",
        config.region,
        config.credential_source()
    );

    let client = BucketClient::from_config(&config)
        .await
        .context("Failed to set up storage client")?;

    match cli.command {
        Command::CreateBucket { name } => {
            let client = client.create_bucket_if_absent(&name).await?;
            println!("{}", client.bucket_name().unwrap_or_default());
        }
        Command::DeleteBucket { name } => {
            let (_, deleted) = client.delete_bucket_if_present(&name).await?;
            println!("{}", deleted);
        }
        Command::Upload { key, file } => {
            client.upload_file(&key, &file).await?;
            info!("Uploaded {} to {}", file.display(), key);
        }
        Command::UploadDir { dir, prefix } => {
            let cancel = async {
                if tokio::signal::ctrl_c().await.is_err() {
                    std::future::pending::<()>().await;
                }
            };
            let prefix = prefix.unwrap_or_else(|| {
                dir.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });
            let outcome = client.upload_directory_until(&prefix, &dir, cancel).await?;

            println!("{}", outcome);
            match outcome {
                UploadOutcome::Completed { .. } => {}
                UploadOutcome::PartiallyCompleted { failed, .. } => {
                    for failure in &failed {
                        warn!("{}: {}", failure.key, failure.error);
                    }
                    bail!("{} file(s) failed to upload", failed.len());
                }
                UploadOutcome::Cancelled {
                    failed, remaining, ..
                } => {
                    for failure in &failed {
                        warn!("{}: {}", failure.key, failure.error);
                    }
                    bail!(
                        "upload cancelled with {} file(s) failed and {} unfinished",
                        failed.len(),
                        remaining
                    );
                }
            }
        }
        Command::List => {
            let listing = client.list_objects().await?;
            if listing.is_truncated {
                warn!("Only the first {} objects are shown", listing.len());
            }
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        Command::Exists { key } => {
            println!("{}", client.object_exists(&key).await?);
        }
        Command::Download { key, target } => {
            let written = client.download_object_to_file(&key, &target).await?;
            println!("{}", written.display());
        }
        Command::Delete { key } => {
            client.delete_object(&key).await?;
            info!("Deleted {}", key);
        }
    }

    Ok(())
}
