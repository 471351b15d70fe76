// Logger initialization

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_FILTER: &str = "bucket_client=info,bucketctl=info";
const LOG_FILE_PREFIX: &str = "bucket-client.log";

/// Install the global tracing subscriber.
///
/// Logs go to stderr, filtered by `RUST_LOG` (falling back to
/// [`DEFAULT_FILTER`]). With `log_dir` set, they are also written to a daily
/// rolling file there; keep the returned guard alive until exit so the
/// file writer flushes.
pub fn init_logger(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}
