//! Shared tracing setup: `RUST_LOG` filter, daily-rolling file under the app's data dir.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::LoadError;

/// Keeps the background log writer alive; drop it on shutdown to flush.
pub type LogGuard = WorkerGuard;

const DEFAULT_FILTER: &str = "info";

/// Log directory: `<APP>_LOG_DIR` if set, else `<data_local_dir>/<app>/logs`.
pub fn log_dir(app_name: &str) -> Option<PathBuf> {
    let key = format!("{}_LOG_DIR", app_name.to_uppercase().replace('-', "_"));
    if let Some(dir) = std::env::var_os(&key).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(dir));
    }
    dirs::data_local_dir().map(|d| d.join(app_name).join("logs"))
}

/// Installs the global subscriber writing to `<log_dir>/<app>.log.<date>`.
///
/// Fails if no log directory can be resolved or a subscriber is already installed.
pub fn init_tracing(app_name: &str) -> Result<LogGuard, LoadError> {
    let dir = log_dir(app_name)
        .ok_or_else(|| LoadError::Logging("no data directory for this platform".into()))?;
    std::fs::create_dir_all(&dir).map_err(|e| LoadError::Logging(e.to_string()))?;

    let appender = tracing_appender::rolling::daily(&dir, format!("{}.log", app_name));
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(filter),
        )
        .try_init()
        .map_err(|e| LoadError::Logging(e.to_string()))?;
    Ok(guard)
}
