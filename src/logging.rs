use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{Builder, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LogSettings;

/// Rotated log files kept next to `LOG_FILE`.
const KEPT_LOG_FILES: usize = 7;

/// Installs the global subscriber: compact lines on stderr, plus a daily
/// rotated plain-text file when `settings.file` is set.
///
/// `RUST_LOG` takes precedence over the configured level. The returned guard
/// flushes the file writer and must be held until the process exits.
pub fn init(settings: &LogSettings) -> Result<Option<WorkerGuard>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr);

    let (file_layer, guard) = match &settings.file {
        Some(path) => {
            let prefix = path
                .file_name()
                .and_then(|name| name.to_str())
                .with_context(|| format!("LOG_FILE '{}' has no file name", path.display()))?;
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => std::path::Path::new("."),
            };
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create log directory '{}'", dir.display()))?;

            let appender = Builder::new()
                .rotation(Rotation::DAILY)
                .filename_prefix(prefix)
                .max_log_files(KEPT_LOG_FILES)
                .build(dir)
                .context("Cannot open log file")?;
            let (writer, guard) = tracing_appender::non_blocking(appender);

            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Logging was already initialised")?;

    Ok(guard)
}
