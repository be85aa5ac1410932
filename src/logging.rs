//! Tracing subscriber setup.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::config::LoggingSection;
use crate::error::{Error, Result};

const LOG_FILE_PREFIX: &str = "localsync.log";

/// Build the filter: `RUST_LOG` when set, else the configured level.
pub fn filter(level: &str) -> EnvFilter {
  EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber.
///
/// With `logging.file` set, events go to a daily-rolling file under
/// `<data_dir>/logs`; the returned guard must be held until exit so
/// buffered lines are flushed. Otherwise events go to stderr.
pub fn init(logging: &LoggingSection, data_dir: &Path) -> Result<Option<WorkerGuard>> {
  let filter = filter(&logging.level);

  if logging.file {
    let dir = data_dir.join("logs");
    std::fs::create_dir_all(&dir)
      .map_err(|e| Error::Config(format!("Failed to create log dir {}: {}", dir.display(), e)))?;
    let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    Registry::default()
      .with(filter)
      .with(fmt::layer().with_writer(writer).with_ansi(false))
      .try_init()
      .map_err(|e| Error::Config(format!("Failed to install logger: {}", e)))?;
    return Ok(Some(guard));
  }

  Registry::default()
    .with(filter)
    .with(fmt::layer().with_writer(std::io::stderr))
    .try_init()
    .map_err(|e| Error::Config(format!("Failed to install logger: {}", e)))?;
  Ok(None)
}
