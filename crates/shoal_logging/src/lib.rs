//! Shared logging and filesystem-layout helpers for Shoal binaries.

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "shoal=info,shoal_previewd=info,shoal_preview=info";

/// Environment variable holding the tracing filter, e.g. `shoal_previewd=debug`.
pub const LOG_FILTER_ENV: &str = "SHOAL_LOG";

/// Logging configuration shared by Shoal binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
}

/// Initialize tracing with a per-app log file and stderr output.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let log_dir = ensure_logs_dir().context("Failed to ensure log directory")?;
    let log_path = log_dir.join(format!("{}.log", config.app_name));
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file: {}", log_path.display()))?;

    let file_filter = env_filter();
    let console_filter = if config.verbose {
        env_filter()
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(log_file))
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .init();

    Ok(())
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Shoal home directory: `$SHOAL_HOME` or `~/.shoal`.
pub fn shoal_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("SHOAL_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".shoal")
}

/// Logs directory: `<home>/logs`.
pub fn logs_dir() -> PathBuf {
    shoal_home().join("logs")
}

/// Default Unix socket path for the preview server: `<home>/preview.sock`.
pub fn default_socket_path() -> PathBuf {
    shoal_home().join("preview.sock")
}

/// Directory the server writes generated thumbnails into: `<home>/thumbnails`.
/// Files in here are owned by the server until the UI consumes and deletes them.
pub fn thumbnails_dir() -> PathBuf {
    shoal_home().join("thumbnails")
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

/// Ensure the thumbnails directory exists.
pub fn ensure_thumbnails_dir() -> Result<PathBuf> {
    let thumbs = thumbnails_dir();
    fs::create_dir_all(&thumbs)
        .with_context(|| format!("Failed to create thumbnails directory: {}", thumbs.display()))?;
    Ok(thumbs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_respects_override() {
        // Serialize env mutation against other tests in this module.
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("SHOAL_HOME", dir.path());
        assert_eq!(shoal_home(), dir.path());
        assert_eq!(logs_dir(), dir.path().join("logs"));
        assert_eq!(default_socket_path(), dir.path().join("preview.sock"));
        assert_eq!(thumbnails_dir(), dir.path().join("thumbnails"));
        std::env::remove_var("SHOAL_HOME");
    }
}
