//! shoal-previewd: the preview generation daemon.
//!
//! Started by the Shoal UI on demand, one instance per socket path. All
//! knobs have environment overrides so the UI can configure a spawned
//! daemon without building argv.

use anyhow::{Context, Result};
use clap::Parser;
use shoal_logging::{init_logging, LogConfig};
use shoal_previewd::{PreviewServer, ServerConfig, DEFAULT_TOOL_TIMEOUT_SECS, DEFAULT_WORKERS};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "shoal-previewd", about = "Shoal preview generation daemon", version)]
struct Args {
    /// Unix socket to listen on
    #[arg(long, env = "SHOAL_PREVIEW_SOCKET")]
    socket: Option<PathBuf>,

    /// Worker pool size
    #[arg(long, env = "SHOAL_PREVIEW_WORKERS", default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// Per-tool timeout in seconds
    #[arg(long, env = "SHOAL_PREVIEW_TIMEOUT", default_value_t = DEFAULT_TOOL_TIMEOUT_SECS)]
    timeout: u64,

    /// Directory for generated thumbnails
    #[arg(long)]
    thumbnail_dir: Option<PathBuf>,

    /// Also log to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(LogConfig {
        app_name: "shoal-previewd",
        verbose: args.verbose,
    })
    .context("Failed to initialize logging")?;

    let socket_path = args
        .socket
        .unwrap_or_else(shoal_logging::default_socket_path);
    let thumbnail_dir = args
        .thumbnail_dir
        .unwrap_or_else(shoal_logging::thumbnails_dir);

    info!("Starting shoal-previewd {}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig {
        socket_path,
        workers: args.workers,
        tool_timeout: Duration::from_secs(args.timeout),
        thumbnail_dir,
    };
    let server = PreviewServer::bind(config).context("Failed to start preview server")?;
    server.run()
}
