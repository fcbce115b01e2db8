//! Server side of the Shoal preview subsystem.
//!
//! A long-lived process owning the listening Unix socket, a fixed worker
//! pool draining one shared FIFO of preview requests, a cancellation set,
//! and per-file-category generators. Expensive work (syntax highlighting,
//! video/PDF/HEIC thumbnailing via external tools) happens here so the
//! single-threaded UI never blocks; the UI talks to this process through
//! `shoal_preview`.

pub mod exec;
pub mod generate;
pub mod server;

pub use server::{PreviewServer, ServerConfig, DEFAULT_TOOL_TIMEOUT_SECS, DEFAULT_WORKERS};
