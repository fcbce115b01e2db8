//! Client side of the Shoal preview subsystem.
//!
//! [`PreviewClient`] lives inside the single-threaded UI process. It owns the
//! socket connection to the preview server, a background reader thread, and a
//! queue of decoded results the input loop polls once per tick. Nothing in
//! here ever blocks the UI thread: connects that find no server downgrade to
//! a disconnected client, and sends on a full transport buffer are dropped.

mod client;

pub use client::PreviewClient;
pub use shoal_protocol::{FileKind, PreviewLine, PreviewResult, RequestId, Status};
