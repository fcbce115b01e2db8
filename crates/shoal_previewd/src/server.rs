//! Preview server: accept loop, per-connection readers, worker pool.
//!
//! Threading layout: the caller of [`PreviewServer::run`] is the accept
//! loop; each accepted connection gets a reader thread; a fixed pool of
//! workers drains one shared FIFO of requests. Shared state is exactly two
//! mutexes (the cancellation set and the tracked client connection) plus
//! the thread-safe job channel.
//!
//! The server tracks a single client connection: whichever connection was
//! accepted most recently receives all results. A second client silently
//! supersedes delivery for the first. That is a deliberate design
//! constraint of the subsystem, not an accident.

use crate::generate::{self, GeneratorContext};
use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use shoal_protocol::{decode_line, encode_line, Message, PreviewRequest, PreviewResult, RequestId};
use std::collections::HashSet;
use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::io::AsRawFd;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default worker-pool size. Two workers keep one slow thumbnail job from
/// starving cheap text previews without fanning out external tools.
pub const DEFAULT_WORKERS: usize = 2;

/// Default per-tool timeout in seconds.
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 10;

/// Bounded poll interval for the accept loop.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Preview server configuration (plain data, passed in explicitly).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Unix socket path to listen on. A stale file there is removed.
    pub socket_path: std::path::PathBuf,
    /// Fixed worker-pool size.
    pub workers: usize,
    /// Budget for every external tool invocation.
    pub tool_timeout: Duration,
    /// Directory generated thumbnails are written into.
    pub thumbnail_dir: std::path::PathBuf,
}

impl ServerConfig {
    pub fn new(socket_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            workers: DEFAULT_WORKERS,
            tool_timeout: Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS),
            thumbnail_dir: shoal_logging::thumbnails_dir(),
        }
    }
}

/// Work queue item. `Stop` is the sentinel that tells a worker to exit.
enum Job {
    Generate(PreviewRequest),
    Stop,
}

type TrackedClient = Arc<Mutex<Option<UnixStream>>>;
type CancelSet = Arc<Mutex<HashSet<RequestId>>>;

/// Bound preview server. `run()` consumes self and blocks for the process
/// lifetime.
pub struct PreviewServer {
    config: ServerConfig,
    listener: UnixListener,
    job_tx: Sender<Job>,
    workers: Vec<JoinHandle<()>>,
    cancelled: CancelSet,
    client: TrackedClient,
    stop: Arc<AtomicBool>,
}

impl PreviewServer {
    /// Remove any stale socket, bind, and spawn the worker pool.
    pub fn bind(config: ServerConfig) -> Result<Self> {
        if config.socket_path.exists() {
            fs::remove_file(&config.socket_path).with_context(|| {
                format!("Failed to remove stale socket {}", config.socket_path.display())
            })?;
        }
        if let Some(parent) = config.socket_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create socket directory {}", parent.display())
            })?;
        }
        fs::create_dir_all(&config.thumbnail_dir).with_context(|| {
            format!("Failed to create thumbnail dir {}", config.thumbnail_dir.display())
        })?;

        let listener = UnixListener::bind(&config.socket_path).with_context(|| {
            format!("Failed to bind preview socket {}", config.socket_path.display())
        })?;
        listener
            .set_nonblocking(true)
            .context("Failed to make listener non-blocking")?;

        let (job_tx, job_rx) = crossbeam_channel::unbounded();
        let cancelled: CancelSet = Arc::new(Mutex::new(HashSet::new()));
        let client: TrackedClient = Arc::new(Mutex::new(None));
        let ctx = GeneratorContext {
            tool_timeout: config.tool_timeout,
            thumbnail_dir: config.thumbnail_dir.clone(),
        };

        let pool_size = config.workers.max(1);
        let mut workers = Vec::with_capacity(pool_size);
        for i in 0..pool_size {
            let rx: Receiver<Job> = job_rx.clone();
            let cancelled = Arc::clone(&cancelled);
            let client = Arc::clone(&client);
            let ctx = ctx.clone();
            let handle = thread::Builder::new()
                .name(format!("preview-worker-{i}"))
                .spawn(move || worker_loop(rx, cancelled, client, ctx))
                .context("Failed to spawn preview worker")?;
            workers.push(handle);
        }

        info!(
            "Preview server listening on {} ({} workers, {}s tool budget)",
            config.socket_path.display(),
            pool_size,
            config.tool_timeout.as_secs()
        );

        Ok(Self {
            config,
            listener,
            job_tx,
            workers,
            cancelled,
            client,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    /// Accept loop. Blocks until a `shutdown` message or a fatal transport
    /// error, then tears the pool down.
    pub fn run(self) -> Result<()> {
        while !self.stop.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    if let Err(e) = self.track_connection(stream) {
                        warn!("Failed to set up client connection: {:#}", e);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    error!("Accept failed, shutting down: {}", e);
                    break;
                }
            }
        }
        self.shutdown()
    }

    /// Record the new connection as the tracked one and spawn its reader.
    fn track_connection(&self, stream: UnixStream) -> Result<()> {
        // The listener is non-blocking for the accept poll; readers do
        // blocking line reads on their own threads.
        stream.set_nonblocking(false)?;
        let fd = stream.as_raw_fd();
        let reader_stream = stream.try_clone()?;
        *lock(&self.client) = Some(stream);
        info!("Preview client connected (fd {fd})");

        let job_tx = self.job_tx.clone();
        let cancelled = Arc::clone(&self.cancelled);
        let client = Arc::clone(&self.client);
        let stop = Arc::clone(&self.stop);
        thread::Builder::new()
            .name(format!("preview-conn-{fd}"))
            .spawn(move || connection_loop(reader_stream, fd, job_tx, cancelled, client, stop))
            .context("Failed to spawn connection reader")?;
        Ok(())
    }

    /// Stop the pool: one sentinel per worker, join them all, unlink the
    /// socket file.
    fn shutdown(self) -> Result<()> {
        info!("Preview server shutting down");
        for _ in 0..self.workers.len() {
            let _ = self.job_tx.send(Job::Stop);
        }
        for handle in self.workers {
            let _ = handle.join();
        }
        *lock(&self.client) = None;
        drop(self.listener);
        if self.config.socket_path.exists() {
            fs::remove_file(&self.config.socket_path).with_context(|| {
                format!("Failed to remove socket {}", self.config.socket_path.display())
            })?;
        }
        info!("Preview server stopped");
        Ok(())
    }
}

/// Per-connection reader: newline-delimited JSON messages, dispatched by
/// type. Malformed lines are dropped. Teardown clears the tracked
/// connection only if it is still this one.
fn connection_loop(
    stream: UnixStream,
    fd: i32,
    job_tx: Sender<Job>,
    cancelled: CancelSet,
    client: TrackedClient,
    stop: Arc<AtomicBool>,
) {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => match decode_line(&line) {
                Ok(Message::Request(request)) => {
                    debug!(
                        "Request {} for {} ({}x{})",
                        request.id,
                        request.path.display(),
                        request.width,
                        request.height
                    );
                    if job_tx.send(Job::Generate(request)).is_err() {
                        break;
                    }
                }
                Ok(Message::Cancel { id }) => {
                    debug!("Cancel flagged for {id}");
                    lock(&cancelled).insert(id);
                }
                Ok(Message::Shutdown) => {
                    info!("Shutdown requested by client");
                    stop.store(true, Ordering::SeqCst);
                    break;
                }
                Ok(Message::Result(_)) => {
                    warn!("Ignoring unexpected result message from client");
                }
                Err(e) => debug!("Dropping malformed line from client: {}", e),
            },
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                debug!("Client connection error: {}", e);
                break;
            }
        }
    }

    let mut tracked = lock(&client);
    if tracked.as_ref().map(|s| s.as_raw_fd()) == Some(fd) {
        *tracked = None;
        info!("Preview client disconnected (fd {fd})");
    }
}

/// Worker: drain the shared queue until the stop sentinel.
///
/// Cancellation is cooperative and consulted at exactly two points: before
/// generation starts and again before the result is transmitted. Work
/// already inside an external tool is only ever bounded by the tool
/// timeout.
fn worker_loop(
    jobs: Receiver<Job>,
    cancelled: CancelSet,
    client: TrackedClient,
    ctx: GeneratorContext,
) {
    while let Ok(job) = jobs.recv() {
        let request = match job {
            Job::Stop => break,
            Job::Generate(request) => request,
        };

        if consume_cancel(&cancelled, request.id) {
            debug!("Request {} cancelled before generation", request.id);
            continue;
        }

        let result = generate::dispatch(&request, &ctx);

        if consume_cancel(&cancelled, request.id) {
            debug!("Request {} cancelled during generation, discarding", request.id);
            discard(result);
            continue;
        }

        deliver(&client, &result);
        lock(&cancelled).remove(&request.id);
    }
}

/// Check-and-clear a cancellation flag. Entries are removed as soon as they
/// are consulted so the set never grows past the in-flight window.
fn consume_cancel(cancelled: &CancelSet, id: RequestId) -> bool {
    lock(cancelled).remove(&id)
}

/// A discarded result may own a thumbnail nobody will ever consume.
fn discard(result: PreviewResult) {
    if let Some(path) = result.thumbnail_path {
        let _ = fs::remove_file(path);
    }
}

/// Write one result line to the tracked connection. Transport errors are
/// swallowed: the client may simply be gone.
fn deliver(client: &TrackedClient, result: &PreviewResult) {
    let line = match encode_line(&Message::Result(result.clone())) {
        Ok(line) => line,
        Err(e) => {
            warn!("Failed to encode result {}: {}", result.id, e);
            return;
        }
    };
    let mut tracked = lock(client);
    match tracked.as_mut() {
        Some(stream) => {
            if let Err(e) = stream.write_all(line.as_bytes()) {
                debug!("Failed to deliver result {}: {}", result.id, e);
            }
        }
        None => debug!("No tracked client, dropping result {}", result.id),
    }
}

/// Poison recovery: a panicked holder leaves the data no less usable here,
/// so take the guard either way rather than unwinding the whole server.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
