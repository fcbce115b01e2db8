//! Preview client: connection bookkeeping, supersession, result queue.

use shoal_protocol::{decode_line, encode_line, FileKind, Message, PreviewRequest, PreviewResult, RequestId};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How often the reader thread re-checks a quiet socket.
const READ_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How often `wait_result` re-polls the queue.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Retry cadence when a frame was only partially written. Messages are a few
/// hundred bytes, so this path is nearly unreachable in practice.
const SEND_RETRY_INTERVAL: Duration = Duration::from_millis(5);
const SEND_RETRIES: usize = 4;

/// Client endpoint of the preview IPC channel.
///
/// Holds at most one in-flight request: issuing a new request always cancels
/// the previous one first, so the server never burns a worker on a preview
/// the cursor has already moved past.
pub struct PreviewClient {
    socket_path: PathBuf,
    stream: Option<UnixStream>,
    connected: Arc<AtomicBool>,
    results: Arc<Mutex<VecDeque<PreviewResult>>>,
    reader: Option<JoinHandle<()>>,
    in_flight: Option<RequestId>,
    next_id: u64,
}

impl PreviewClient {
    /// Create a client for the given socket path. Does not connect.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        // Fold the pid into the id space so a restarted UI never reuses ids
        // the server may still hold in its cancellation set.
        let id_base = (std::process::id() as u64) << 32;
        Self {
            socket_path: socket_path.into(),
            stream: None,
            connected: Arc::new(AtomicBool::new(false)),
            results: Arc::new(Mutex::new(VecDeque::new())),
            reader: None,
            in_flight: None,
            next_id: id_base,
        }
    }

    /// Connect to the preview server. Idempotent.
    ///
    /// An absent or refusing endpoint is not an error: the UI must tolerate a
    /// preview service that never came up, so those cases just leave the
    /// client disconnected.
    pub fn connect(&mut self) -> io::Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }

        let stream = match UnixStream::connect(&self.socket_path) {
            Ok(stream) => stream,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
                ) =>
            {
                debug!(
                    "Preview server not available at {}: {}",
                    self.socket_path.display(),
                    e
                );
                self.connected.store(false, Ordering::SeqCst);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        stream.set_nonblocking(true)?;
        let reader_stream = stream.try_clone()?;

        self.connected.store(true, Ordering::SeqCst);
        let connected = Arc::clone(&self.connected);
        let results = Arc::clone(&self.results);
        self.reader = Some(
            thread::Builder::new()
                .name("preview-reader".to_string())
                .spawn(move || reader_loop(reader_stream, connected, results))?,
        );
        self.stream = Some(stream);

        debug!("Connected to preview server at {}", self.socket_path.display());
        Ok(())
    }

    /// Whether the client currently believes it is connected.
    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Request a preview for `path`, superseding any in-flight request.
    ///
    /// Returns the new request id, or `None` when disconnected. The cancel
    /// for the superseded request is written strictly before the new request.
    pub fn request(
        &mut self,
        path: impl AsRef<Path>,
        file_type: Option<FileKind>,
        width: u16,
        height: u16,
    ) -> Option<RequestId> {
        if !self.connected() {
            return None;
        }

        if let Some(previous) = self.in_flight.take() {
            self.cancel(previous);
        }

        self.next_id += 1;
        let id = RequestId::new(self.next_id);
        let request = PreviewRequest::new(id, path.as_ref(), file_type, width, height);
        self.send(&Message::Request(request));
        self.in_flight = Some(id);
        Some(id)
    }

    /// Ask the server to discard the given request if it has not started.
    pub fn cancel(&mut self, id: RequestId) {
        if self.connected() {
            self.send(&Message::Cancel { id });
        }
    }

    /// Non-blocking dequeue of the next ready result.
    pub fn poll_result(&mut self) -> Option<PreviewResult> {
        let result = self.results.lock().ok()?.pop_front()?;
        if self.in_flight == Some(result.id) {
            self.in_flight = None;
        }
        Some(result)
    }

    /// Whether a result is queued.
    pub fn has_result(&self) -> bool {
        self.results.lock().map(|q| !q.is_empty()).unwrap_or(false)
    }

    /// Poll for a result until one arrives or `timeout` elapses.
    pub fn wait_result(&mut self, timeout: Duration) -> Option<PreviewResult> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(result) = self.poll_result() {
                return Some(result);
            }
            if Instant::now() >= deadline {
                return None;
            }
            thread::sleep(WAIT_POLL_INTERVAL);
        }
    }

    /// Tell the server to stop accepting work, then drop the connection.
    pub fn shutdown(&mut self) {
        if self.connected() {
            self.send(&Message::Shutdown);
        }
        self.close();
    }

    /// Drop the connection and stop the reader. The server keeps running.
    pub fn close(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        self.in_flight = None;
    }

    /// Write one message without ever blocking the UI thread.
    ///
    /// A full transport buffer drops the message: at-most-once, no retry
    /// queue. A partial frame gets a brief bounded retry so we do not leave
    /// half a JSON line on the wire.
    fn send(&mut self, message: &Message) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        let line = match encode_line(message) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to encode preview message: {}", e);
                return;
            }
        };
        let bytes = line.as_bytes();

        match stream.write(bytes) {
            Ok(n) if n == bytes.len() => {}
            Ok(mut written) => {
                for _ in 0..SEND_RETRIES {
                    thread::sleep(SEND_RETRY_INTERVAL);
                    match stream.write(&bytes[written..]) {
                        Ok(n) => {
                            written += n;
                            if written == bytes.len() {
                                return;
                            }
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                        Err(e) => {
                            debug!("Preview send failed mid-frame: {}", e);
                            break;
                        }
                    }
                }
                warn!("Dropped partially written preview message");
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                debug!("Preview transport buffer full, dropping message");
            }
            Err(e) => {
                debug!("Preview send failed, marking disconnected: {}", e);
                self.connected.store(false, Ordering::SeqCst);
            }
        }
    }
}

impl Drop for PreviewClient {
    fn drop(&mut self) {
        self.close();
    }
}

/// Background reader: accumulates bytes off the socket, extracts complete
/// newline-terminated lines, and queues decoded `result` messages. Any
/// transport error or EOF ends the loop and flips the client to disconnected.
fn reader_loop(
    mut stream: UnixStream,
    connected: Arc<AtomicBool>,
    results: Arc<Mutex<VecDeque<PreviewResult>>>,
) {
    let mut acc: Vec<u8> = Vec::new();
    let mut buf = [0u8; 4096];

    while connected.load(Ordering::SeqCst) {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                acc.extend_from_slice(&buf[..n]);
                drain_lines(&mut acc, &results);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(READ_POLL_INTERVAL);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                debug!("Preview reader stopping: {}", e);
                break;
            }
        }
    }

    connected.store(false, Ordering::SeqCst);
}

fn drain_lines(acc: &mut Vec<u8>, results: &Mutex<VecDeque<PreviewResult>>) {
    while let Some(pos) = acc.iter().position(|&b| b == b'\n') {
        let line_bytes: Vec<u8> = acc.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&line_bytes);
        match decode_line(&line) {
            Ok(Message::Result(result)) => {
                if let Ok(mut queue) = results.lock() {
                    queue.push_back(result);
                }
            }
            Ok(other) => debug!("Ignoring unexpected message from server: {:?}", other),
            Err(e) => debug!("Dropping malformed line from server: {}", e),
        }
    }
}
