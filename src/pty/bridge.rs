//! Stream-to-PTY bridge.
//!
//! A [`PtyBridge`] owns one engine session. Output is produced by a poll
//! task into a bounded channel and read through [`PtyOutput`]; input goes
//! through [`PtyInput`], which normalizes line breaks and serializes
//! writes.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_core::Stream;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::pty::engine::{EngineError, PtyEngine, ReadOutcome};
use crate::pty::error::BridgeError;
use crate::pty::lifecycle::{Lifecycle, Phase};
use crate::pty::native::NativeEngine;
use crate::pty::size::Size;
use crate::pty::spawn_spec::SpawnSpec;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
pub const DEFAULT_OUTPUT_BUFFER: usize = 8;

/// What a line-editing child expects for a single Enter press.
const LINE_BREAK: &[u8] = b"\r\n";

/// One item of the output stream.
pub type OutputItem = Result<Vec<u8>, BridgeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Delay between two polls of the engine.
    pub poll_interval: Duration,
    /// Output chunks buffered before polling pauses.
    pub output_buffer: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            output_buffer: DEFAULT_OUTPUT_BUFFER,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Running,
    Stopped,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Running => write!(f, "running"),
            Status::Stopped => write!(f, "stopped"),
        }
    }
}

/// Apply the input rule to one chunk.
///
/// Returns `None` for an empty chunk. A chunk starting with a bare `\r` or
/// `\n` is replaced as a whole by `\r\n`; anything else passes unchanged.
pub fn normalize_input(chunk: &[u8]) -> Option<&[u8]> {
    match chunk.first() {
        None => None,
        Some(b'\r' | b'\n') => Some(LINE_BREAK),
        Some(_) => Some(chunk),
    }
}

struct Shared<E: PtyEngine> {
    id: Uuid,
    engine: Arc<E>,
    /// `None` once released. Calls hold the read lock; close takes the
    /// write lock, so it waits for in-flight calls to drain.
    handle: RwLock<Option<E::Handle>>,
    lifecycle: Lifecycle,
    /// Used to route write failures onto the output stream. Dropped on
    /// close so the stream can end.
    output_tx: Mutex<Option<mpsc::Sender<OutputItem>>>,
    write_gate: tokio::sync::Mutex<()>,
    size_gate: Mutex<()>,
}

impl<E: PtyEngine> Shared<E> {
    fn call<T>(
        &self,
        op: impl FnOnce(&E, &E::Handle) -> Result<T, EngineError>,
    ) -> Result<T, BridgeError> {
        if !self.lifecycle.is_running() {
            return Err(BridgeError::NotRunning);
        }
        let guard = self.handle.read();
        let handle = guard.as_ref().ok_or(BridgeError::NotRunning)?;
        op(self.engine.as_ref(), handle).map_err(BridgeError::from)
    }

    /// Release the session. Only the first caller does any work.
    fn shutdown(&self) -> bool {
        if !self.lifecycle.begin_close() {
            return false;
        }
        scopeguard::defer! {
            self.lifecycle.finish_close();
        }

        self.output_tx.lock().take();
        // A blocked write holds the read lock until the child is gone.
        if let Some(handle) = self.handle.read().as_ref() {
            self.engine.interrupt(handle);
        }
        let handle = self.handle.write().take();
        if let Some(handle) = handle {
            self.engine.close(handle);
        }
        tracing::debug!(session = %self.id, "PTY session closed");
        true
    }

    async fn close(self: &Arc<Self>) {
        if self.lifecycle.phase() == Phase::Running {
            let shared = Arc::clone(self);
            if let Err(e) = tokio::task::spawn_blocking(move || shared.shutdown()).await {
                tracing::debug!(session = %self.id, "PTY close task failed: {e}");
            }
        }
        self.lifecycle.closed().await;
    }

    /// Report a session fault to the output consumer, then close.
    async fn fail(self: &Arc<Self>, err: BridgeError) {
        tracing::warn!(session = %self.id, "PTY session fault: {err}");
        let tx = self.output_tx.lock().clone();
        if let Some(tx) = tx {
            tokio::select! {
                _ = tx.send(Err(err)) => {}
                _ = self.lifecycle.closing() => {}
            }
        }
        self.close().await;
    }

    async fn write(self: &Arc<Self>, chunk: &[u8]) -> Result<(), BridgeError> {
        if !self.lifecycle.is_running() {
            return Err(BridgeError::NotRunning);
        }
        let Some(payload) = normalize_input(chunk) else {
            return Ok(());
        };
        let payload = payload.to_vec();

        let _gate = self.write_gate.lock().await;
        let shared = Arc::clone(self);
        let len = payload.len();
        let result = tokio::task::spawn_blocking(move || {
            shared.call(|engine, handle| engine.write(handle, &payload))
        })
        .await
        .unwrap_or_else(|e| Err(BridgeError::Session(format!("write task failed: {e}"))));

        match &result {
            Ok(()) => tracing::trace!(session = %self.id, bytes = len, "PTY input"),
            // A write cut short by close is not a session fault.
            Err(err @ BridgeError::Session(_)) if self.lifecycle.is_running() => {
                self.fail(err.clone()).await
            }
            Err(_) => {}
        }
        result
    }
}

impl<E: PtyEngine> Drop for Shared<E> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            self.engine.close(handle);
        }
    }
}

async fn poll_loop<E: PtyEngine>(
    shared: Arc<Shared<E>>,
    tx: mpsc::Sender<OutputItem>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shared.lifecycle.closing() => break,
            _ = ticker.tick() => {}
        }
        if tx.is_closed() {
            tracing::debug!(session = %shared.id, "PTY output consumer dropped");
            shared.close().await;
            break;
        }

        let polled = {
            let shared = Arc::clone(&shared);
            tokio::task::spawn_blocking(move || {
                shared.call(|engine, handle| engine.poll_read(handle))
            })
            .await
            .unwrap_or_else(|e| Err(BridgeError::Session(format!("poll task failed: {e}"))))
        };

        match polled {
            Ok(ReadOutcome::Data(chunk)) => {
                if chunk.is_empty() {
                    continue;
                }
                tracing::trace!(session = %shared.id, bytes = chunk.len(), "PTY output");
                tokio::select! {
                    sent = tx.send(Ok(chunk)) => {
                        if sent.is_err() {
                            tracing::debug!(session = %shared.id, "PTY output consumer dropped");
                            shared.close().await;
                            break;
                        }
                    }
                    _ = shared.lifecycle.closing() => break,
                }
            }
            Ok(ReadOutcome::Pending) => {}
            Ok(ReadOutcome::End) => {
                tracing::debug!(session = %shared.id, "PTY child exited");
                shared.close().await;
                break;
            }
            Err(BridgeError::NotRunning) => break,
            Err(err) => {
                tracing::warn!(session = %shared.id, "PTY read failed: {err}");
                tokio::select! {
                    _ = tx.send(Err(err)) => {}
                    _ = shared.lifecycle.closing() => {}
                }
                shared.close().await;
                break;
            }
        }
    }
}

/// A PTY session exposed as an output stream plus an input sink.
///
/// Requires a Tokio runtime. Dropping the bridge closes the session.
pub struct PtyBridge<E: PtyEngine = NativeEngine> {
    shared: Arc<Shared<E>>,
    output: Option<PtyOutput>,
    poll_task: Option<JoinHandle<()>>,
}

impl PtyBridge<NativeEngine> {
    /// Spawn `spec` in a new native PTY with the default configuration.
    pub fn spawn(spec: SpawnSpec) -> Result<Self, BridgeError> {
        Self::spawn_with(&spec, BridgeConfig::default())
    }

    pub fn spawn_with(spec: &SpawnSpec, config: BridgeConfig) -> Result<Self, BridgeError> {
        Self::with_engine(Arc::new(NativeEngine::new()), spec, config)
    }
}

impl<E: PtyEngine> PtyBridge<E> {
    /// Create a session on `engine` and start polling it.
    ///
    /// Either returns a running bridge or fails with
    /// [`BridgeError::Spawn`]; nothing is left behind on failure.
    pub fn with_engine(
        engine: Arc<E>,
        spec: &SpawnSpec,
        config: BridgeConfig,
    ) -> Result<Self, BridgeError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| BridgeError::Spawn(format!("no async runtime: {e}")))?;
        let handle = engine
            .create(spec)
            .map_err(|e| BridgeError::Spawn(e.0))?;

        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(config.output_buffer.max(1));
        let shared = Arc::new(Shared {
            id,
            engine,
            handle: RwLock::new(Some(handle)),
            lifecycle: Lifecycle::new(),
            output_tx: Mutex::new(Some(tx.clone())),
            write_gate: tokio::sync::Mutex::new(()),
            size_gate: Mutex::new(()),
        });

        let interval = config.poll_interval.max(Duration::from_millis(1));
        let poll_task = runtime.spawn(poll_loop(Arc::clone(&shared), tx, interval));
        tracing::debug!(session = %id, command = spec.command(), "PTY session started");

        Ok(Self {
            shared,
            output: Some(PtyOutput { rx }),
            poll_task: Some(poll_task),
        })
    }

    /// Identifier used in this session's log events.
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Take the output stream. Returns `None` after the first call.
    pub fn take_output(&mut self) -> Option<PtyOutput> {
        self.output.take()
    }

    pub fn input(&self) -> PtyInput<E> {
        PtyInput {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Same as [`PtyInput::write`].
    pub async fn write(&self, chunk: &[u8]) -> Result<(), BridgeError> {
        self.shared.write(chunk).await
    }

    /// Ask the engine for the current size.
    pub fn size(&self) -> Result<Size, BridgeError> {
        let _gate = self.shared.size_gate.lock();
        self.shared.call(|engine, handle| engine.get_size(handle))
    }

    pub fn set_size(&self, size: Size) -> Result<(), BridgeError> {
        let _gate = self.shared.size_gate.lock();
        self.shared.call(|engine, handle| engine.set_size(handle, size))?;
        tracing::debug!(session = %self.shared.id, rows = size.rows, cols = size.cols, "PTY resized");
        Ok(())
    }

    pub fn status(&self) -> Status {
        match self.shared.lifecycle.phase() {
            Phase::Closed => Status::Stopped,
            Phase::Running | Phase::Closing => Status::Running,
        }
    }

    /// Close the session and wait for the poll task to finish. Safe to
    /// call more than once.
    pub async fn close(&mut self) {
        self.shared.close().await;
        if let Some(task) = self.poll_task.take() {
            if let Err(e) = task.await {
                tracing::debug!(session = %self.shared.id, "PTY poll task ended abnormally: {e}");
            }
        }
    }
}

impl<E: PtyEngine> Drop for PtyBridge<E> {
    fn drop(&mut self) {
        if self.shared.lifecycle.phase() != Phase::Running {
            return;
        }
        // Killing and reaping the child blocks; keep it off async workers.
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let shared = Arc::clone(&self.shared);
                drop(runtime.spawn_blocking(move || shared.shutdown()));
            }
            Err(_) => {
                self.shared.shutdown();
            }
        }
    }
}

/// Writable side of a bridge. Cheap to clone; all clones feed the same
/// session in submission order.
pub struct PtyInput<E: PtyEngine = NativeEngine> {
    shared: Arc<Shared<E>>,
}

impl<E: PtyEngine> Clone for PtyInput<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E: PtyEngine> PtyInput<E> {
    /// Forward one chunk to the child.
    ///
    /// Empty chunks are dropped. A chunk starting with `\r` or `\n` is sent
    /// as `\r\n`. An engine failure is also delivered on the output stream
    /// and closes the session.
    pub async fn write(&self, chunk: &[u8]) -> Result<(), BridgeError> {
        self.shared.write(chunk).await
    }

    /// Close the input side, which closes the whole session.
    pub async fn close(&self) {
        self.shared.close().await;
    }

    pub fn is_closed(&self) -> bool {
        !self.shared.lifecycle.is_running()
    }
}

/// Readable side of a bridge: child output in poll order.
///
/// Yields `Ok(chunk)` items, then ends with `None` when the session
/// closes. An engine failure arrives as one `Err` item right before the
/// end. Dropping it closes the session.
pub struct PtyOutput {
    rx: mpsc::Receiver<OutputItem>,
}

impl PtyOutput {
    pub async fn next_chunk(&mut self) -> Option<OutputItem> {
        self.rx.recv().await
    }
}

impl Stream for PtyOutput {
    type Item = OutputItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_chunk_is_dropped() {
        assert_eq!(normalize_input(b""), None);
    }

    #[test]
    fn leading_carriage_return_or_newline_becomes_crlf() {
        assert_eq!(normalize_input(b"\r"), Some(&b"\r\n"[..]));
        assert_eq!(normalize_input(b"\n"), Some(&b"\r\n"[..]));
        assert_eq!(normalize_input(b"\n\rtrailing text"), Some(&b"\r\n"[..]));
    }

    #[test]
    fn other_chunks_pass_through() {
        assert_eq!(normalize_input(b"5+4\n\r"), Some(&b"5+4\n\r"[..]));
        assert_eq!(normalize_input(b" \n"), Some(&b" \n"[..]));
        assert_eq!(normalize_input(b"\x03"), Some(&b"\x03"[..]));
    }

    #[test]
    fn status_displays_lowercase() {
        assert_eq!(Status::Running.to_string(), "running");
        assert_eq!(Status::Stopped.to_string(), "stopped");
    }

    #[test]
    fn default_config_polls_every_50ms() {
        let config = BridgeConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert_eq!(config.output_buffer, 8);
    }
}
