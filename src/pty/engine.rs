//! Native engine contract.
//!
//! An engine allocates the pseudoterminal, runs the child process and
//! performs raw I/O on it. The bridge only ever talks to an engine through
//! this trait, so tests can substitute a scripted engine for the real one.

use thiserror::Error;

use crate::pty::size::Size;
use crate::pty::spawn_spec::SpawnSpec;

/// Failure reported by an engine. The text is the engine's diagnostic,
/// kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Result of one non-blocking read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Bytes produced by the child since the last poll. May be empty.
    Data(Vec<u8>),
    /// Nothing available yet.
    Pending,
    /// The child exited and all of its output has been delivered.
    End,
}

/// Operations the bridge needs from a native PTY implementation.
///
/// Calls of different kinds may run concurrently against the same handle;
/// the bridge never issues two calls of the same kind at once.
pub trait PtyEngine: Send + Sync + 'static {
    type Handle: Send + Sync + 'static;

    fn create(&self, spec: &SpawnSpec) -> Result<Self::Handle, EngineError>;

    /// Must not block waiting for output.
    fn poll_read(&self, handle: &Self::Handle) -> Result<ReadOutcome, EngineError>;

    fn write(&self, handle: &Self::Handle, bytes: &[u8]) -> Result<(), EngineError>;

    fn get_size(&self, handle: &Self::Handle) -> Result<Size, EngineError>;

    fn set_size(&self, handle: &Self::Handle, size: Size) -> Result<(), EngineError>;

    /// Make any in-flight call on `handle` return promptly, typically by
    /// killing the child. Called before `close` while other calls may
    /// still hold the handle, so it must not wait on them.
    fn interrupt(&self, handle: &Self::Handle);

    /// Release the session. Best-effort; consuming the handle makes a
    /// second close impossible.
    fn close(&self, handle: Self::Handle);
}
