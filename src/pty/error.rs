use thiserror::Error;

use crate::pty::engine::EngineError;

/// Errors surfaced by a [`PtyBridge`](crate::pty::PtyBridge).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// The engine could not create the session. The bridge never existed.
    #[error("failed to spawn process: {0}")]
    Spawn(String),

    /// A read, write or size call failed on a live session. Carries the
    /// engine's diagnostic text unchanged.
    #[error("PTY session error: {0}")]
    Session(String),

    /// The session is closed; the engine was not called.
    #[error("Failed: Process dead.")]
    NotRunning,
}

impl BridgeError {
    /// Engine diagnostic text, if this error came from the engine.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            BridgeError::Spawn(text) | BridgeError::Session(text) => Some(text),
            BridgeError::NotRunning => None,
        }
    }
}

impl From<EngineError> for BridgeError {
    fn from(err: EngineError) -> Self {
        BridgeError::Session(err.0)
    }
}
