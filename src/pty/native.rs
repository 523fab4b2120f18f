//! Default engine backed by `portable-pty`.
//!
//! A reader thread drains the master side into a channel so that
//! [`PtyEngine::poll_read`] never blocks.
//!
//! The reader thread is detached. It exits once every slave descriptor is
//! closed, which normally happens when `close` kills the child. A
//! background grandchild that inherited the slave keeps it open, and the
//! thread then lives until that process exits. `close` itself never waits
//! for the reader.

use std::io::{self, Read, Write};
use std::sync::mpsc;
use std::thread;

use parking_lot::Mutex;
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty};

use crate::pty::engine::{EngineError, PtyEngine, ReadOutcome};
use crate::pty::size::Size;
use crate::pty::spawn_spec::SpawnSpec;

/// Bytes read from the master per `read` call.
pub const READ_CHUNK: usize = 8_192;

#[derive(Debug, Default, Clone, Copy)]
pub struct NativeEngine;

impl NativeEngine {
    pub fn new() -> Self {
        Self
    }
}

/// One PTY pair plus its child process.
pub struct NativeSession {
    master: Mutex<Box<dyn MasterPty + Send>>,
    writer: Mutex<Box<dyn Write + Send>>,
    child: Mutex<Box<dyn Child + Send + Sync>>,
    /// Separate from `child` so a kill never waits behind another call.
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    output_rx: Mutex<mpsc::Receiver<io::Result<Vec<u8>>>>,
}

impl PtyEngine for NativeEngine {
    type Handle = NativeSession;

    fn create(&self, spec: &SpawnSpec) -> Result<NativeSession, EngineError> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(Size::default().into())
            .map_err(|e| EngineError(format!("failed to open PTY: {e}")))?;

        let mut cmd = CommandBuilder::new(spec.command());
        cmd.args(spec.arguments());
        for (key, value) in spec.environment() {
            cmd.env(key, value);
        }
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| EngineError(format!("failed to spawn '{}': {e}", spec.command())))?;
        drop(pair.slave);
        let killer = child.clone_killer();

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| EngineError(format!("failed to clone PTY reader: {e}")))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| EngineError(format!("failed to take PTY writer: {e}")))?;

        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("pty-reader".to_string())
            .spawn(move || {
                let mut buf = [0u8; READ_CHUNK];
                loop {
                    match reader.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            if tx.send(Ok(buf[..n].to_vec())).is_err() {
                                break;
                            }
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) if is_hangup(&e) => break,
                        Err(e) => {
                            tracing::debug!("PTY reader error: {e}");
                            let _ = tx.send(Err(e));
                            break;
                        }
                    }
                }
            })
            .map_err(|e| EngineError(format!("failed to spawn PTY reader thread: {e}")))?;

        Ok(NativeSession {
            master: Mutex::new(pair.master),
            writer: Mutex::new(writer),
            child: Mutex::new(child),
            killer: Mutex::new(killer),
            output_rx: Mutex::new(rx),
        })
    }

    fn poll_read(&self, session: &NativeSession) -> Result<ReadOutcome, EngineError> {
        let rx = session.output_rx.lock();
        let mut data = match rx.try_recv() {
            Ok(Ok(chunk)) => chunk,
            Ok(Err(e)) => return Err(EngineError(e.to_string())),
            Err(mpsc::TryRecvError::Empty) => return Ok(ReadOutcome::Pending),
            Err(mpsc::TryRecvError::Disconnected) => return Ok(ReadOutcome::End),
        };
        // Coalesce whatever else is already buffered into this tick's chunk.
        // A pending error is left in the channel for the next poll.
        while data.len() < READ_CHUNK {
            match rx.try_recv() {
                Ok(Ok(chunk)) => data.extend_from_slice(&chunk),
                Ok(Err(e)) => return Err(EngineError(e.to_string())),
                Err(_) => break,
            }
        }
        Ok(ReadOutcome::Data(data))
    }

    fn write(&self, session: &NativeSession, bytes: &[u8]) -> Result<(), EngineError> {
        let mut writer = session.writer.lock();
        writer
            .write_all(bytes)
            .and_then(|()| writer.flush())
            .map_err(|e| EngineError(e.to_string()))
    }

    fn get_size(&self, session: &NativeSession) -> Result<Size, EngineError> {
        session
            .master
            .lock()
            .get_size()
            .map(Size::from)
            .map_err(|e| EngineError(e.to_string()))
    }

    fn set_size(&self, session: &NativeSession, size: Size) -> Result<(), EngineError> {
        session
            .master
            .lock()
            .resize(size.into())
            .map_err(|e| EngineError(e.to_string()))
    }

    fn interrupt(&self, session: &NativeSession) {
        // Killing the child hangs up the slave, which fails a write that
        // is blocked on a full input queue.
        if let Err(e) = session.killer.lock().kill() {
            tracing::debug!("PTY interrupt kill error (may already be dead): {e}");
        }
    }

    fn close(&self, session: NativeSession) {
        let NativeSession {
            master,
            writer,
            child,
            killer: _,
            output_rx,
        } = session;
        drop(writer);

        let mut child = child.into_inner();
        if let Err(e) = child.kill() {
            tracing::debug!("PTY kill error (may already be dead): {e}");
        }
        if let Err(e) = child.wait() {
            tracing::debug!("PTY wait error: {e}");
        }

        // Dropping the master hangs up the reader thread, which then exits
        // on its own; it is not joined.
        drop(master);
        drop(output_rx);
    }
}

/// The master reports `EIO` once every slave descriptor is closed.
fn is_hangup(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        return true;
    }
    #[cfg(unix)]
    {
        err.raw_os_error() == Some(libc::EIO)
    }
    #[cfg(not(unix))]
    {
        false
    }
}
