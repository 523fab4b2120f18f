//! Scripted engine for exercising the bridge without a real PTY.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use ptystream::pty::{EngineError, PtyEngine, ReadOutcome, Size, SpawnSpec};

#[derive(Default)]
struct MockState {
    creates: usize,
    reads: VecDeque<Result<ReadOutcome, EngineError>>,
    polls: usize,
    write_calls: usize,
    writes: Vec<Vec<u8>>,
    write_error: Option<String>,
    writes_blocked: bool,
    interrupted: bool,
    interrupts: usize,
    size: Size,
    size_calls: usize,
    size_error: Option<String>,
    closes: usize,
    spawned: Vec<SpawnSpec>,
}

/// Engine whose reads are scripted and whose calls are recorded.
///
/// Reads are served from a queue; an empty queue polls as `Pending`.
/// Writes can be made to block until the session is interrupted, which
/// stands in for a child that stopped reading its input.
pub struct MockEngine {
    create_error: Option<String>,
    state: Mutex<MockState>,
    unblocked: Condvar,
}

pub struct MockHandle {
    pub spec: SpawnSpec,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            create_error: None,
            state: Mutex::new(MockState::default()),
            unblocked: Condvar::new(),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            create_error: Some(message.to_string()),
            state: Mutex::new(MockState::default()),
            unblocked: Condvar::new(),
        })
    }

    pub fn push_data(&self, bytes: &[u8]) {
        self.state
            .lock()
            .reads
            .push_back(Ok(ReadOutcome::Data(bytes.to_vec())));
    }

    pub fn push_end(&self) {
        self.state.lock().reads.push_back(Ok(ReadOutcome::End));
    }

    pub fn push_read_error(&self, message: &str) {
        self.state
            .lock()
            .reads
            .push_back(Err(EngineError::new(message)));
    }

    pub fn fail_writes(&self, message: &str) {
        self.state.lock().write_error = Some(message.to_string());
    }

    /// Park every write until `interrupt` is called.
    pub fn block_writes(&self) {
        self.state.lock().writes_blocked = true;
    }

    pub fn interrupts(&self) -> usize {
        self.state.lock().interrupts
    }

    pub fn fail_size(&self, message: &str) {
        self.state.lock().size_error = Some(message.to_string());
    }

    pub fn creates(&self) -> usize {
        self.state.lock().creates
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().writes.clone()
    }

    pub fn write_calls(&self) -> usize {
        self.state.lock().write_calls
    }

    pub fn size_calls(&self) -> usize {
        self.state.lock().size_calls
    }

    pub fn closes(&self) -> usize {
        self.state.lock().closes
    }

    pub fn spawned(&self) -> Vec<SpawnSpec> {
        self.state.lock().spawned.clone()
    }
}

impl PtyEngine for MockEngine {
    type Handle = MockHandle;

    fn create(&self, spec: &SpawnSpec) -> Result<MockHandle, EngineError> {
        if let Some(message) = &self.create_error {
            return Err(EngineError::new(message.clone()));
        }
        let mut state = self.state.lock();
        state.creates += 1;
        state.spawned.push(spec.clone());
        Ok(MockHandle { spec: spec.clone() })
    }

    fn poll_read(&self, _handle: &MockHandle) -> Result<ReadOutcome, EngineError> {
        let mut state = self.state.lock();
        state.polls += 1;
        state.reads.pop_front().unwrap_or(Ok(ReadOutcome::Pending))
    }

    fn write(&self, _handle: &MockHandle, bytes: &[u8]) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        state.write_calls += 1;
        while state.writes_blocked && !state.interrupted {
            self.unblocked.wait(&mut state);
        }
        if state.writes_blocked {
            return Err(EngineError::new("write: Input/output error"));
        }
        if let Some(message) = &state.write_error {
            return Err(EngineError::new(message.clone()));
        }
        state.writes.push(bytes.to_vec());
        Ok(())
    }

    fn get_size(&self, _handle: &MockHandle) -> Result<Size, EngineError> {
        let mut state = self.state.lock();
        state.size_calls += 1;
        match &state.size_error {
            Some(message) => Err(EngineError::new(message.clone())),
            None => Ok(state.size),
        }
    }

    fn set_size(&self, _handle: &MockHandle, size: Size) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        state.size_calls += 1;
        if let Some(message) = &state.size_error {
            return Err(EngineError::new(message.clone()));
        }
        state.size = size;
        Ok(())
    }

    fn interrupt(&self, _handle: &MockHandle) {
        let mut state = self.state.lock();
        state.interrupts += 1;
        state.interrupted = true;
        self.unblocked.notify_all();
    }

    fn close(&self, _handle: MockHandle) {
        self.state.lock().closes += 1;
    }
}
