mod bridge;
mod engine;
mod error;
mod lifecycle;
mod native;
mod size;
mod spawn_spec;

pub use bridge::{
    normalize_input, BridgeConfig, OutputItem, PtyBridge, PtyInput, PtyOutput, Status,
    DEFAULT_OUTPUT_BUFFER, DEFAULT_POLL_INTERVAL,
};
pub use engine::{EngineError, PtyEngine, ReadOutcome};
pub use error::BridgeError;
pub use native::{NativeEngine, NativeSession, READ_CHUNK};
pub use size::{Size, DEFAULT_COLS, DEFAULT_ROWS};
pub use spawn_spec::SpawnSpec;
