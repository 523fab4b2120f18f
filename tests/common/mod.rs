//! Shared test utilities and mock infrastructure.

#![allow(dead_code, unused_imports)]

pub mod mock_engine;

use std::sync::Arc;
use std::time::Duration;

use ptystream::pty::{BridgeConfig, OutputItem, PtyBridge, PtyEngine, PtyOutput, SpawnSpec, Status};

pub use mock_engine::MockEngine;

/// Poll fast so tests do not wait on the 50ms default.
pub fn fast_config() -> BridgeConfig {
    BridgeConfig {
        poll_interval: Duration::from_millis(5),
        output_buffer: 8,
    }
}

pub fn mock_bridge(engine: &Arc<MockEngine>) -> PtyBridge<MockEngine> {
    PtyBridge::with_engine(Arc::clone(engine), &SpawnSpec::new("mock"), fast_config())
        .expect("mock bridge should start")
}

/// Drain the stream until it ends. Panics if it does not end in time.
pub async fn collect_all(output: &mut PtyOutput, timeout: Duration) -> Vec<OutputItem> {
    tokio::time::timeout(timeout, async {
        let mut items = Vec::new();
        while let Some(item) = output.next_chunk().await {
            items.push(item);
        }
        items
    })
    .await
    .expect("output stream should end")
}

/// Read until the accumulated text contains `needle`.
pub async fn read_until(output: &mut PtyOutput, needle: &str, timeout: Duration) -> Option<String> {
    let mut seen = String::new();
    let found = tokio::time::timeout(timeout, async {
        while let Some(item) = output.next_chunk().await {
            let Ok(chunk) = item else {
                return false;
            };
            seen.push_str(&String::from_utf8_lossy(&chunk));
            if seen.contains(needle) {
                return true;
            }
        }
        false
    })
    .await
    .unwrap_or(false);
    found.then_some(seen)
}

/// Wait until the bridge reports stopped.
pub async fn wait_stopped<E: PtyEngine>(bridge: &PtyBridge<E>, timeout: Duration) {
    tokio::time::timeout(timeout, async {
        while bridge.status() != Status::Stopped {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("bridge should stop");
}

/// Poll `check` until it holds. Panics if it does not hold in time.
pub async fn wait_until(mut check: impl FnMut() -> bool, timeout: Duration) {
    tokio::time::timeout(timeout, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition should hold");
}
