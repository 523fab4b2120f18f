//! Input path: line-break normalization, ordering and write faults.

mod common;

use std::time::Duration;

use common::*;
use ptystream::pty::{BridgeError, Status};

#[tokio::test]
async fn empty_chunk_never_reaches_engine() {
    let engine = MockEngine::new();
    let bridge = mock_bridge(&engine);

    assert_eq!(bridge.input().write(b"").await, Ok(()));
    assert_eq!(engine.write_calls(), 0);
}

#[tokio::test]
async fn bare_line_break_is_sent_as_crlf() {
    let engine = MockEngine::new();
    let bridge = mock_bridge(&engine);
    let input = bridge.input();

    for chunk in [&b"\r"[..], b"\n", b"\n\r", b"\rignored tail"] {
        input.write(chunk).await.unwrap();
    }

    assert_eq!(engine.writes(), vec![b"\r\n".to_vec(); 4]);
    assert!(!input.is_closed());
}

#[tokio::test]
async fn other_chunks_are_forwarded_verbatim() {
    let engine = MockEngine::new();
    let bridge = mock_bridge(&engine);
    let input = bridge.input();

    input.write(b"5+4\n\r").await.unwrap();
    input.write(b"\x1b[A").await.unwrap();
    input.write(b" \r").await.unwrap();

    assert_eq!(
        engine.writes(),
        vec![b"5+4\n\r".to_vec(), b"\x1b[A".to_vec(), b" \r".to_vec()]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_do_not_overlap() {
    let engine = MockEngine::new();
    let bridge = mock_bridge(&engine);

    let mut tasks = Vec::new();
    for writer in 0..4u8 {
        let input = bridge.input();
        tasks.push(tokio::spawn(async move {
            for i in 0..10u8 {
                input.write(&[b'a' + writer, b'0' + i]).await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let writes = engine.writes();
    assert_eq!(writes.len(), 40);
    // Each writer's chunks stay in its own submission order.
    for writer in 0..4u8 {
        let seen: Vec<u8> = writes
            .iter()
            .filter(|w| w[0] == b'a' + writer)
            .map(|w| w[1])
            .collect();
        assert_eq!(seen, (0..10u8).map(|i| b'0' + i).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn sequential_writes_arrive_in_order() {
    let engine = MockEngine::new();
    let bridge = mock_bridge(&engine);

    bridge.write(b"a=4; ").await.unwrap();
    bridge.write(b"echo $((a + a))").await.unwrap();
    bridge.write(b"\n").await.unwrap();

    assert_eq!(
        engine.writes(),
        vec![b"a=4; ".to_vec(), b"echo $((a + a))".to_vec(), b"\r\n".to_vec()]
    );
}

#[tokio::test]
async fn write_failure_is_returned_and_delivered_on_output() {
    let engine = MockEngine::new();
    engine.fail_writes("write: Broken pipe");
    let mut bridge = mock_bridge(&engine);
    let mut output = bridge.take_output().unwrap();
    let input = bridge.input();

    let fault = BridgeError::Session("write: Broken pipe".to_string());
    assert_eq!(input.write(b"ls\n").await, Err(fault.clone()));

    assert_eq!(bridge.status(), Status::Stopped);
    assert!(input.is_closed());
    assert_eq!(engine.closes(), 1);

    let items = collect_all(&mut output, Duration::from_secs(2)).await;
    assert_eq!(items, vec![Err(fault)]);

    assert_eq!(input.write(b"ls\n").await, Err(BridgeError::NotRunning));
    assert_eq!(engine.write_calls(), 1);
}
