//! Ingestion loop behavior against a mock capture stream.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use capture_agent::ingest::ingest_frames;
use capture_agent::session::CaptureSession;
use capture_types::{encode_frame_envelope, DeviceId, Frame, STREAM_ACK_TEXT};

fn test_frame(tag: u8) -> Frame {
    Frame {
        device_id: DeviceId::new("cameradevice_swir_1"),
        width: 4,
        height: 2,
        pixels: vec![tag; 8],
    }
}

/// Spawn a WebSocket server that emits `messages` on a fixed period and
/// counts acknowledgment texts.
async fn spawn_mock_stream(
    period: Duration,
    messages: Vec<Vec<u8>>,
    repeat_last: bool,
) -> (String, Arc<AtomicUsize>, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let acks = Arc::new(AtomicUsize::new(0));

    let server = {
        let acks = acks.clone();
        tokio::spawn(async move {
            let (stream, _peer) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let (mut write, mut read) = ws.split();

            let reader = {
                let acks = acks.clone();
                tokio::spawn(async move {
                    while let Some(Ok(msg)) = read.next().await {
                        if let Message::Text(text) = msg {
                            if text.as_str() == STREAM_ACK_TEXT {
                                acks.fetch_add(1, Ordering::SeqCst);
                            }
                        }
                    }
                })
            };

            let mut interval = tokio::time::interval(period);
            let mut queue = messages.into_iter();
            let mut last: Option<Vec<u8>> = None;
            loop {
                interval.tick().await;
                let msg = match queue.next() {
                    Some(m) => {
                        last = Some(m.clone());
                        m
                    }
                    None if repeat_last => match &last {
                        Some(m) => m.clone(),
                        None => break,
                    },
                    None => break,
                };
                if write.send(Message::binary(msg)).await.is_err() {
                    break;
                }
            }
            // message list exhausted: close the stream from the server side
            let _ = write.close().await;
            let _ = reader.await;
        })
    };
    (url, acks, server)
}

#[tokio::test]
async fn deadline_bounds_frame_count_and_each_frame_is_acked() {
    // One valid frame per 500ms against a ~2s deadline: exactly 4 frames.
    let envelope = encode_frame_envelope(&test_frame(7));
    let (url, acks, server) =
        spawn_mock_stream(Duration::from_millis(500), vec![envelope], true).await;

    let dir = tempfile::tempdir().unwrap();
    let session = CaptureSession::new(dir.path(), vec![], Duration::from_millis(1800));
    let frames = ingest_frames(&url, &session, 1024 * 1024).await;

    assert_eq!(frames.len(), 4);
    for frame in &frames {
        assert_eq!(frame, &test_frame(7));
    }

    // let the server drain the final acknowledgment
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(acks.load(Ordering::SeqCst), 4);
    server.abort();
}

#[tokio::test]
async fn malformed_envelope_skipped_without_aborting() {
    let messages = vec![
        b"definitely not cbor".to_vec(),
        encode_frame_envelope(&test_frame(1)),
        encode_frame_envelope(&test_frame(2)),
    ];
    let (url, acks, server) =
        spawn_mock_stream(Duration::from_millis(50), messages, false).await;

    let dir = tempfile::tempdir().unwrap();
    let session = CaptureSession::new(dir.path(), vec![], Duration::from_millis(600));
    let frames = ingest_frames(&url, &session, 1024 * 1024).await;

    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0], test_frame(1));
    assert_eq!(frames[1], test_frame(2));

    tokio::time::sleep(Duration::from_millis(100)).await;
    // only consumed frames are acknowledged
    assert_eq!(acks.load(Ordering::SeqCst), 2);
    server.abort();
}

#[tokio::test]
async fn connect_failure_is_not_a_session_failure() {
    let dir = tempfile::tempdir().unwrap();
    let session = CaptureSession::new(dir.path(), vec![], Duration::from_millis(200));
    // nothing listens on this port
    let frames = ingest_frames("ws://127.0.0.1:9", &session, 1024).await;
    assert!(frames.is_empty());
}

#[tokio::test]
async fn peer_close_returns_partial_buffer() {
    let messages = vec![encode_frame_envelope(&test_frame(3))];
    let (url, _acks, server) =
        spawn_mock_stream(Duration::from_millis(10), messages, false).await;

    let dir = tempfile::tempdir().unwrap();
    // deadline far in the future; the server sends one frame then closes
    let session = CaptureSession::new(dir.path(), vec![], Duration::from_secs(30));
    let frames = ingest_frames(&url, &session, 1024 * 1024).await;

    assert_eq!(frames.len(), 1);
    server.abort();
}
