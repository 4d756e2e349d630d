//! Duration-bounded frame ingestion over the persistent capture stream.

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async_with_config;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use capture_types::{parse_frame_envelope, Frame, STREAM_ACK_TEXT};

use crate::session::CaptureSession;

/// Receive frames until the session deadline, acknowledging each.
///
/// Every per-iteration failure (malformed envelope, non-binary message,
/// transport hiccup) is logged and the loop continues. A connection that
/// cannot be established, or that drops mid-session, ends ingestion early
/// with whatever was buffered; an empty buffer is not a session failure.
pub async fn ingest_frames(
    url: &str,
    session: &CaptureSession,
    max_message_bytes: usize,
) -> Vec<Frame> {
    let config = WebSocketConfig {
        max_message_size: Some(max_message_bytes),
        ..Default::default()
    };
    let ws = match connect_async_with_config(url, Some(config), false).await {
        Ok((ws, _response)) => ws,
        Err(e) => {
            warn!("capture stream connect failed: {e}");
            return Vec::new();
        }
    };
    info!("capture stream connected to {url}");
    let (mut write, mut read) = ws.split();

    let deadline = session.deadline();
    let mut buffer: Vec<Frame> = Vec::new();
    loop {
        let msg = match tokio::time::timeout_at(deadline, read.next()).await {
            Err(_elapsed) => {
                info!("capture window elapsed");
                break;
            }
            Ok(None) => {
                warn!("capture stream closed by peer");
                break;
            }
            Ok(Some(Err(e))) => {
                warn!("capture stream receive error: {e}");
                continue;
            }
            Ok(Some(Ok(msg))) => msg,
        };
        let data = match msg {
            Message::Binary(data) => data,
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => {
                info!("capture stream sent close");
                break;
            }
            other => {
                debug!("ignoring non-binary capture stream message: {other:?}");
                continue;
            }
        };
        match parse_frame_envelope(&data) {
            Ok(frame) => {
                debug!(
                    "buffered {}x{} frame from {}",
                    frame.width, frame.height, frame.device_id
                );
                buffer.push(frame);
                if let Err(e) = write.send(Message::text(STREAM_ACK_TEXT)).await {
                    warn!("failed to acknowledge frame: {e}");
                }
            }
            Err(e) => {
                warn!("skipping malformed frame envelope: {e}");
            }
        }
    }
    if let Err(e) = write.close().await {
        debug!("capture stream close: {e}");
    }
    info!(
        "session {}: {} frame(s) buffered",
        session.session_id(),
        buffer.len()
    );
    buffer
}
