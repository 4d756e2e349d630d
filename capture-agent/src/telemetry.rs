//! Telemetry feed: UDP listener and single consumer.
//!
//! The transport side is deliberately thin: one JSON wire message per
//! datagram, classified on arrival and pushed into a bounded queue. The
//! consumer is the only writer of the stability windows, which keeps the
//! stability logic testable without a live transport.

use capture_types::{TelemetryEvent, TelemetryMsg};
use telemetry_stability::StabilityMonitor;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::range_log::RangeEventLog;

/// Depth of the classified-message queue between listener and consumer.
pub const TELEMETRY_QUEUE_DEPTH: usize = 256;

/// Receive telemetry datagrams and forward classified messages.
///
/// Unparseable datagrams are dropped and logged; they never reach the
/// consumer and thus never count as window arrivals. Returns when the
/// consumer side is gone.
pub async fn telemetry_listener(
    socket: UdpSocket,
    tx: mpsc::Sender<TelemetryMsg>,
) -> eyre::Result<()> {
    info!(
        "telemetry listener on udp://{}",
        socket.local_addr()?
    );
    let mut buf = vec![0u8; 65536];
    loop {
        let (n, _peer) = socket.recv_from(&mut buf).await?;
        match serde_json::from_slice::<TelemetryMsg>(&buf[..n]) {
            Ok(msg) => {
                if tx.send(msg).await.is_err() {
                    // consumer gone; shut down quietly
                    return Ok(());
                }
            }
            Err(e) => {
                warn!("dropping malformed telemetry datagram: {e}");
            }
        }
    }
}

/// Drain the classified-message queue, routing samples into the stability
/// monitor and distance measurements into the ranging log.
pub async fn telemetry_consumer(
    mut rx: mpsc::Receiver<TelemetryMsg>,
    monitor: StabilityMonitor,
    mut range_log: RangeEventLog,
) {
    while let Some(msg) = rx.recv().await {
        for event in msg.events() {
            match event {
                TelemetryEvent::Sample(sample) => {
                    debug!("sample {}: {}", sample.channel, sample.value);
                    monitor.record(sample);
                }
                TelemetryEvent::DistanceMeasured(distance_m) => {
                    if let Err(e) = range_log.observe(distance_m) {
                        warn!("failed to record range event: {e}");
                    }
                }
            }
        }
    }
}

// tests below here ---------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range_log::SharedActiveSession;
    use std::sync::Arc;
    use telemetry_stability::{TelemetryTracker, PAN_TILT_WINDOW, ZOOM_WINDOW};

    #[tokio::test]
    async fn consumer_feeds_monitor_until_stable() {
        let monitor = StabilityMonitor::new(TelemetryTracker::new());
        let active: SharedActiveSession = Arc::new(std::sync::RwLock::new(None));
        let (tx, rx) = mpsc::channel(TELEMETRY_QUEUE_DEPTH);
        let consumer = tokio::spawn(telemetry_consumer(
            rx,
            monitor.clone(),
            RangeEventLog::new(active),
        ));

        for _ in 0..PAN_TILT_WINDOW {
            tx.send(TelemetryMsg::Orientation {
                pan_deg_x100: 1234,
                tilt_deg_x100: -567,
            })
            .await
            .unwrap();
        }
        for _ in 0..ZOOM_WINDOW {
            tx.send(TelemetryMsg::ZoomA { zoom_value: 4.0 }).await.unwrap();
            tx.send(TelemetryMsg::ZoomB {
                zoom_lens_state: capture_types::ZoomLensState { zoom_step: 7.0 },
            })
            .await
            .unwrap();
        }
        drop(tx);
        consumer.await.unwrap();

        assert!(monitor.is_stable());
    }

    #[tokio::test]
    async fn listener_drops_malformed_datagrams() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let (tx, mut rx) = mpsc::channel(TELEMETRY_QUEUE_DEPTH);
        tokio::spawn(telemetry_listener(socket, tx));

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"not json", addr).await.unwrap();
        sender
            .send_to(br#"{"wrong_field": 1}"#, addr)
            .await
            .unwrap();
        sender
            .send_to(br#"{"measured_distance_meters": 9.5}"#, addr)
            .await
            .unwrap();

        // only the well-formed message arrives
        let msg = rx.recv().await.unwrap();
        assert_eq!(
            msg,
            TelemetryMsg::Ranging {
                measured_distance_meters: 9.5
            }
        );
        assert!(rx.try_recv().is_err());
    }
}
