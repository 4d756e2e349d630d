//! Ranging-distance change artifacts.

use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use crate::session::{second_stamp, CaptureSession};

/// The currently active capture session, if any. Written only by the
/// trigger path; read by the telemetry consumer.
pub type SharedActiveSession = Arc<RwLock<Option<CaptureSession>>>;

/// Latches the last observed ranging distance and writes one text artifact
/// per session device on each distinct positive change.
pub struct RangeEventLog {
    previous_distance_m: Option<f64>,
    active_session: SharedActiveSession,
}

impl RangeEventLog {
    pub fn new(active_session: SharedActiveSession) -> Self {
        Self {
            previous_distance_m: None,
            active_session,
        }
    }

    /// Handle one ranging measurement.
    ///
    /// Non-positive values and repeats of the previous value are ignored.
    /// Without an active session the change is logged but no file is
    /// written; the latch still updates and persists across sessions.
    pub fn observe(&mut self, distance_m: f64) -> std::io::Result<()> {
        if !(distance_m > 0.0) {
            return Ok(());
        }
        if self.previous_distance_m == Some(distance_m) {
            return Ok(());
        }
        info!("distance changed to: {distance_m}");

        let session = self.active_session.read().unwrap().clone();
        if let Some(session) = session {
            let stamp = second_stamp(chrono::Local::now());
            for device_id in session.device_ids() {
                let path = session
                    .device_dir(device_id)
                    .join(format!("{stamp}_{distance_m}.txt"));
                std::fs::write(&path, format!("Measured distance: {distance_m} meters"))?;
                debug!("range artifact saved for {device_id}: {}", path.display());
            }
        }
        self.previous_distance_m = Some(distance_m);
        Ok(())
    }
}

// tests below here ---------------------
