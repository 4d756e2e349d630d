//! Capture session values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use capture_types::DeviceId;

/// Wall-clock stamp used for session identifiers and ranging artifacts.
pub fn second_stamp(now: chrono::DateTime<chrono::Local>) -> String {
    now.format("%Y-%m-%d_%H-%M-%S").to_string()
}

/// Millisecond wall-clock stamp used for image artifact file names.
pub fn artifact_stamp(now: chrono::DateTime<chrono::Local>) -> String {
    now.format("%Y-%m-%d_%H-%M-%S_%3f").to_string()
}

/// One time-bounded capture run.
///
/// Constructed once per trigger and immutable for its lifetime; all
/// ingestion and decoding state is threaded through this value rather than
/// held globally. At most one session is active at a time (the trigger
/// path serializes construction behind a lock).
#[derive(Debug, Clone)]
pub struct CaptureSession {
    session_id: String,
    device_ids: Vec<DeviceId>,
    session_dir: PathBuf,
    deadline: tokio::time::Instant,
}

impl CaptureSession {
    /// Describe a new session starting now.
    ///
    /// The session identifier is derived from the trigger time; the
    /// deadline is the trigger time plus the requested duration.
    pub fn new(base_dir: &Path, device_ids: Vec<DeviceId>, duration: Duration) -> Self {
        let session_id = second_stamp(chrono::Local::now());
        let session_dir = base_dir.join(&session_id);
        Self {
            session_id,
            device_ids,
            session_dir,
            deadline: tokio::time::Instant::now() + duration,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn device_ids(&self) -> &[DeviceId] {
        &self.device_ids
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    pub fn device_dir(&self, device_id: &DeviceId) -> PathBuf {
        self.session_dir.join(device_id.as_str())
    }

    pub fn deadline(&self) -> tokio::time::Instant {
        self.deadline
    }

    /// Create the session directory tree, one subdirectory per device.
    pub fn prepare_dirs(&self) -> std::io::Result<()> {
        for device_id in &self.device_ids {
            std::fs::create_dir_all(self.device_dir(device_id))?;
        }
        Ok(())
    }

    /// Artifact path for one decoded frame of `device_id`, stamped with the
    /// current wall-clock time.
    pub fn artifact_path(&self, device_id: &DeviceId, ext: &str) -> PathBuf {
        let stamp = artifact_stamp(chrono::Local::now());
        self.device_dir(device_id).join(format!("{stamp}.{ext}"))
    }
}

// tests below here ---------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_paths_and_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let devices = vec![
            DeviceId::new("cameradevice_rgb_1"),
            DeviceId::new("cameradevice_swir_1"),
        ];
        let session =
            CaptureSession::new(dir.path(), devices.clone(), Duration::from_secs(2));
        session.prepare_dirs().unwrap();

        for device in &devices {
            let ddir = session.device_dir(device);
            assert!(ddir.is_dir());
            assert!(ddir.starts_with(dir.path().join(session.session_id())));
        }

        let path = session.artifact_path(&devices[0], "png");
        assert_eq!(path.parent().unwrap(), session.device_dir(&devices[0]));
        assert_eq!(path.extension().unwrap(), "png");
    }

    #[test]
    fn stamps_are_path_safe() {
        let now = chrono::Local::now();
        for stamp in [second_stamp(now), artifact_stamp(now)] {
            assert!(!stamp.contains(['/', '\\', ':', ' ']));
        }
    }
}
