//! Per-device-format frame decode, normalization, and persistence.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use image::ImageFormat;
use serde::Serialize;
use tracing::{debug, info, warn};

use capture_types::{DeviceFormat, DeviceId, Frame};

use crate::session::CaptureSession;

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("no pixel format configured for device {0}")]
    UnknownDevice(DeviceId),
    #[error(
        "payload of {actual} bytes does not match {width}x{height} {format:?} frame ({expected} bytes)"
    )]
    SizeMismatch {
        format: DeviceFormat,
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("{0}")]
    Image(#[from] image::ImageError),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

type Result<T> = std::result::Result<T, DecodeError>;

/// Device-id to pixel-format resolution, built once from configuration.
#[derive(Debug, Clone, Default)]
pub struct DeviceFormatMap(BTreeMap<String, DeviceFormat>);

impl DeviceFormatMap {
    pub fn new(map: BTreeMap<String, DeviceFormat>) -> Self {
        Self(map)
    }

    pub fn format_for(&self, device_id: &DeviceId) -> Option<DeviceFormat> {
        self.0.get(device_id.as_str()).copied()
    }
}

/// Intensity of the flat image emitted when a frame has no dynamic range.
pub const FLAT_FRAME_LEVEL: u8 = 128;

/// Linear min/max rescale to the full 0-255 range.
///
/// Min and max are taken over the whole frame. A flat input (`max == min`)
/// produces a mid-gray image rather than dividing by zero.
pub fn normalize_to_u8<T: Copy + Into<u32>>(input: &[T]) -> Vec<u8> {
    let mut min = u32::MAX;
    let mut max = u32::MIN;
    for v in input {
        let v = (*v).into();
        min = min.min(v);
        max = max.max(v);
    }
    if input.is_empty() {
        return Vec::new();
    }
    if min == max {
        return vec![FLAT_FRAME_LEVEL; input.len()];
    }
    let span = (max - min) as f64;
    input
        .iter()
        .map(|v| (((*v).into() - min) as f64 / span * 255.0).round() as u8)
        .collect()
}

fn check_size(frame: &Frame, format: DeviceFormat) -> Result<()> {
    // container payloads carry their own framing
    if let Some(expected) = frame.expected_len(format) {
        if frame.pixels.len() != expected {
            return Err(DecodeError::SizeMismatch {
                format,
                width: frame.width,
                height: frame.height,
                expected,
                actual: frame.pixels.len(),
            });
        }
    }
    Ok(())
}

fn save_gray(frame: &Frame, data: Vec<u8>, session: &CaptureSession) -> Result<PathBuf> {
    let image = image::GrayImage::from_raw(frame.width, frame.height, data).ok_or(
        DecodeError::SizeMismatch {
            format: DeviceFormat::Raw8,
            width: frame.width,
            height: frame.height,
            expected: frame.width as usize * frame.height as usize,
            actual: frame.pixels.len(),
        },
    )?;
    let path = session.artifact_path(&frame.device_id, "png");
    image.save_with_format(&path, ImageFormat::Png)?;
    Ok(path)
}

/// Decode one frame according to its device's pixel format and persist the
/// resulting artifact.
pub fn decode_frame(
    frame: &Frame,
    formats: &DeviceFormatMap,
    session: &CaptureSession,
) -> Result<PathBuf> {
    let format = formats
        .format_for(&frame.device_id)
        .ok_or_else(|| DecodeError::UnknownDevice(frame.device_id.clone()))?;
    check_size(frame, format)?;
    match format {
        DeviceFormat::Container => {
            let image = image::load_from_memory(&frame.pixels)?;
            let path = session.artifact_path(&frame.device_id, "jpg");
            image.save_with_format(&path, ImageFormat::Jpeg)?;
            Ok(path)
        }
        DeviceFormat::Raw8 => save_gray(frame, normalize_to_u8(&frame.pixels), session),
        DeviceFormat::Raw16 => {
            let samples: Vec<u16> = frame
                .pixels
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            save_gray(frame, normalize_to_u8(&samples), session)
        }
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct DecodeSummary {
    pub saved: usize,
    pub skipped: usize,
    pub devices: BTreeSet<DeviceId>,
}

/// Decode every buffered frame. Per-frame failures are logged and skipped;
/// nothing here aborts the batch.
pub fn process_buffer(
    frames: &[Frame],
    formats: &DeviceFormatMap,
    session: &CaptureSession,
) -> DecodeSummary {
    let mut summary = DecodeSummary::default();
    for frame in frames {
        match decode_frame(frame, formats, session) {
            Ok(path) => {
                debug!("image saved: {}", path.display());
                summary.saved += 1;
                summary.devices.insert(frame.device_id.clone());
            }
            Err(e) => {
                warn!("skipping frame from {}: {e}", frame.device_id);
                summary.skipped += 1;
            }
        }
    }
    info!(
        "session {}: saved {} frame(s) from {} device(s), skipped {}",
        session.session_id(),
        summary.saved,
        summary.devices.len(),
        summary.skipped
    );
    summary
}

// tests below here ---------------------
