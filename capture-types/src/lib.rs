//! Shared wire and data types for the telemetry-gated capture agent.

use serde::{Deserialize, Serialize};

mod envelope;
pub use envelope::{encode_frame_envelope, parse_frame_envelope, EnvelopeError};

/// Fixed acknowledgment text sent back over the capture stream after each
/// consumed message.
pub const STREAM_ACK_TEXT: &str = "received";

/// A camera device identifier as it appears on the wire and in output paths.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new<S: Into<String>>(s: S) -> Self {
        DeviceId(s.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Pixel encoding of the frames a device emits.
///
/// Resolved once per device identifier from configuration; decode dispatch
/// happens on this closed enum, never on raw identifier strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceFormat {
    /// Payload is a complete compressed image container (e.g. JPEG bytes).
    Container,
    /// Payload is `width * height` one-byte samples.
    Raw8,
    /// Payload is `width * height` two-byte little-endian samples.
    Raw16,
}

impl DeviceFormat {
    /// Bytes per pixel sample, or `None` for container payloads whose size
    /// is not derivable from the frame dimensions.
    pub fn bytes_per_sample(&self) -> Option<usize> {
        match self {
            DeviceFormat::Container => None,
            DeviceFormat::Raw8 => Some(1),
            DeviceFormat::Raw16 => Some(2),
        }
    }
}

/// A telemetry channel tracked by a rolling stability window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Pan,
    Tilt,
    ZoomA,
    ZoomB,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Channel::Pan => "pan",
            Channel::Tilt => "tilt",
            Channel::ZoomA => "zoom-a",
            Channel::ZoomB => "zoom-b",
        };
        f.write_str(name)
    }
}

/// One classified scalar telemetry sample. Arrival order is queue order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub channel: Channel,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoomLensState {
    pub zoom_step: f64,
}

/// Raw telemetry wire messages.
///
/// The four message kinds are structurally independent and arrive in no
/// particular cross-channel order; classification is by shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TelemetryMsg {
    /// Orientation report. Values are degrees x 100.
    Orientation {
        pan_deg_x100: i64,
        tilt_deg_x100: i64,
    },
    /// Zoom report of the stepper-lens camera.
    ZoomB { zoom_lens_state: ZoomLensState },
    /// Ranging sensor report.
    Ranging { measured_distance_meters: f64 },
    /// Zoom report of the motorized-zoom camera.
    ZoomA { zoom_value: f64 },
}

/// Consumer-side event produced from one classified wire message.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    Sample(TelemetrySample),
    DistanceMeasured(f64),
}

impl TelemetryMsg {
    /// Expand one wire message into its consumer events.
    ///
    /// An orientation message carries both the pan and tilt channels and
    /// therefore yields two samples.
    pub fn events(&self) -> Vec<TelemetryEvent> {
        match self {
            TelemetryMsg::Orientation {
                pan_deg_x100,
                tilt_deg_x100,
            } => vec![
                TelemetryEvent::Sample(TelemetrySample {
                    channel: Channel::Pan,
                    value: *pan_deg_x100 as f64 / 100.0,
                }),
                TelemetryEvent::Sample(TelemetrySample {
                    channel: Channel::Tilt,
                    value: *tilt_deg_x100 as f64 / 100.0,
                }),
            ],
            TelemetryMsg::ZoomA { zoom_value } => vec![TelemetryEvent::Sample(TelemetrySample {
                channel: Channel::ZoomA,
                value: *zoom_value,
            })],
            TelemetryMsg::ZoomB { zoom_lens_state } => {
                vec![TelemetryEvent::Sample(TelemetrySample {
                    channel: Channel::ZoomB,
                    value: zoom_lens_state.zoom_step,
                })]
            }
            TelemetryMsg::Ranging {
                measured_distance_meters,
            } => vec![TelemetryEvent::DistanceMeasured(*measured_distance_meters)],
        }
    }
}

/// One captured frame awaiting decode.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub device_id: DeviceId,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Frame {
    /// Expected payload length in bytes for a raw pixel format.
    pub fn expected_len(&self, format: DeviceFormat) -> Option<usize> {
        format
            .bytes_per_sample()
            .map(|b| self.width as usize * self.height as usize * b)
    }
}

// tests below here ---------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_orientation() {
        let msg: TelemetryMsg =
            serde_json::from_str(r#"{"pan_deg_x100": 1234, "tilt_deg_x100": -567}"#).unwrap();
        let events = msg.events();
        assert_eq!(
            events,
            vec![
                TelemetryEvent::Sample(TelemetrySample {
                    channel: Channel::Pan,
                    value: 12.34,
                }),
                TelemetryEvent::Sample(TelemetrySample {
                    channel: Channel::Tilt,
                    value: -5.67,
                }),
            ]
        );
    }

    #[test]
    fn classify_ranging_and_zooms() {
        let msg: TelemetryMsg =
            serde_json::from_str(r#"{"measured_distance_meters": 152.5}"#).unwrap();
        assert_eq!(msg.events(), vec![TelemetryEvent::DistanceMeasured(152.5)]);

        let msg: TelemetryMsg = serde_json::from_str(r#"{"zoom_value": 4.0}"#).unwrap();
        assert_eq!(
            msg.events(),
            vec![TelemetryEvent::Sample(TelemetrySample {
                channel: Channel::ZoomA,
                value: 4.0,
            })]
        );

        let msg: TelemetryMsg =
            serde_json::from_str(r#"{"zoom_lens_state": {"zoom_step": 7.0}}"#).unwrap();
        assert_eq!(
            msg.events(),
            vec![TelemetryEvent::Sample(TelemetrySample {
                channel: Channel::ZoomB,
                value: 7.0,
            })]
        );
    }

    #[test]
    fn malformed_telemetry_rejected() {
        // missing field
        assert!(serde_json::from_str::<TelemetryMsg>(r#"{"pan_deg_x100": 1}"#).is_err());
        // wrong shape entirely
        assert!(serde_json::from_str::<TelemetryMsg>(r#"[1, 2, 3]"#).is_err());
        assert!(serde_json::from_str::<TelemetryMsg>("not json").is_err());
    }

    #[test]
    fn expected_len_by_format() {
        let frame = Frame {
            device_id: DeviceId::new("cameradevice_swir_1"),
            width: 4,
            height: 3,
            pixels: vec![0; 12],
        };
        assert_eq!(frame.expected_len(DeviceFormat::Raw8), Some(12));
        assert_eq!(frame.expected_len(DeviceFormat::Raw16), Some(24));
        assert_eq!(frame.expected_len(DeviceFormat::Container), None);
    }
}
