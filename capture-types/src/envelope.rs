//! Binary frame-envelope encode and parse.
//!
//! Inbound capture stream messages are CBOR-encoded nested sequences and
//! mappings of the shape
//! `[ { camera_frames: [ { device_id, image_data: { pixels, width, height } }, .. ] }, .. ]`.
//! Only the first element of the outer sequence and the first element of its
//! `camera_frames` sequence are consumed.

use std::collections::BTreeMap;

use serde_cbor::Value;

use crate::{DeviceId, Frame};

#[derive(thiserror::Error, Debug)]
pub enum EnvelopeError {
    #[error("CBOR error: {0}")]
    Cbor(#[from] serde_cbor::Error),
    #[error("envelope shape: {0}")]
    Shape(&'static str),
}

fn as_array(value: Value, what: &'static str) -> Result<Vec<Value>, EnvelopeError> {
    match value {
        Value::Array(items) => Ok(items),
        _ => Err(EnvelopeError::Shape(what)),
    }
}

fn as_map(value: Value, what: &'static str) -> Result<BTreeMap<Value, Value>, EnvelopeError> {
    match value {
        Value::Map(map) => Ok(map),
        _ => Err(EnvelopeError::Shape(what)),
    }
}

fn take_key(
    map: &mut BTreeMap<Value, Value>,
    key: &'static str,
) -> Result<Value, EnvelopeError> {
    map.remove(&Value::Text(key.to_string()))
        .ok_or(EnvelopeError::Shape(key))
}

fn as_dim(value: Value, what: &'static str) -> Result<u32, EnvelopeError> {
    match value {
        Value::Integer(i) => u32::try_from(i).map_err(|_| EnvelopeError::Shape(what)),
        _ => Err(EnvelopeError::Shape(what)),
    }
}

/// Unwrap one capture stream message into the single frame it carries.
pub fn parse_frame_envelope(buf: &[u8]) -> Result<Frame, EnvelopeError> {
    let value: Value = serde_cbor::from_slice(buf)?;
    let outer = as_array(value, "outer value is not a sequence")?;
    let entry = outer
        .into_iter()
        .next()
        .ok_or(EnvelopeError::Shape("outer sequence is empty"))?;
    let mut entry = as_map(entry, "envelope entry is not a mapping")?;

    let frames = as_array(
        take_key(&mut entry, "camera_frames")?,
        "camera_frames is not a sequence",
    )?;
    let frame = frames
        .into_iter()
        .next()
        .ok_or(EnvelopeError::Shape("camera_frames is empty"))?;
    let mut frame = as_map(frame, "camera frame is not a mapping")?;

    let device_id = match take_key(&mut frame, "device_id")? {
        Value::Text(s) => DeviceId::new(s),
        _ => return Err(EnvelopeError::Shape("device_id is not text")),
    };
    let mut image_data = as_map(
        take_key(&mut frame, "image_data")?,
        "image_data is not a mapping",
    )?;
    let pixels = match take_key(&mut image_data, "pixels")? {
        Value::Bytes(b) => b,
        _ => return Err(EnvelopeError::Shape("pixels is not a byte string")),
    };
    let width = as_dim(take_key(&mut image_data, "width")?, "width")?;
    let height = as_dim(take_key(&mut image_data, "height")?, "height")?;

    Ok(Frame {
        device_id,
        width,
        height,
        pixels,
    })
}

/// Build the wire form of a single-frame envelope.
///
/// Counterpart of [`parse_frame_envelope`]; used by mock capture sources and
/// tests.
pub fn encode_frame_envelope(frame: &Frame) -> Vec<u8> {
    let mut image_data = BTreeMap::new();
    image_data.insert(
        Value::Text("pixels".to_string()),
        Value::Bytes(frame.pixels.clone()),
    );
    image_data.insert(
        Value::Text("width".to_string()),
        Value::Integer(frame.width.into()),
    );
    image_data.insert(
        Value::Text("height".to_string()),
        Value::Integer(frame.height.into()),
    );

    let mut camera_frame = BTreeMap::new();
    camera_frame.insert(
        Value::Text("device_id".to_string()),
        Value::Text(frame.device_id.as_str().to_string()),
    );
    camera_frame.insert(
        Value::Text("image_data".to_string()),
        Value::Map(image_data),
    );

    let mut entry = BTreeMap::new();
    entry.insert(
        Value::Text("camera_frames".to_string()),
        Value::Array(vec![Value::Map(camera_frame)]),
    );

    let envelope = Value::Array(vec![Value::Map(entry)]);
    // Serializing a fully-constructed Value cannot fail.
    serde_cbor::to_vec(&envelope).unwrap()
}

// tests below here ---------------------
