//! HTTP trigger API.
//!
//! `POST /process-requests` forwards each command to the remote invoke
//! endpoint and, for commands requesting a capture duration, runs the
//! gated capture flow: session setup, stability wait, ingestion, decode.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use capture_types::DeviceId;
use telemetry_stability::StabilityMonitor;

use crate::config::AgentConfig;
use crate::decode;
use crate::history;
use crate::ingest;
use crate::range_log::SharedActiveSession;
use crate::session::CaptureSession;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AgentConfig>,
    pub monitor: StabilityMonitor,
    pub active_session: SharedActiveSession,
    session_lock: Arc<tokio::sync::Mutex<()>>,
    http_client: reqwest::Client,
    formats: Arc<decode::DeviceFormatMap>,
}

impl AppState {
    pub fn new(
        config: AgentConfig,
        monitor: StabilityMonitor,
        active_session: SharedActiveSession,
    ) -> Self {
        let formats = Arc::new(decode::DeviceFormatMap::new(config.device_formats.clone()));
        Self {
            config: Arc::new(config),
            monitor,
            active_session,
            session_lock: Arc::new(tokio::sync::Mutex::new(())),
            http_client: reqwest::Client::new(),
            formats,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/process-requests", post(process_requests))
        .with_state(state)
}

/// One trigger command as submitted by the upstream caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command_id: String,
    #[serde(default)]
    pub args: CommandArgs,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandArgs {
    /// Capture window length; zero means the command does not capture.
    #[serde(default)]
    pub duration_second: f64,
    /// Devices participating in the capture.
    #[serde(default)]
    pub camera_ids: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

async fn process_requests(
    State(state): State<AppState>,
    Json(incoming): Json<Value>,
) -> Response {
    let Some(requests) = incoming.get("requests").and_then(Value::as_array) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "'requests' key is required in the incoming data"})),
        )
            .into_response();
    };

    let mut results = Vec::with_capacity(requests.len());
    for raw in requests {
        if let Err(e) = history::append_to_history(&state.config.history_fname, raw) {
            warn!("failed to append request history: {e}");
        }

        let mut result = json!({ "request": raw });
        match forward_request(&state.http_client, &state.config.invoke_url, raw).await {
            Ok((status_code, response_body)) => {
                result["response"] = response_body;
                result["status_code"] = status_code.into();

                match serde_json::from_value::<CommandRequest>(raw.clone()) {
                    Ok(request) => {
                        info!("command {} forwarded", request.command_id);
                        if request.args.duration_second > 0.0 {
                            let capture = match run_capture(&state, &request).await {
                                Ok(v) => v,
                                Err(e) => {
                                    warn!("capture failed: {e:#}");
                                    json!({"captured": false, "error": e.to_string()})
                                }
                            };
                            result["capture"] = capture;
                        }
                    }
                    Err(e) => {
                        warn!("request is not a runnable command: {e}");
                    }
                }
            }
            Err(e) => {
                warn!("forwarding to invoke endpoint failed: {e}");
                result["error"] = Value::String(e.to_string());
            }
        }
        results.push(result);
    }

    Json(json!({"message": "Requests processed", "results": results})).into_response()
}

/// Forward one raw request body to the remote invoke endpoint.
///
/// A `204` or empty body is reported as "No Content"; a non-JSON body is
/// passed through raw.
async fn forward_request(
    client: &reqwest::Client,
    invoke_url: &str,
    request: &Value,
) -> Result<(u16, Value), reqwest::Error> {
    let response = client.post(invoke_url).json(request).send().await?;
    let status_code = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let body = if status_code == 204 || text.trim().is_empty() {
        json!({"message": "No Content", "status_code": 204})
    } else {
        serde_json::from_str(&text)
            .unwrap_or_else(|_| json!({"error": "Invalid JSON response", "raw_response": text}))
    };
    Ok((status_code, body))
}

/// Run one gated capture for a command requesting a positive duration.
///
/// Sessions are serialized: a concurrent trigger waits here until the
/// previous session has fully completed.
async fn run_capture(state: &AppState, request: &CommandRequest) -> eyre::Result<Value> {
    let _guard = state.session_lock.lock().await;

    let device_ids: Vec<DeviceId> = request
        .args
        .camera_ids
        .iter()
        .map(|id| DeviceId::new(id.as_str()))
        .collect();
    let duration = Duration::from_secs_f64(request.args.duration_second);
    let session = CaptureSession::new(&state.config.output_base_dirname, device_ids, duration);
    info!(
        "session {} started for {} device(s)",
        session.session_id(),
        session.device_ids().len()
    );
    session.prepare_dirs()?;

    *state.active_session.write().unwrap() = Some(session.clone());
    let outcome = capture_and_decode(state, &session, request).await;
    *state.active_session.write().unwrap() = None;
    outcome
}

async fn capture_and_decode(
    state: &AppState,
    session: &CaptureSession,
    request: &CommandRequest,
) -> eyre::Result<Value> {
    let poll_interval = state.config.stability_poll_interval();
    let timeout = state.config.stability_timeout();
    if let Err(e) = state.monitor.wait_for_stability(poll_interval, timeout).await {
        warn!("session {}: {e}", session.session_id());
        return Ok(json!({
            "captured": false,
            "session_id": session.session_id(),
            "error": e.to_string(),
        }));
    }
    info!("all telemetry channels stable");

    let frames = ingest::ingest_frames(
        &state.config.capture_stream_url,
        session,
        state.config.max_frame_message_bytes,
    )
    .await;
    let summary = decode::process_buffer(&frames, &state.formats, session);
    write_capture_log(session, request, frames.len(), &summary)?;

    Ok(json!({
        "captured": true,
        "session_id": session.session_id(),
        "frames_received": frames.len(),
        "frames_saved": summary.saved,
        "frames_skipped": summary.skipped,
    }))
}

/// Record the triggering request and decode counts inside the session dir.
fn write_capture_log(
    session: &CaptureSession,
    request: &CommandRequest,
    frames_received: usize,
    summary: &decode::DecodeSummary,
) -> std::io::Result<()> {
    let log = json!({
        "session_id": session.session_id(),
        "request": request,
        "frames_received": frames_received,
        "frames_saved": summary.saved,
        "frames_skipped": summary.skipped,
    });
    std::fs::write(
        session.session_dir().join("capture_log.json"),
        serde_json::to_vec_pretty(&log)?,
    )
}

// tests below here ---------------------
