//! Agent configuration, loaded from a TOML file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use capture_types::DeviceFormat;

/// The configuration error type.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("lookup error on variable: {source}")]
    ShellExpandLookupVarError {
        #[from]
        source: shellexpand::LookupError<std::env::VarError>,
    },
    #[error("IO error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },
    #[error("TOML deserialization error: {source}")]
    TomlDeError {
        #[from]
        source: toml::de::Error,
    },
}

type Result<T> = std::result::Result<T, Error>;

/// The default value for [AgentConfig::output_base_dirname].
pub const DEFAULT_OUTPUT_BASE_DIRNAME: &str = "~/CAPTURE-DATA";

fn default_output_base_dirname() -> PathBuf {
    DEFAULT_OUTPUT_BASE_DIRNAME.into()
}

/// The default value for [AgentConfig::http_listen_addr].
pub const DEFAULT_HTTP_LISTEN_ADDR: &str = "127.0.0.1:8700";

fn default_http_listen_addr() -> String {
    DEFAULT_HTTP_LISTEN_ADDR.to_string()
}

/// The default value for [AgentConfig::telemetry_listen_addr].
pub const DEFAULT_TELEMETRY_LISTEN_ADDR: &str = "0.0.0.0:9871";

fn default_telemetry_listen_addr() -> String {
    DEFAULT_TELEMETRY_LISTEN_ADDR.to_string()
}

fn default_capture_stream_url() -> String {
    "ws://127.0.0.1:10000".to_string()
}

fn default_invoke_url() -> String {
    "http://127.0.0.1:8080/api/1.0/invoke".to_string()
}

fn default_max_frame_message_bytes() -> usize {
    20 * 1024 * 1024
}

fn default_history_fname() -> PathBuf {
    "history.json".into()
}

fn default_stability_poll_interval_msec() -> u64 {
    100
}

/// Agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Directory under which session output trees are created. Can contain
    /// shell variables such as `~`, `$A`, or `${B}`. Defaults to
    /// [DEFAULT_OUTPUT_BASE_DIRNAME].
    #[serde(default = "default_output_base_dirname")]
    pub output_base_dirname: PathBuf,
    /// WebSocket URL of the capture stream source.
    #[serde(default = "default_capture_stream_url")]
    pub capture_stream_url: String,
    /// Upper bound on one inbound capture stream message.
    #[serde(default = "default_max_frame_message_bytes")]
    pub max_frame_message_bytes: usize,
    /// Remote command-execution endpoint that trigger requests are
    /// forwarded to.
    #[serde(default = "default_invoke_url")]
    pub invoke_url: String,
    /// Address of the HTTP trigger API, in `IP:PORT` format. Defaults to
    /// [DEFAULT_HTTP_LISTEN_ADDR].
    #[serde(default = "default_http_listen_addr")]
    pub http_listen_addr: String,
    /// UDP address receiving telemetry datagrams, one JSON message each.
    /// Defaults to [DEFAULT_TELEMETRY_LISTEN_ADDR].
    #[serde(default = "default_telemetry_listen_addr")]
    pub telemetry_listen_addr: String,
    /// File the trigger request history is appended to. Relative paths are
    /// resolved against the config file's directory.
    #[serde(default = "default_history_fname")]
    pub history_fname: PathBuf,
    /// Re-check interval of the stability gate, in milliseconds.
    #[serde(default = "default_stability_poll_interval_msec")]
    pub stability_poll_interval_msec: u64,
    /// Upper bound on one stability wait, in seconds. Unset means the wait
    /// is unbounded, matching the reference behavior.
    #[serde(default)]
    pub stability_timeout_sec: Option<u64>,
    /// Pixel format per device identifier. Frames from devices missing
    /// here are skipped at decode time.
    #[serde(default)]
    pub device_formats: BTreeMap<String, DeviceFormat>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            output_base_dirname: default_output_base_dirname(),
            capture_stream_url: default_capture_stream_url(),
            max_frame_message_bytes: default_max_frame_message_bytes(),
            invoke_url: default_invoke_url(),
            http_listen_addr: default_http_listen_addr(),
            telemetry_listen_addr: default_telemetry_listen_addr(),
            history_fname: default_history_fname(),
            stability_poll_interval_msec: default_stability_poll_interval_msec(),
            stability_timeout_sec: None,
            device_formats: BTreeMap::new(),
        }
    }
}

impl AgentConfig {
    pub fn stability_poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.stability_poll_interval_msec)
    }

    pub fn stability_timeout(&self) -> Option<std::time::Duration> {
        self.stability_timeout_sec
            .map(std::time::Duration::from_secs)
    }
}

/// If `path` is relative, make it relative to `dirname`.
///
/// `path` must be utf-8 encoded and can start with a tilde, which is
/// expanded to the home directory.
fn fixup_relative_path(path: &mut PathBuf, dirname: &Path) -> Result<()> {
    let pathstr = path.as_os_str().to_str().unwrap();
    let expanded = shellexpand::full(&pathstr)?;
    *path = PathBuf::from(expanded.to_string());

    if path.is_relative() {
        *path = dirname.join(&path);
    }
    Ok(())
}

/// Load the configuration from a TOML file, fixing up relative paths
/// against the file's directory.
pub fn parse_config_file<P: AsRef<Path>>(fname: P) -> Result<AgentConfig> {
    let fname = fname.as_ref();
    let dirname = fname.parent().map(Path::to_path_buf).unwrap_or_default();
    let contents = std::fs::read_to_string(fname)?;
    let mut cfg: AgentConfig = toml::from_str(&contents)?;
    fixup_relative_path(&mut cfg.output_base_dirname, &dirname)?;
    fixup_relative_path(&mut cfg.history_fname, &dirname)?;
    Ok(cfg)
}

// tests below here ---------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let dir = tempfile::tempdir().unwrap();
        let fname = dir.path().join("agent.toml");
        std::fs::write(
            &fname,
            r#"
output_base_dirname = "captures"
capture_stream_url = "ws://192.168.0.145:10000"

[device_formats]
cameradevice_rgb_1 = "container"
cameradevice_swir_1 = "raw8"
cameradevice_lwir_1 = "raw16"
"#,
        )
        .unwrap();

        let cfg = parse_config_file(&fname).unwrap();
        // relative output dir resolved against the config file dir
        assert_eq!(cfg.output_base_dirname, dir.path().join("captures"));
        assert_eq!(cfg.capture_stream_url, "ws://192.168.0.145:10000");
        assert_eq!(cfg.max_frame_message_bytes, 20 * 1024 * 1024);
        assert_eq!(
            cfg.device_formats.get("cameradevice_swir_1"),
            Some(&DeviceFormat::Raw8)
        );
        assert_eq!(
            cfg.device_formats.get("cameradevice_lwir_1"),
            Some(&DeviceFormat::Raw16)
        );
        assert_eq!(cfg.stability_timeout(), None);
    }

    #[test]
    fn unknown_fields_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let fname = dir.path().join("agent.toml");
        std::fs::write(&fname, "no_such_field = 1\n").unwrap();
        assert!(matches!(
            parse_config_file(&fname),
            Err(Error::TomlDeError { .. })
        ));
    }
}
