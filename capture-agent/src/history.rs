//! JSON history persistence for trigger requests.

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct History {
    pub requests: Vec<serde_json::Value>,
}

/// Append one request to the history file, creating it if needed.
///
/// An unreadable or corrupt existing file is replaced rather than treated
/// as fatal.
pub fn append_to_history(path: &Path, request: &serde_json::Value) -> std::io::Result<()> {
    let mut history = std::fs::read_to_string(path)
        .ok()
        .and_then(|contents| serde_json::from_str::<History>(&contents).ok())
        .unwrap_or_default();
    history.requests.push(request.clone());
    let encoded = serde_json::to_vec_pretty(&history)?;
    std::fs::write(path, encoded)
}

// tests below here ---------------------
