use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::error;

/// What the capture pipeline is doing right now.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum MonitorState {
    /// No capture in flight.
    Idle,
    /// A capture has been requested and has not reported an outcome yet.
    Capturing,
}

/// Runtime status written by the daemon to `<app data dir>/status.toml`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitorStatus {
    /// Daemon binary version (set from Cargo.toml at compile time).
    pub version: String,
    pub state: MonitorState,
    /// Title of the current foreground window, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreground_window: Option<String>,
    /// The foreground window belongs to a game.
    #[serde(default)]
    pub foreground_is_game: bool,
    /// Absolute path of the most recently written capture, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_capture_path: Option<String>,
    /// RFC 3339 timestamp of the most recently written capture, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_capture_timestamp: Option<String>,
    #[serde(default)]
    pub captures_completed: u64,
    #[serde(default)]
    pub captures_failed: u64,
    /// Detail of the most recent failed capture, cleared by the next success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MonitorStatus {
    /// Constructs the initial idle status on daemon startup.
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: MonitorState::Idle,
            foreground_window: None,
            foreground_is_game: false,
            last_capture_path: None,
            last_capture_timestamp: None,
            captures_completed: 0,
            captures_failed: 0,
            error: None,
        }
    }
}

impl Default for MonitorStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializes `status` to TOML and writes it to `path`.
/// Creates the parent directory if it does not exist. Failures are logged.
pub fn write_status(path: &Path, status: &MonitorStatus) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            error!("Failed to create status directory {}: {e}", parent.display());
            return;
        }
    }
    match toml::to_string_pretty(status) {
        Ok(content) => {
            if let Err(e) = std::fs::write(path, content) {
                error!("Failed to write status file: {e}");
            }
        }
        Err(e) => error!("Failed to serialize status: {e}"),
    }
}
