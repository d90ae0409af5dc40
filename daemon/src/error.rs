//! Typed errors for the component seams of the daemon.
//!
//! Startup paths (config, directories) use `anyhow`; everything that crosses a
//! task, dispatch or backend boundary uses one of these so callers can decide
//! severity and retry behaviour by variant.
use std::io;

use crate::event::HotkeyId;

/// Failure reported by a [`CaptureBackend`](crate::capture::CaptureBackend).
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The frame grab did not complete this time (e.g. the frame wait timed
    /// out). Retrying on the same session may succeed.
    #[error("transient capture failure: {0}")]
    Transient(String),

    /// No capture backend exists on this platform or it cannot be used.
    #[error("capture backend unavailable: {0}")]
    Unavailable(String),

    /// The backend is present but refused to open a capture session.
    #[error("capture session could not be created: {0}")]
    SessionCreation(String),

    /// The session stopped delivering frames and will not recover.
    #[error("capture session disconnected: {0}")]
    Disconnected(String),
}

impl CaptureError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CaptureError::Transient(_))
    }
}

/// A desktop query (key state, foreground window) could not be answered.
#[derive(Debug, thiserror::Error)]
pub enum OsQueryError {
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),

    #[error("{query} failed: {reason}")]
    Failed { query: &'static str, reason: String },
}

/// Rejected [`TaskHandler::register`](crate::task_handler::TaskHandler::register)
/// or [`TaskHandler::run`](crate::task_handler::TaskHandler::run) call.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TaskRegistrationError {
    #[error("cannot register task '{0}': scheduler already started")]
    SchedulerStarted(String),

    #[error("a task named '{0}' is already registered")]
    DuplicateName(String),

    #[error("task '{0}' has a zero polling interval")]
    ZeroInterval(String),

    #[error("scheduler has already been started")]
    AlreadyRunning,
}

/// An event could not be dispatched. Contained by the event loop.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no binding for hotkey '{0}'")]
    UnknownHotkey(HotkeyId),

    #[error("failed to append to window log: {0}")]
    WindowLog(#[source] io::Error),
}

impl DispatchError {
    /// Dropped events that are expected during normal operation, e.g. a
    /// hotkey whose binding was removed by a config reload.
    pub fn is_benign(&self) -> bool {
        matches!(self, DispatchError::UnknownHotkey(_))
    }
}

/// A hotkey trigger string such as `"Ctrl+Shift+F8"` could not be parsed.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HotkeyParseError {
    #[error("hotkey '{id}' has no keys")]
    Empty { id: String },

    #[error("hotkey '{id}': unrecognised key name '{key}'")]
    UnknownKey { id: String, key: String },

    #[error("hotkey '{id}': key '{key}' listed more than once")]
    DuplicateKey { id: String, key: String },
}
