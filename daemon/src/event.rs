use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Local};

/// Identifier of a configured hotkey binding (the `id` field in config.toml).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HotkeyId(pub String);

impl From<&str> for HotkeyId {
    fn from(s: &str) -> Self {
        HotkeyId(s.to_string())
    }
}

impl fmt::Display for HotkeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Platform identity of a top-level window (an `HWND` rendered as text on Windows).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowId(pub String);

impl From<&str> for WindowId {
    fn from(s: &str) -> Self {
        WindowId(s.to_string())
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What caused a capture to be requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureTrigger {
    Hotkey(HotkeyId),
    WindowChange,
}

impl fmt::Display for CaptureTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureTrigger::Hotkey(id) => write!(f, "hotkey '{id}'"),
            CaptureTrigger::WindowChange => f.write_str("window change"),
        }
    }
}

/// Why a capture produced no file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Every attempt hit a retryable backend error.
    Transient,
    /// The backend or session was unusable; no retry was attempted.
    Fatal,
    /// A frame was grabbed but could not be written to disk.
    Persist,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// A bound key combination went from released to pressed.
    HotkeyPressed { id: HotkeyId },
    /// The foreground window changed identity or title.
    WindowChanged {
        previous: Option<WindowId>,
        current: WindowId,
        title: String,
        /// Executable name of the owning process, when it could be resolved.
        executable: Option<String>,
        /// Full image path of the owning process.
        executable_path: Option<PathBuf>,
        /// The owning executable lives in a game library.
        is_game: bool,
    },
    /// Ask the capturer for one frame.
    CaptureRequested { trigger: CaptureTrigger },
    /// A frame was written to `path`.
    CaptureCompleted { sequence: u64, path: PathBuf },
    /// Capture `sequence` ended without a frame.
    CaptureFailed { sequence: u64, reason: FailureReason, detail: String },
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::HotkeyPressed { .. } => "HotkeyPressed",
            EventKind::WindowChanged { .. } => "WindowChanged",
            EventKind::CaptureRequested { .. } => "CaptureRequested",
            EventKind::CaptureCompleted { .. } => "CaptureCompleted",
            EventKind::CaptureFailed { .. } => "CaptureFailed",
        }
    }
}

/// A timestamped, immutable unit of work for the event loop.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub timestamp: DateTime<Local>,
    pub kind: EventKind,
}

impl Event {
    /// Stamps `kind` with the current local time.
    pub fn new(kind: EventKind) -> Self {
        Self::at(Local::now(), kind)
    }

    pub fn at(timestamp: DateTime<Local>, kind: EventKind) -> Self {
        Self { timestamp, kind }
    }
}
