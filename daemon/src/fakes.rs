//! In-memory desktop and capture backend for tests.
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;

use parking_lot::Mutex;

use crate::app_data::WindowInfo;
use crate::capture::{CaptureBackend, RawFrame};
use crate::desktop::DesktopQuery;
use crate::error::{CaptureError, OsQueryError};
use crate::event::WindowId;
use crate::hotkey::KeyCode;

// ── Desktop ───────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeDesktop {
    down: Mutex<HashSet<u32>>,
    window: Mutex<Option<WindowInfo>>,
    failing: AtomicBool,
    key_queries: AtomicUsize,
}

impl FakeDesktop {
    pub fn press(&self, vk: u32) {
        self.down.lock().insert(vk);
    }

    pub fn release(&self, vk: u32) {
        self.down.lock().remove(&vk);
    }

    pub fn focus(&self, id: &str, title: &str, pid: Option<u32>) {
        *self.window.lock() =
            Some(WindowInfo { id: WindowId::from(id), title: title.to_string(), pid });
    }

    pub fn unfocus(&self) {
        *self.window.lock() = None;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn key_queries(&self) -> usize {
        self.key_queries.load(Ordering::SeqCst)
    }

    fn check(&self, query: &'static str) -> Result<(), OsQueryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(OsQueryError::Failed { query, reason: "injected".into() });
        }
        Ok(())
    }
}

impl DesktopQuery for FakeDesktop {
    fn key_state(&self, key: KeyCode) -> Result<bool, OsQueryError> {
        self.key_queries.fetch_add(1, Ordering::SeqCst);
        self.check("key state")?;
        Ok(self.down.lock().contains(&key.0))
    }

    fn foreground_window(&self) -> Result<Option<WindowInfo>, OsQueryError> {
        self.check("foreground window")?;
        Ok(self.window.lock().clone())
    }
}

// ── Capture backend ───────────────────────────────────────────────────────────

/// Outcome of one scripted `grab_frame` call.
#[derive(Debug, Clone, Copy)]
pub enum Grab {
    Frame,
    Transient,
    Disconnect,
}

/// Replays a script of grab outcomes. Once the script runs out every grab
/// returns a frame.
#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Grab>>,
    unavailable: bool,
    /// When set, each grab waits for one message before answering.
    gate: Mutex<Option<mpsc::Receiver<()>>>,
    pub sessions_created: AtomicUsize,
    pub sessions_released: AtomicUsize,
    pub grabs: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(script: impl IntoIterator<Item = Grab>) -> Self {
        Self { script: Mutex::new(script.into_iter().collect()), ..Self::default() }
    }

    pub fn unavailable() -> Self {
        Self { unavailable: true, ..Self::default() }
    }

    /// Makes every grab block until the returned sender sends `()`.
    pub fn gated(script: impl IntoIterator<Item = Grab>) -> (Self, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let backend = Self { gate: Mutex::new(Some(rx)), ..Self::new(script) };
        (backend, tx)
    }

    pub fn created(&self) -> usize {
        self.sessions_created.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.sessions_released.load(Ordering::SeqCst)
    }

    pub fn grab_count(&self) -> usize {
        self.grabs.load(Ordering::SeqCst)
    }
}

/// 2×1 frame: one red and one blue pixel, BGRA.
pub fn test_frame() -> RawFrame {
    RawFrame { width: 2, height: 1, bgra_data: vec![0, 0, 255, 255, 255, 0, 0, 255] }
}

impl CaptureBackend for ScriptedBackend {
    type Session = ();

    fn create_session(&self) -> Result<Self::Session, CaptureError> {
        if self.unavailable {
            return Err(CaptureError::Unavailable("scripted".into()));
        }
        self.sessions_created.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn grab_frame(&self, _session: &mut Self::Session) -> Result<RawFrame, CaptureError> {
        if let Some(gate) = self.gate.lock().as_ref() {
            let _ = gate.recv();
        }
        let n = self.grabs.fetch_add(1, Ordering::SeqCst) + 1;
        match self.script.lock().pop_front().unwrap_or(Grab::Frame) {
            Grab::Frame => Ok(test_frame()),
            Grab::Transient => Err(CaptureError::Transient(format!("scripted timeout #{n}"))),
            Grab::Disconnect => Err(CaptureError::Disconnected("scripted".into())),
        }
    }

    fn release_session(&self, _session: Self::Session) {
        self.sessions_released.fetch_add(1, Ordering::SeqCst);
    }
}
