//! Turns `CaptureRequested` events into PNG files.
//!
//! At most one capture runs at a time, guarded by the `capture_in_flight`
//! flag in the shared application data. The capture itself (session, frame
//! grab, PNG write) runs on tokio's blocking pool so the event loop keeps
//! draining while the backend waits for a frame. The outcome comes back to the
//! loop as a `CaptureCompleted` or `CaptureFailed` event.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::app_data::SharedAppData;
use crate::capture::{CaptureBackend, RawFrame, SessionGuard};
use crate::event::{CaptureTrigger, Event, EventKind, FailureReason};
use crate::event_loop::EventHandle;

pub const DEFAULT_MAX_CAPTURE_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// Directory the PNG files are written to. Created on demand.
    pub output_dir: PathBuf,
    /// Grab attempts per capture when the backend reports transient failures.
    pub max_attempts: u32,
}

pub struct Capturer<B: CaptureBackend> {
    backend: Arc<B>,
    app_data: Arc<SharedAppData>,
    events: EventHandle,
    settings: Arc<CaptureSettings>,
    last_sequence: u64,
    job: Option<JoinHandle<()>>,
}

impl<B: CaptureBackend> Capturer<B> {
    pub fn new(
        backend: Arc<B>,
        app_data: Arc<SharedAppData>,
        events: EventHandle,
        settings: CaptureSettings,
    ) -> Self {
        Self {
            backend,
            app_data,
            events,
            settings: Arc::new(settings),
            last_sequence: 0,
            job: None,
        }
    }

    /// Starts a capture unless one is already in flight, in which case the
    /// request is dropped without an outcome event. Returns whether a capture
    /// was started.
    ///
    /// Must be called from within a tokio runtime.
    pub fn request(&mut self, trigger: &CaptureTrigger) -> bool {
        if !self.app_data.try_begin_capture() {
            debug!("Capture already in flight; dropping request from {trigger}");
            return false;
        }

        self.last_sequence += 1;
        let sequence = self.last_sequence;
        info!("Capture {sequence} requested by {trigger}");

        let backend = Arc::clone(&self.backend);
        let app_data = Arc::clone(&self.app_data);
        let settings = Arc::clone(&self.settings);
        let events = self.events.clone();

        self.job = Some(tokio::task::spawn_blocking(move || {
            let outcome = {
                // Clears the in-flight flag even if the backend panics.
                let _slot = CaptureSlot(&app_data);
                capture_once(&*backend, &settings, sequence)
            };
            events.add_event(Event::new(outcome));
        }));
        true
    }

    /// Waits for the most recently started capture to finish.
    pub async fn wait_idle(&mut self) {
        if let Some(job) = self.job.take() {
            if let Err(e) = job.await {
                error!("Capture job aborted: {e}");
            }
        }
    }
}

struct CaptureSlot<'a>(&'a SharedAppData);

impl Drop for CaptureSlot<'_> {
    fn drop(&mut self) {
        self.0.finish_capture();
    }
}

/// Runs one capture to completion on the calling thread and describes the
/// outcome. The session is released before the frame is written.
pub fn capture_once<B: CaptureBackend>(
    backend: &B,
    settings: &CaptureSettings,
    sequence: u64,
) -> EventKind {
    let failed = |reason, detail: String| EventKind::CaptureFailed { sequence, reason, detail };

    let frame = {
        let mut session = match SessionGuard::open(backend) {
            Ok(session) => session,
            Err(e) => {
                error!("Capture {sequence}: {e}");
                return failed(FailureReason::Fatal, e.to_string());
            }
        };

        let max_attempts = settings.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match session.grab_frame() {
                Ok(frame) => break frame,
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    warn!("Capture {sequence}: attempt {attempt}/{max_attempts} failed: {e}");
                }
                Err(e) if e.is_transient() => {
                    warn!("Capture {sequence}: giving up after {attempt} attempts: {e}");
                    return failed(
                        FailureReason::Transient,
                        format!("{e} (after {attempt} attempts)"),
                    );
                }
                Err(e) => {
                    error!("Capture {sequence}: {e}");
                    return failed(FailureReason::Fatal, e.to_string());
                }
            }
        }
    };

    match persist_frame(&frame, &settings.output_dir, sequence, Local::now()) {
        Ok(path) => EventKind::CaptureCompleted { sequence, path },
        Err(e) => {
            error!("Capture {sequence}: {e:#}");
            failed(FailureReason::Persist, format!("{e:#}"))
        }
    }
}

/// `capture-<sequence>-<YYYYMMDD-HHMMSS-mmm>.png`
pub fn frame_file_name(sequence: u64, timestamp: DateTime<Local>) -> String {
    format!("capture-{sequence:06}-{}.png", timestamp.format("%Y%m%d-%H%M%S-%3f"))
}

/// Encodes `frame` as PNG under `dir`, creating the directory if needed.
pub fn persist_frame(
    frame: &RawFrame,
    dir: &Path,
    sequence: u64,
    timestamp: DateTime<Local>,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create capture directory {}", dir.display()))?;

    let mut rgba = frame.bgra_data.clone();
    for px in rgba.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
    let image = image::RgbaImage::from_raw(frame.width, frame.height, rgba).with_context(|| {
        format!(
            "Frame buffer of {} bytes does not match {}×{}",
            frame.bgra_data.len(),
            frame.width,
            frame.height
        )
    })?;

    let path = dir.join(frame_file_name(sequence, timestamp));
    image
        .save_with_format(&path, image::ImageFormat::Png)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}
