//! Routes events from the loop to the components that act on them.
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Local};
use tracing::{debug, error, info, warn};

use crate::app_data::SharedAppData;
use crate::capture::CaptureBackend;
use crate::capturer::Capturer;
use crate::error::DispatchError;
use crate::event::{CaptureTrigger, Event, EventKind, FailureReason, HotkeyId};
use crate::event_loop::{EventHandle, EventHandler, EventLoop};
use crate::hotkey::HotkeyAction;
use crate::status::{self, MonitorState, MonitorStatus};
use crate::window_log::WindowLog;

/// Which foreground window changes also request a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowCapture {
    Off,
    AllWindows,
    /// Only windows whose executable lives in a game library.
    GamesOnly,
}

impl WindowCapture {
    pub fn wants(self, is_game: bool) -> bool {
        match self {
            WindowCapture::Off => false,
            WindowCapture::AllWindows => true,
            WindowCapture::GamesOnly => is_game,
        }
    }
}

pub struct Dispatcher<B: CaptureBackend> {
    app_data: Arc<SharedAppData>,
    events: EventHandle,
    capturer: Capturer<B>,
    window_log: WindowLog,
    window_capture: WindowCapture,
    status_path: PathBuf,
    status: MonitorStatus,
}

impl<B: CaptureBackend> Dispatcher<B> {
    pub fn new(
        app_data: Arc<SharedAppData>,
        events: EventHandle,
        capturer: Capturer<B>,
        window_log: WindowLog,
        window_capture: WindowCapture,
        status_path: PathBuf,
    ) -> Self {
        Self {
            app_data,
            events,
            capturer,
            window_log,
            window_capture,
            status_path,
            status: MonitorStatus::new(),
        }
    }

    #[cfg(test)]
    pub fn status(&self) -> &MonitorStatus {
        &self.status
    }

    pub fn publish_status(&self) {
        status::write_status(&self.status_path, &self.status);
    }

    /// Waits for an in-flight capture, dispatches its outcome and records the
    /// final idle status. Call after `event_loop` has stopped; anything else
    /// still queued is discarded.
    pub async fn shutdown(&mut self, event_loop: &EventLoop) {
        if self.app_data.capture_in_flight() {
            info!("Waiting for the capture in flight");
        }
        self.capturer.wait_idle().await;

        for event in event_loop.drain().await {
            if matches!(event.kind, EventKind::CaptureCompleted { .. } | EventKind::CaptureFailed { .. }) {
                event_loop.process_event(self, event);
            } else {
                debug!("Discarding {} at shutdown", event.kind.name());
            }
        }

        self.status.state = MonitorState::Idle;
        self.publish_status();
    }

    fn on_hotkey(&mut self, id: HotkeyId) -> Result<(), DispatchError> {
        match self.app_data.binding_action(&id) {
            Some(HotkeyAction::Capture) => {
                self.events.add_event(Event::new(EventKind::CaptureRequested {
                    trigger: CaptureTrigger::Hotkey(id),
                }));
                Ok(())
            }
            Some(HotkeyAction::Quit) => {
                info!("Quit requested by hotkey '{id}'");
                self.events.end();
                Ok(())
            }
            None => Err(DispatchError::UnknownHotkey(id)),
        }
    }

    fn on_window_changed(
        &mut self,
        event_time: DateTime<Local>,
        title: String,
        executable: Option<String>,
        is_game: bool,
    ) -> Result<(), DispatchError> {
        let kind = if is_game { "game" } else { "window" };
        match &executable {
            Some(exe) => info!("Foreground {kind}: {title} ({exe})"),
            None => info!("Foreground {kind}: {title}"),
        }
        let logged = self.window_log.append(event_time, &title);
        if let Err(e) = &logged {
            error!("Failed to append to {}: {e}", self.window_log.path().display());
        }

        self.status.foreground_window = Some(title);
        self.status.foreground_is_game = is_game;
        self.publish_status();

        if self.window_capture.wants(is_game) {
            self.events.add_event(Event::new(EventKind::CaptureRequested {
                trigger: CaptureTrigger::WindowChange,
            }));
        }
        logged.map_err(DispatchError::WindowLog)
    }

    fn on_capture_requested(&mut self, trigger: CaptureTrigger) {
        if self.capturer.request(&trigger) {
            self.status.state = MonitorState::Capturing;
            self.publish_status();
        }
    }

    fn on_capture_completed(&mut self, event_time: DateTime<Local>, sequence: u64, path: PathBuf) {
        info!("Capture {sequence} saved: {}", path.display());
        self.status.state = MonitorState::Idle;
        self.status.captures_completed += 1;
        self.status.last_capture_path = Some(path.to_string_lossy().into_owned());
        self.status.last_capture_timestamp = Some(event_time.to_rfc3339());
        self.status.error = None;
        self.publish_status();
    }

    fn on_capture_failed(&mut self, sequence: u64, reason: FailureReason, detail: String) {
        warn!("Capture {sequence} failed ({reason:?}): {detail}");
        self.status.state = MonitorState::Idle;
        self.status.captures_failed += 1;
        self.status.error = Some(format!("Capture {sequence} failed: {detail}"));
        self.publish_status();
    }
}

impl<B: CaptureBackend> EventHandler for Dispatcher<B> {
    fn handle(&mut self, event: Event) -> Result<(), DispatchError> {
        match event.kind {
            EventKind::HotkeyPressed { id } => self.on_hotkey(id),
            EventKind::WindowChanged { title, executable, is_game, .. } => {
                self.on_window_changed(event.timestamp, title, executable, is_game)
            }
            EventKind::CaptureRequested { trigger } => {
                self.on_capture_requested(trigger);
                Ok(())
            }
            EventKind::CaptureCompleted { sequence, path } => {
                self.on_capture_completed(event.timestamp, sequence, path);
                Ok(())
            }
            EventKind::CaptureFailed { sequence, reason, detail } => {
                self.on_capture_failed(sequence, reason, detail);
                Ok(())
            }
        }
    }
}
