use std::sync::Arc;
use std::time::Duration;

use crate::app_data::SharedAppData;
use crate::desktop::DesktopQuery;
use crate::error::OsQueryError;
use crate::event::{Event, EventKind};
use crate::task_handler::Task;

/// Emits `HotkeyPressed` when a bound combination goes down.
///
/// Edge-triggered: holding the keys across polls fires once.
pub struct PollHotkeys {
    desktop: Arc<dyn DesktopQuery>,
    app_data: Arc<SharedAppData>,
    interval: Duration,
}

impl PollHotkeys {
    pub fn new(desktop: Arc<dyn DesktopQuery>, app_data: Arc<SharedAppData>, interval: Duration) -> Self {
        Self { desktop, app_data, interval }
    }
}

impl Task for PollHotkeys {
    fn name(&self) -> &str {
        "poll-hotkeys"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn poll(&mut self) -> Result<Vec<Event>, OsQueryError> {
        let desktop = &self.desktop;
        let edges = self.app_data.hotkey_edges(|key| desktop.key_state(key))?;
        Ok(edges
            .into_iter()
            .map(|id| Event::new(EventKind::HotkeyPressed { id }))
            .collect())
    }
}
