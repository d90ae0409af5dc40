use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::app_data::SharedAppData;
use crate::desktop::DesktopQuery;
use crate::error::OsQueryError;
use crate::event::{Event, EventKind};
use crate::process_names::ProcessNames;
use crate::task_handler::Task;

/// Emits `WindowChanged` when the foreground window changes.
///
/// The last seen window lives in [`SharedAppData`], not here, so a restarted
/// task picks up where the previous one left off.
pub struct PollFgWin {
    desktop: Arc<dyn DesktopQuery>,
    app_data: Arc<SharedAppData>,
    processes: ProcessNames,
    interval: Duration,
}

impl PollFgWin {
    pub fn new(desktop: Arc<dyn DesktopQuery>, app_data: Arc<SharedAppData>, interval: Duration) -> Self {
        Self { desktop, app_data, processes: ProcessNames::new(), interval }
    }
}

impl Task for PollFgWin {
    fn name(&self) -> &str {
        "poll-fg-win"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn poll(&mut self) -> Result<Vec<Event>, OsQueryError> {
        let Some(window) = self.desktop.foreground_window()? else {
            return Ok(Vec::new());
        };
        let Some(transition) = self.app_data.observe_foreground(window) else {
            return Ok(Vec::new());
        };

        let current = transition.current;
        let owner = current.pid.and_then(|pid| self.processes.lookup(pid));
        let is_game = owner.as_ref().is_some_and(|o| o.is_game());
        debug!(
            "Foreground window {} -> {} ({:?})",
            transition.previous.as_ref().map_or("none", |w| w.id.0.as_str()),
            current.id,
            current.title
        );
        Ok(vec![Event::new(EventKind::WindowChanged {
            previous: transition.previous.map(|w| w.id),
            current: current.id,
            title: current.title,
            executable: owner.as_ref().map(|o| o.name.clone()),
            executable_path: owner.and_then(|o| o.path),
            is_game,
        })])
    }
}
