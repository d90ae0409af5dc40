//! Fixed-tick scheduler for the polling tasks.
//!
//! Every base tick each registered task whose interval has elapsed is polled,
//! one after another on the scheduler task. Events a poll produces go straight
//! to the event loop. A failing poll is retried at its next interval; the
//! other tasks keep running. Only the first failure of a streak is logged at
//! warn, repeats go to debug.
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::{OsQueryError, TaskRegistrationError};
use crate::event::Event;
use crate::event_loop::EventHandle;

/// A unit of periodic desktop-state inspection.
pub trait Task: Send {
    fn name(&self) -> &str;

    /// Minimum time between two polls.
    fn interval(&self) -> Duration;

    /// Inspects state once. Returns the events to enqueue, usually none.
    fn poll(&mut self) -> Result<Vec<Event>, OsQueryError>;
}

struct ScheduledTask {
    task: Box<dyn Task>,
    last_run: Option<Instant>,
    /// Consecutive failed polls.
    failures: u32,
}

impl ScheduledTask {
    fn is_due(&self, now: Instant) -> bool {
        match self.last_run {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.task.interval(),
        }
    }

    fn record(&mut self, error: Option<&OsQueryError>) {
        let name = self.task.name();
        match error {
            None if self.failures > 0 => {
                info!("Task {name} recovered after {} failed poll(s)", self.failures);
                self.failures = 0;
            }
            None => {}
            Some(e) if self.failures == 0 => {
                warn!("Task {name} failed, retrying next interval: {e}");
                self.failures = 1;
            }
            Some(e) => {
                self.failures = self.failures.saturating_add(1);
                debug!("Task {name} failed again ({}): {e}", self.failures);
            }
        }
    }
}

pub struct TaskHandler {
    tick: Duration,
    tasks: Vec<ScheduledTask>,
    started: bool,
}

impl TaskHandler {
    pub fn new(tick: Duration) -> Self {
        Self { tick, tasks: Vec::new(), started: false }
    }

    /// Adds `task` to the schedule. Only allowed before [`run`](Self::run).
    pub fn register(&mut self, task: Box<dyn Task>) -> Result<(), TaskRegistrationError> {
        let name = task.name().to_string();
        if self.started {
            return Err(TaskRegistrationError::SchedulerStarted(name));
        }
        if task.interval().is_zero() {
            return Err(TaskRegistrationError::ZeroInterval(name));
        }
        if self.tasks.iter().any(|t| t.task.name() == name) {
            return Err(TaskRegistrationError::DuplicateName(name));
        }
        info!("Registered task {name} ({}ms)", task.interval().as_millis());
        self.tasks.push(ScheduledTask { task, last_run: None, failures: 0 });
        Ok(())
    }

    #[cfg(test)]
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.task.name()).collect()
    }

    #[cfg(test)]
    fn failure_streak(&self, name: &str) -> Option<u32> {
        self.tasks.iter().find(|t| t.task.name() == name).map(|t| t.failures)
    }

    /// Polls every task due at `now` and forwards their events.
    /// Returns the number of tasks polled.
    pub fn run_due(&mut self, now: Instant, events: &EventHandle) -> usize {
        let mut polled = 0;
        for scheduled in self.tasks.iter_mut().filter(|t| t.is_due(now)) {
            scheduled.last_run = Some(now);
            polled += 1;
            match scheduled.task.poll() {
                Ok(produced) => {
                    scheduled.record(None);
                    for event in produced {
                        debug!("{} produced {}", scheduled.task.name(), event.kind.name());
                        events.add_event(event);
                    }
                }
                Err(e) => scheduled.record(Some(&e)),
            }
        }
        polled
    }

    /// Ticks the schedule until `stop` becomes `true`.
    pub async fn run(
        &mut self,
        events: EventHandle,
        mut stop: watch::Receiver<bool>,
    ) -> Result<(), TaskRegistrationError> {
        if self.started {
            return Err(TaskRegistrationError::AlreadyRunning);
        }
        self.started = true;

        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Scheduler started: {} task(s), {}ms tick", self.tasks.len(), self.tick.as_millis());

        while !*stop.borrow_and_update() {
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                now = ticker.tick() => {
                    self.run_due(now, &events);
                }
            }
        }

        info!("Scheduler stopped");
        Ok(())
    }
}
