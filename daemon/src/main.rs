mod app_data;
mod capture;
mod capturer;
mod config;
mod desktop;
mod dispatch;
mod error;
mod event;
mod event_loop;
#[cfg(test)]
mod fakes;
mod hotkey;
mod paths;
mod process_names;
mod status;
mod task_handler;
mod tasks;
mod window_log;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_data::SharedAppData;
use crate::capture::SystemBackend;
use crate::capturer::{CaptureSettings, Capturer};
use crate::desktop::{DesktopQuery, SystemDesktop};
use crate::dispatch::Dispatcher;
use crate::event_loop::EventLoop;
use crate::task_handler::TaskHandler;
use crate::tasks::{PollFgWin, PollHotkeys};
use crate::window_log::WindowLog;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── App data directory ────────────────────────────────────────────────────
    let app_dir = paths::app_data_dir()?;
    std::fs::create_dir_all(&app_dir)
        .with_context(|| format!("Failed to create app data directory {}", app_dir.display()))?;

    // ── Configuration ─────────────────────────────────────────────────────────
    let config_path = paths::config_file_path()?;
    let config = config::load_or_default(&config_path).unwrap_or_else(|e| {
        warn!("Config error (using defaults): {e:#}");
        config::Config::default()
    });
    let global = &config.global;

    let app_data = Arc::new(SharedAppData::new(config.bindings()));
    let event_loop = EventLoop::instance();

    // ── Capture + dispatch ────────────────────────────────────────────────────
    let capture_settings = CaptureSettings {
        output_dir: paths::capture_output_dir(global.capture_output_dir.as_deref())?,
        max_attempts: global.effective_max_attempts(),
    };
    info!("Captures go to {}", capture_settings.output_dir.display());
    let capturer = Capturer::new(
        Arc::new(SystemBackend),
        Arc::clone(&app_data),
        event_loop.handle(),
        capture_settings,
    );
    let window_log = WindowLog::new(paths::window_log_path(global.window_log_path.as_deref())?);
    info!("Window changes are logged to {}", window_log.path().display());

    let mut dispatcher = Dispatcher::new(
        Arc::clone(&app_data),
        event_loop.handle(),
        capturer,
        window_log,
        global.window_capture(),
        paths::status_file_path()?,
    );
    dispatcher.publish_status();

    // ── Scheduler ─────────────────────────────────────────────────────────────
    let desktop: Arc<dyn DesktopQuery> = Arc::new(SystemDesktop);
    let mut scheduler = TaskHandler::new(global.tick());
    scheduler.register(Box::new(PollHotkeys::new(
        Arc::clone(&desktop),
        Arc::clone(&app_data),
        global.hotkey_poll_interval(),
    )))?;
    scheduler.register(Box::new(PollFgWin::new(
        Arc::clone(&desktop),
        Arc::clone(&app_data),
        global.window_poll_interval(),
    )))?;

    let (stop_tx, stop_rx) = watch::channel(false);
    let scheduler_events = event_loop.handle();
    let scheduler_job = tokio::spawn(async move { scheduler.run(scheduler_events, stop_rx).await });

    // ── Background tasks ──────────────────────────────────────────────────────
    tokio::spawn(config::watch_config(config_path, Arc::clone(&app_data)));

    // Graceful shutdown on Ctrl+C, even if it arrives before the loop starts.
    {
        let handle = event_loop.handle();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl+C received");
                handle.end_when_running().await;
            }
        });
    }

    info!("glance-daemon v{} started", env!("CARGO_PKG_VERSION"));

    // ── Event loop ────────────────────────────────────────────────────────────
    event_loop.start(&mut dispatcher).await;

    info!("Shutting down");
    let _ = stop_tx.send(true);
    match scheduler_job.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Scheduler error: {e}"),
        Err(e) => error!("Scheduler task aborted: {e}"),
    }
    dispatcher.shutdown(event_loop).await;
    Ok(())
}
