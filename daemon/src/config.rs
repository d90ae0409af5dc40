use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::app_data::SharedAppData;
use crate::capturer::DEFAULT_MAX_CAPTURE_ATTEMPTS;
use crate::dispatch::WindowCapture;
use crate::hotkey::{HotkeyAction, HotkeyBinding};

pub const DEFAULT_TICK_MS: u64 = 10;
pub const DEFAULT_HOTKEY_POLL_MS: u64 = 20;
pub const DEFAULT_WINDOW_POLL_MS: u64 = 250;
pub const MIN_INTERVAL_MS: u64 = 1;
pub const MAX_INTERVAL_MS: u64 = 60_000;
pub const MAX_CAPTURE_ATTEMPTS: u32 = 10;
pub const DEFAULT_HOTKEY_ID: &str = "capture";
pub const DEFAULT_HOTKEY: &str = "F8";

/// Root configuration structure. Deserialized from `<app data dir>/config.toml`.
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default = "default_hotkeys")]
    pub hotkeys: Vec<HotkeyConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            global: GlobalConfig::default(),
            hotkeys: default_hotkeys(),
        }
    }
}

/// Scheduler, capture and output settings.
#[derive(Debug, Deserialize)]
pub struct GlobalConfig {
    /// Base scheduler resolution in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_hotkey_poll_ms")]
    pub hotkey_poll_ms: u64,
    #[serde(default = "default_window_poll_ms")]
    pub window_poll_ms: u64,
    /// Grab attempts per capture on transient backend failures. Clamped to [1, 10].
    #[serde(default = "default_max_capture_attempts")]
    pub max_capture_attempts: u32,
    /// Also capture whenever the foreground window changes.
    #[serde(default)]
    pub capture_on_window_change: bool,
    /// Restricts `capture_on_window_change` to game windows (executables
    /// inside a Steam library).
    #[serde(default)]
    pub capture_games_only: bool,
    /// Where PNG captures go. Defaults to `<app data dir>/captures`.
    /// `%VAR%` references are expanded at runtime.
    #[serde(default)]
    pub capture_output_dir: Option<String>,
    /// Window-change log. Defaults to `<app data dir>/focus.log`.
    #[serde(default)]
    pub window_log_path: Option<String>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            tick_ms: DEFAULT_TICK_MS,
            hotkey_poll_ms: DEFAULT_HOTKEY_POLL_MS,
            window_poll_ms: DEFAULT_WINDOW_POLL_MS,
            max_capture_attempts: DEFAULT_MAX_CAPTURE_ATTEMPTS,
            capture_on_window_change: false,
            capture_games_only: false,
            capture_output_dir: None,
            window_log_path: None,
        }
    }
}

impl GlobalConfig {
    pub fn tick(&self) -> Duration {
        clamp_interval(self.tick_ms)
    }

    pub fn hotkey_poll_interval(&self) -> Duration {
        clamp_interval(self.hotkey_poll_ms)
    }

    pub fn window_poll_interval(&self) -> Duration {
        clamp_interval(self.window_poll_ms)
    }

    pub fn effective_max_attempts(&self) -> u32 {
        self.max_capture_attempts.clamp(1, MAX_CAPTURE_ATTEMPTS)
    }

    pub fn window_capture(&self) -> WindowCapture {
        match (self.capture_on_window_change, self.capture_games_only) {
            (false, _) => WindowCapture::Off,
            (true, false) => WindowCapture::AllWindows,
            (true, true) => WindowCapture::GamesOnly,
        }
    }
}

/// One `[[hotkeys]]` entry.
#[derive(Debug, Deserialize, Clone)]
pub struct HotkeyConfig {
    pub id: String,
    /// `+`-separated key names, e.g. `"Ctrl+Shift+F8"`.
    pub keys: String,
    #[serde(default = "default_action")]
    pub action: HotkeyAction,
}

impl Config {
    /// Parses every hotkey entry, skipping (and logging) invalid ones.
    pub fn bindings(&self) -> Vec<HotkeyBinding> {
        let mut bindings: Vec<HotkeyBinding> = Vec::with_capacity(self.hotkeys.len());
        for hk in &self.hotkeys {
            if bindings.iter().any(|b| b.id.0 == hk.id) {
                warn!("Duplicate hotkey id '{}' ignored", hk.id);
                continue;
            }
            match HotkeyBinding::parse(&hk.id, &hk.keys, hk.action) {
                Ok(binding) => bindings.push(binding),
                Err(e) => warn!("Ignoring hotkey: {e}"),
            }
        }
        bindings
    }
}

fn clamp_interval(ms: u64) -> Duration {
    Duration::from_millis(ms.clamp(MIN_INTERVAL_MS, MAX_INTERVAL_MS))
}

/// Loads the config file at `path`, returning `Config::default()` if the file does not exist.
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Watches the parent directory of `path`. Whenever the config file is
/// created or modified, re-parses it and swaps the hotkey bindings in
/// `app_data`. Other settings take effect on restart.
pub async fn watch_config(path: PathBuf, app_data: Arc<SharedAppData>) {
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Event>(16);

    let mut watcher = match RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = watch_tx.blocking_send(event);
            }
        },
        NotifyConfig::default(),
    ) {
        Ok(w) => w,
        Err(e) => {
            error!("Failed to create config watcher: {e}");
            return;
        }
    };

    // Watch the parent directory rather than the file directly so we catch
    // editor-style atomic saves (write-new + rename).
    let watch_dir = match path.parent() {
        Some(d) => d.to_path_buf(),
        None => {
            error!("Config path has no parent directory");
            return;
        }
    };

    if let Err(e) = watcher.watch(&watch_dir, RecursiveMode::NonRecursive) {
        error!("Failed to watch config directory: {e}");
        return;
    }

    while let Some(event) = watch_rx.recv().await {
        if affects_config(&event, &path) {
            reload_bindings(&path, &app_data);
        }
    }
}

fn affects_config(event: &notify::Event, path: &Path) -> bool {
    let is_write = matches!(
        event.kind,
        notify::EventKind::Create(_) | notify::EventKind::Modify(_)
    );
    is_write && event.paths.iter().any(|p| p == path)
}

/// Re-reads `path` and installs its bindings. A file that fails to parse
/// leaves the current bindings in place.
pub fn reload_bindings(path: &Path, app_data: &SharedAppData) {
    match load_or_default(path) {
        Ok(config) => {
            app_data.replace_bindings(config.bindings());
            info!("Config reloaded: {} hotkey binding(s)", app_data.binding_count());
        }
        Err(e) => error!("Failed to reload config: {e:#}"),
    }
}

fn default_tick_ms() -> u64 {
    DEFAULT_TICK_MS
}

fn default_hotkey_poll_ms() -> u64 {
    DEFAULT_HOTKEY_POLL_MS
}

fn default_window_poll_ms() -> u64 {
    DEFAULT_WINDOW_POLL_MS
}

fn default_max_capture_attempts() -> u32 {
    DEFAULT_MAX_CAPTURE_ATTEMPTS
}

fn default_action() -> HotkeyAction {
    HotkeyAction::Capture
}

fn default_hotkeys() -> Vec<HotkeyConfig> {
    vec![HotkeyConfig {
        id: DEFAULT_HOTKEY_ID.to_string(),
        keys: DEFAULT_HOTKEY.to_string(),
        action: HotkeyAction::Capture,
    }]
}
