/// Canonical file paths for Glance data files.
///
/// Everything lives under the application data directory:
///   - config.toml  Hotkeys and scheduler settings, read by the daemon.
///   - status.toml  Written by the daemon after window changes and captures.
///   - focus.log    Default window-change log.
///   - captures\    Default PNG output directory.
use std::path::PathBuf;

use anyhow::{Context, Result};

const APP_DIR_NAME: &str = "Glance";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const STATUS_FILE_NAME: &str = "status.toml";
pub const WINDOW_LOG_FILE_NAME: &str = "focus.log";
pub const CAPTURES_DIR_NAME: &str = "captures";

/// Returns the Glance application data directory: `%APPDATA%\Glance` on
/// Windows, `$XDG_CONFIG_HOME/glance` (or `~/.config/glance`) elsewhere.
pub fn app_data_dir() -> Result<PathBuf> {
    #[cfg(windows)]
    {
        let appdata = std::env::var("APPDATA").context("APPDATA environment variable not set")?;
        Ok(PathBuf::from(appdata).join(APP_DIR_NAME))
    }
    #[cfg(not(windows))]
    {
        let base = match std::env::var_os("XDG_CONFIG_HOME") {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => {
                let home = std::env::var_os("HOME").context("HOME environment variable not set")?;
                PathBuf::from(home).join(".config")
            }
        };
        Ok(base.join(APP_DIR_NAME.to_lowercase()))
    }
}

pub fn config_file_path() -> Result<PathBuf> {
    Ok(app_data_dir()?.join(CONFIG_FILE_NAME))
}

pub fn status_file_path() -> Result<PathBuf> {
    Ok(app_data_dir()?.join(STATUS_FILE_NAME))
}

/// The configured window log, or `<app data dir>/focus.log`.
pub fn window_log_path(configured: Option<&str>) -> Result<PathBuf> {
    match configured {
        Some(p) => Ok(PathBuf::from(expand_env(p))),
        None => Ok(app_data_dir()?.join(WINDOW_LOG_FILE_NAME)),
    }
}

/// The configured capture directory, or `<app data dir>/captures`.
pub fn capture_output_dir(configured: Option<&str>) -> Result<PathBuf> {
    match configured {
        Some(p) => Ok(PathBuf::from(expand_env(p))),
        None => Ok(app_data_dir()?.join(CAPTURES_DIR_NAME)),
    }
}

/// Expands common Windows `%VAR%` references.
pub fn expand_env(s: &str) -> String {
    let mut result = s.to_string();
    for var in &["USERPROFILE", "APPDATA", "LOCALAPPDATA", "TEMP", "TMP", "HOME"] {
        if let Ok(val) = std::env::var(var) {
            result = result.replace(&format!("%{var}%"), &val);
        }
    }
    result
}
