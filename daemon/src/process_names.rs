//! Resolves the process that owns a window: its executable name, its full
//! image path, and whether that path points into a game library.
use std::path::{Path, PathBuf};

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

/// Directory name Steam installs games under (`...\steamapps\common\<game>`).
const GAME_LIBRARY_DIR: &str = "steamapps";

/// The owning process of a foreground window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwningProcess {
    /// Executable file name, e.g. `"notepad.exe"`.
    pub name: String,
    /// Full image path, when the platform lets us read it.
    pub path: Option<PathBuf>,
}

impl OwningProcess {
    pub fn is_game(&self) -> bool {
        self.path.as_deref().is_some_and(is_game_path)
    }
}

/// Whether `path` lies inside a Steam library. Matching is case-insensitive
/// and accepts either separator.
pub fn is_game_path(path: &Path) -> bool {
    let normalized = path.to_string_lossy().replace('\\', "/").to_ascii_lowercase();
    normalized.split('/').any(|component| component == GAME_LIBRARY_DIR)
}

/// Caches a [`System`] between lookups; only the queried pid is refreshed.
pub struct ProcessNames {
    sys: System,
}

impl ProcessNames {
    pub fn new() -> Self {
        Self { sys: System::new() }
    }

    /// Name and image path of `pid`, if it is still running.
    pub fn lookup(&mut self, pid: u32) -> Option<OwningProcess> {
        let pid = Pid::from_u32(pid);
        self.sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::new().with_exe(UpdateKind::OnlyIfNotSet),
        );
        let process = self.sys.process(pid)?;
        let name = process.name().to_string_lossy().into_owned();
        if name.is_empty() {
            return None;
        }
        Some(OwningProcess { name, path: process.exe().map(Path::to_path_buf) })
    }
}

impl Default for ProcessNames {
    fn default() -> Self {
        Self::new()
    }
}
