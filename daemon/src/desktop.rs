//! Desktop state queries used by the polling tasks: key state and the
//! foreground window.
//!
//! On Windows these are bounded, non-blocking Win32 calls. On other platforms
//! [`SystemDesktop`] compiles but every query fails with
//! [`OsQueryError::Unsupported`], which the scheduler logs and retries.
use crate::app_data::WindowInfo;
use crate::error::OsQueryError;
use crate::hotkey::KeyCode;

pub trait DesktopQuery: Send + Sync {
    /// Whether `key` is currently held down.
    fn key_state(&self, key: KeyCode) -> Result<bool, OsQueryError>;

    /// The window holding input focus, or `None` if no window has it
    /// (e.g. the workstation is locked).
    fn foreground_window(&self) -> Result<Option<WindowInfo>, OsQueryError>;
}

/// The host desktop.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDesktop;

impl DesktopQuery for SystemDesktop {
    fn key_state(&self, key: KeyCode) -> Result<bool, OsQueryError> {
        #[cfg(windows)]
        {
            Ok(imp::key_down(key.0))
        }
        #[cfg(not(windows))]
        {
            let _ = key;
            Err(OsQueryError::Unsupported("key state query"))
        }
    }

    fn foreground_window(&self) -> Result<Option<WindowInfo>, OsQueryError> {
        #[cfg(windows)]
        {
            Ok(imp::foreground_window())
        }
        #[cfg(not(windows))]
        {
            Err(OsQueryError::Unsupported("foreground window query"))
        }
    }
}

// ── Windows implementation ────────────────────────────────────────────────────

#[cfg(windows)]
mod imp {
    use windows::Win32::UI::Input::KeyboardAndMouse::GetAsyncKeyState;
    use windows::Win32::UI::WindowsAndMessaging::{
        GetForegroundWindow, GetWindowTextW, GetWindowThreadProcessId,
    };

    use crate::app_data::WindowInfo;
    use crate::event::WindowId;

    /// Window titles longer than this are truncated.
    const MAX_TITLE_LEN: usize = 512;

    /// Tests the high-order bit of `GetAsyncKeyState`, which is set while the
    /// key is physically down regardless of which window has focus.
    pub fn key_down(vk: u32) -> bool {
        let state = unsafe { GetAsyncKeyState(vk as i32) };
        (state as u16 & 0x8000) != 0
    }

    pub fn foreground_window() -> Option<WindowInfo> {
        unsafe {
            let hwnd = GetForegroundWindow();
            if hwnd.is_invalid() {
                return None;
            }

            let mut buf = [0u16; MAX_TITLE_LEN];
            let len = GetWindowTextW(hwnd, &mut buf).max(0) as usize;
            let title = String::from_utf16_lossy(&buf[..len]);

            let mut pid = 0u32;
            GetWindowThreadProcessId(hwnd, Some(&mut pid));

            Some(WindowInfo {
                id: WindowId(format!("{:?}", hwnd.0)),
                title,
                pid: (pid != 0).then_some(pid),
            })
        }
    }
}
