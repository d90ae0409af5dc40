//! Hotkey trigger parsing.
//!
//! A trigger is a `+`-separated list of key names, e.g. `"Ctrl+Shift+F8"`.
//! Key names map to Windows virtual-key codes, which double as the portable
//! [`KeyCode`] the desktop query layer understands.
use serde::Deserialize;

use crate::error::HotkeyParseError;
use crate::event::HotkeyId;

/// A virtual-key code (Windows `VK_*` numbering).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCode(pub u32);

/// What the daemon does when a binding fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HotkeyAction {
    /// Request a screen capture.
    Capture,
    /// Stop the event loop and exit.
    Quit,
}

/// A parsed binding as stored in the shared application data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotkeyBinding {
    pub id: HotkeyId,
    /// All of these must be down for the binding to count as pressed.
    pub keys: Vec<KeyCode>,
    pub action: HotkeyAction,
    /// Whether the combination was down at the previous poll.
    pub held: bool,
}

impl HotkeyBinding {
    /// Parses `trigger` into a released binding.
    pub fn parse(id: &str, trigger: &str, action: HotkeyAction) -> Result<Self, HotkeyParseError> {
        let mut keys = Vec::new();
        for name in trigger.split('+').map(str::trim).filter(|s| !s.is_empty()) {
            let code = parse_vk(name).ok_or_else(|| HotkeyParseError::UnknownKey {
                id: id.to_string(),
                key: name.to_string(),
            })?;
            if keys.contains(&KeyCode(code)) {
                return Err(HotkeyParseError::DuplicateKey {
                    id: id.to_string(),
                    key: name.to_string(),
                });
            }
            keys.push(KeyCode(code));
        }
        if keys.is_empty() {
            return Err(HotkeyParseError::Empty { id: id.to_string() });
        }
        Ok(Self { id: HotkeyId::from(id), keys, action, held: false })
    }
}

/// Converts a key name (e.g. `"F8"`, `"Ctrl"`, `"A"`) to a Windows virtual-key code.
///
/// Supported keys:
/// - Function keys `F1`–`F24` (case-insensitive).
/// - ASCII letters `A`–`Z` and digits `0`–`9`.
/// - Modifiers `Ctrl`/`Control`, `Shift`, `Alt`, `Win`.
/// - A handful of named keys (`Space`, `Enter`, `PrintScreen`, …).
///
/// Returns `None` for any unrecognised name.
pub fn parse_vk(name: &str) -> Option<u32> {
    let upper = name.to_uppercase();
    match upper.as_str() {
        "CTRL" | "CONTROL" => Some(0x11),
        "SHIFT" => Some(0x10),
        "ALT" => Some(0x12),
        "WIN" | "SUPER" => Some(0x5B),
        "SPACE" => Some(0x20),
        "ENTER" | "RETURN" => Some(0x0D),
        "TAB" => Some(0x09),
        "ESC" | "ESCAPE" => Some(0x1B),
        "PRINTSCREEN" | "PRTSC" => Some(0x2C),
        "PAGEUP" => Some(0x21),
        "PAGEDOWN" => Some(0x22),
        "END" => Some(0x23),
        "HOME" => Some(0x24),
        "INSERT" => Some(0x2D),
        "DELETE" => Some(0x2E),
        s if s.len() > 1 && s.starts_with('F') => match s[1..].parse::<u32>() {
            // F1=0x70 … F24=0x87
            Ok(n @ 1..=24) => Some(0x6F + n),
            _ => None,
        },
        s if s.len() == 1 => {
            let c = s.chars().next()?;
            if c.is_ascii_alphanumeric() {
                // 'A'=0x41…'Z'=0x5A; '0'=0x30…'9'=0x39: same as the Windows VK codes.
                Some(c as u32)
            } else {
                None
            }
        }
        _ => None,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
