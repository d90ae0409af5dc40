//! State shared between the polling tasks, the dispatcher and the capturer.
//!
//! Every read-modify-write sequence happens inside one method holding the
//! lock, so window-change detection, hotkey edge detection and the capture
//! guard never lose updates to each other.
use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::event::{HotkeyId, WindowId};
use crate::hotkey::{HotkeyAction, HotkeyBinding, KeyCode};

/// A top-level window as reported by the desktop query layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub id: WindowId,
    pub title: String,
    /// Owning process, if the platform reports one.
    pub pid: Option<u32>,
}

/// The foreground window before and after a detected change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowTransition {
    pub previous: Option<WindowInfo>,
    pub current: WindowInfo,
}

#[derive(Debug, Default)]
pub struct ApplicationData {
    pub current_window: Option<WindowInfo>,
    pub previous_window: Option<WindowInfo>,
    pub hotkey_bindings: BTreeMap<HotkeyId, HotkeyBinding>,
    pub capture_in_flight: bool,
}

/// [`ApplicationData`] behind its lock.
#[derive(Debug, Default)]
pub struct SharedAppData {
    inner: Mutex<ApplicationData>,
}

impl SharedAppData {
    pub fn new(bindings: Vec<HotkeyBinding>) -> Self {
        let data = ApplicationData {
            hotkey_bindings: bindings.into_iter().map(|b| (b.id.clone(), b)).collect(),
            ..ApplicationData::default()
        };
        Self { inner: Mutex::new(data) }
    }

    // ── Foreground window ─────────────────────────────────────────────────────

    /// Records `window` as the foreground window if its id differs from the
    /// current one, shifting the old value into `previous_window`.
    ///
    /// Same id again is not a transition: `previous_window` is left alone and
    /// `None` is returned. A new title for the same window is still stored.
    pub fn observe_foreground(&self, window: WindowInfo) -> Option<WindowTransition> {
        let mut data = self.inner.lock();
        if let Some(cur) = data.current_window.as_mut().filter(|cur| cur.id == window.id) {
            cur.title = window.title;
            cur.pid = window.pid;
            return None;
        }
        data.previous_window = data.current_window.replace(window.clone());
        Some(WindowTransition { previous: data.previous_window.clone(), current: window })
    }

    #[cfg(test)]
    pub fn current_window(&self) -> Option<WindowInfo> {
        self.inner.lock().current_window.clone()
    }

    #[cfg(test)]
    pub fn previous_window(&self) -> Option<WindowInfo> {
        self.inner.lock().previous_window.clone()
    }

    // ── Hotkeys ───────────────────────────────────────────────────────────────

    /// Evaluates every binding against `is_down` and returns the ids whose
    /// combination went from released to pressed since the last call.
    ///
    /// Held state is committed only if every key query succeeds; on error the
    /// bindings are left exactly as they were.
    pub fn hotkey_edges<E>(
        &self,
        mut is_down: impl FnMut(KeyCode) -> Result<bool, E>,
    ) -> Result<Vec<HotkeyId>, E> {
        let mut data = self.inner.lock();

        let mut pressed = Vec::with_capacity(data.hotkey_bindings.len());
        for binding in data.hotkey_bindings.values() {
            let mut all_down = true;
            for &key in &binding.keys {
                if !is_down(key)? {
                    all_down = false;
                    break;
                }
            }
            pressed.push(all_down);
        }

        let mut edges = Vec::new();
        for (binding, now_down) in data.hotkey_bindings.values_mut().zip(pressed) {
            if now_down && !binding.held {
                edges.push(binding.id.clone());
            }
            binding.held = now_down;
        }
        Ok(edges)
    }

    pub fn binding_action(&self, id: &HotkeyId) -> Option<HotkeyAction> {
        self.inner.lock().hotkey_bindings.get(id).map(|b| b.action)
    }

    /// Swaps in a new binding table. Bindings whose id and keys are unchanged
    /// keep their held state so a key held across a reload does not re-fire.
    pub fn replace_bindings(&self, bindings: Vec<HotkeyBinding>) {
        let mut data = self.inner.lock();
        let table: BTreeMap<_, _> = bindings
            .into_iter()
            .map(|mut b| {
                if let Some(old) = data.hotkey_bindings.get(&b.id) {
                    if old.keys == b.keys {
                        b.held = old.held;
                    }
                }
                (b.id.clone(), b)
            })
            .collect();
        data.hotkey_bindings = table;
    }

    pub fn binding_count(&self) -> usize {
        self.inner.lock().hotkey_bindings.len()
    }

    // ── Capture guard ─────────────────────────────────────────────────────────

    /// Claims the capture slot. Returns `false` if a capture is already in flight.
    pub fn try_begin_capture(&self) -> bool {
        let mut data = self.inner.lock();
        if data.capture_in_flight {
            return false;
        }
        data.capture_in_flight = true;
        true
    }

    pub fn finish_capture(&self) {
        self.inner.lock().capture_in_flight = false;
    }

    pub fn capture_in_flight(&self) -> bool {
        self.inner.lock().capture_in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn window(id: &str, title: &str) -> WindowInfo {
        WindowInfo { id: WindowId::from(id), title: title.to_string(), pid: None }
    }

    fn binding(id: &str, trigger: &str) -> HotkeyBinding {
        HotkeyBinding::parse(id, trigger, HotkeyAction::Capture).unwrap()
    }

    fn down(keys: &[u32]) -> impl FnMut(KeyCode) -> Result<bool, ()> + '_ {
        move |k| Ok(keys.contains(&k.0))
    }

    // ── observe_foreground ────────────────────────────────────────────────────

    #[test]
    fn first_observation_is_a_transition_without_previous() {
        let data = SharedAppData::default();
        let t = data.observe_foreground(window("A", "Editor")).unwrap();
        assert_eq!(t.previous, None);
        assert_eq!(t.current.id, WindowId::from("A"));
        assert_eq!(data.current_window().unwrap().title, "Editor");
    }

    #[test]
    fn change_shifts_current_into_previous() {
        let data = SharedAppData::default();
        data.observe_foreground(window("A", "Editor"));
        let t = data.observe_foreground(window("B", "Notepad")).unwrap();
        assert_eq!(t.previous.unwrap().id, WindowId::from("A"));
        assert_eq!(data.previous_window().unwrap().id, WindowId::from("A"));
        assert_eq!(data.current_window().unwrap().id, WindowId::from("B"));
    }

    #[test]
    fn same_window_twice_changes_nothing() {
        let data = SharedAppData::default();
        data.observe_foreground(window("A", "Editor"));
        data.observe_foreground(window("B", "Notepad"));
        assert!(data.observe_foreground(window("B", "Notepad")).is_none());
        assert_eq!(data.previous_window().unwrap().id, WindowId::from("A"));
    }

    #[test]
    fn title_change_on_same_window_is_not_a_transition() {
        let data = SharedAppData::default();
        data.observe_foreground(window("A", "Editor"));
        data.observe_foreground(window("B", "tab1 - Browser"));

        assert!(data.observe_foreground(window("B", "tab2 - Browser")).is_none());

        assert_eq!(data.previous_window().unwrap().id, WindowId::from("A"));
        let current = data.current_window().unwrap();
        assert_eq!(current.id, WindowId::from("B"));
        assert_eq!(current.title, "tab2 - Browser");
    }

    // ── hotkey_edges ──────────────────────────────────────────────────────────

    #[test]
    fn edge_fires_once_while_held() {
        let data = SharedAppData::new(vec![binding("snap", "F8")]);
        let mut fired = 0;
        for _ in 0..5 {
            fired += data.hotkey_edges(down(&[0x77])).unwrap().len();
        }
        assert_eq!(fired, 1);
    }

    #[test]
    fn release_rearms_the_binding() {
        let data = SharedAppData::new(vec![binding("snap", "F8")]);
        assert_eq!(data.hotkey_edges(down(&[0x77])).unwrap().len(), 1);
        assert!(data.hotkey_edges(down(&[])).unwrap().is_empty());
        assert_eq!(data.hotkey_edges(down(&[0x77])).unwrap(), vec![HotkeyId::from("snap")]);
    }

    #[test]
    fn combination_needs_every_key() {
        let data = SharedAppData::new(vec![binding("snap", "Ctrl+F8")]);
        assert!(data.hotkey_edges(down(&[0x77])).unwrap().is_empty());
        assert!(data.hotkey_edges(down(&[0x11])).unwrap().is_empty());
        assert_eq!(data.hotkey_edges(down(&[0x11, 0x77])).unwrap().len(), 1);
    }

    #[test]
    fn simultaneous_bindings_all_fire() {
        let data = SharedAppData::new(vec![binding("a", "F1"), binding("b", "F2")]);
        let edges: HashSet<_> =
            data.hotkey_edges(down(&[0x70, 0x71])).unwrap().into_iter().collect();
        assert_eq!(edges, HashSet::from([HotkeyId::from("a"), HotkeyId::from("b")]));
    }

    #[test]
    fn failed_query_commits_no_held_state() {
        let data = SharedAppData::new(vec![binding("a", "F1"), binding("b", "F2")]);
        let result = data.hotkey_edges(|k| if k.0 == 0x71 { Err("boom") } else { Ok(true) });
        assert_eq!(result, Err("boom"));
        // "a" was seen down before the failure but must still fire next time.
        assert_eq!(data.hotkey_edges(down(&[0x70])).unwrap(), vec![HotkeyId::from("a")]);
    }

    // ── bindings ──────────────────────────────────────────────────────────────

    #[test]
    fn binding_action_looks_up_by_id() {
        let data = SharedAppData::new(vec![
            binding("snap", "F8"),
            HotkeyBinding::parse("quit", "Ctrl+Q", HotkeyAction::Quit).unwrap(),
        ]);
        assert_eq!(data.binding_action(&HotkeyId::from("snap")), Some(HotkeyAction::Capture));
        assert_eq!(data.binding_action(&HotkeyId::from("quit")), Some(HotkeyAction::Quit));
        assert_eq!(data.binding_action(&HotkeyId::from("missing")), None);
    }

    #[test]
    fn replace_bindings_keeps_held_state_for_unchanged_keys() {
        let data = SharedAppData::new(vec![binding("snap", "F8"), binding("other", "F9")]);
        data.hotkey_edges(down(&[0x77, 0x78])).unwrap();

        // "snap" unchanged, "other" rebound to a different key.
        data.replace_bindings(vec![binding("snap", "F8"), binding("other", "F10")]);

        // Still holding F8: no re-fire. F10 is a fresh binding and fires.
        let edges = data.hotkey_edges(down(&[0x77, 0x79])).unwrap();
        assert_eq!(edges, vec![HotkeyId::from("other")]);
        assert_eq!(data.binding_count(), 2);
    }

    // ── capture guard ─────────────────────────────────────────────────────────

    #[test]
    fn capture_slot_is_exclusive_until_finished() {
        let data = SharedAppData::default();
        assert!(data.try_begin_capture());
        assert!(data.capture_in_flight());
        assert!(!data.try_begin_capture());
        data.finish_capture();
        assert!(!data.capture_in_flight());
        assert!(data.try_begin_capture());
    }
}
