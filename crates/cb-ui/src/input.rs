//! Keyboard to keypad mapping and frontend hotkeys

use cb_core::config::KeyboardMapping;
use cb_core::Keys;
use egui::{InputState, Key};

/// Keyboard bindings for the emulated keypad
#[derive(Debug, Clone)]
pub struct KeyMap {
    bindings: Vec<(Key, Keys)>,
}

impl KeyMap {
    /// Resolve the key names in `mapping`. Unknown names are skipped.
    pub fn from_config(mapping: &KeyboardMapping) -> Self {
        let mut bindings = Vec::with_capacity(10);
        for (button, key_name) in mapping.entries() {
            let Some(keys) = Keys::from_button_name(button) else {
                continue;
            };
            match Key::from_name(key_name) {
                Some(key) => bindings.push((key, keys)),
                None => tracing::warn!("Unknown key '{}' for button {}", key_name, button),
            }
        }
        Self { bindings }
    }

    /// Keypad state given which keys are down
    pub fn resolve(&self, is_down: impl Fn(Key) -> bool) -> Keys {
        self.bindings
            .iter()
            .filter(|(key, _)| is_down(*key))
            .fold(Keys::empty(), |held, (_, keys)| held | *keys)
    }

    pub fn held(&self, input: &InputState) -> Keys {
        self.resolve(|key| input.key_down(key))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// One-shot frontend actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hotkey {
    SaveSlot(u32),
    LoadSlot(u32),
    TogglePause,
    ToggleIntegerScaling,
    Rewind,
}

const SAVE_KEYS: [Key; 4] = [Key::F1, Key::F2, Key::F3, Key::F4];
const LOAD_KEYS: [Key; 4] = [Key::F5, Key::F6, Key::F7, Key::F8];

/// Hotkeys bound to a key, given which keys were pressed this frame
pub fn hotkeys(pressed: impl Fn(Key) -> bool) -> Vec<Hotkey> {
    let mut actions = Vec::new();
    for (slot, key) in (1..).zip(SAVE_KEYS) {
        if pressed(key) {
            actions.push(Hotkey::SaveSlot(slot));
        }
    }
    for (slot, key) in (1..).zip(LOAD_KEYS) {
        if pressed(key) {
            actions.push(Hotkey::LoadSlot(slot));
        }
    }
    if pressed(Key::P) {
        actions.push(Hotkey::TogglePause);
    }
    if pressed(Key::I) {
        actions.push(Hotkey::ToggleIntegerScaling);
    }
    if pressed(Key::Backtick) {
        actions.push(Hotkey::Rewind);
    }
    actions
}

/// Fast-forward runs while this key is held
pub const FAST_FORWARD_KEY: Key = Key::Tab;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mapping_resolves_every_button() {
        let map = KeyMap::from_config(&KeyboardMapping::default());
        assert_eq!(map.len(), 10);

        let held = map.resolve(|key| matches!(key, Key::X | Key::ArrowLeft));
        assert_eq!(held, Keys::A | Keys::LEFT);
        assert_eq!(map.resolve(|_| false), Keys::empty());
    }

    #[test]
    fn test_unknown_key_names_skipped() {
        let mapping = KeyboardMapping {
            a: "NotAKey".to_string(),
            ..KeyboardMapping::default()
        };
        let map = KeyMap::from_config(&mapping);
        assert_eq!(map.len(), 9);
        assert!(!map.resolve(|_| true).contains(Keys::A));
    }

    #[test]
    fn test_hotkeys() {
        assert_eq!(
            hotkeys(|key| key == Key::F2),
            vec![Hotkey::SaveSlot(2)]
        );
        assert_eq!(
            hotkeys(|key| matches!(key, Key::F8 | Key::P)),
            vec![Hotkey::LoadSlot(4), Hotkey::TogglePause]
        );
        assert!(hotkeys(|key| key == Key::Q).is_empty());
    }
}
