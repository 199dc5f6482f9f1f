//! Keypad state shared between control callers and the core thread

use bitflags::bitflags;
use std::sync::atomic::{AtomicU32, Ordering};

bitflags! {
    /// Emulated keypad buttons, in the core's bit order
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Keys: u32 {
        const A = 1 << 0;
        const B = 1 << 1;
        const SELECT = 1 << 2;
        const START = 1 << 3;
        const RIGHT = 1 << 4;
        const LEFT = 1 << 5;
        const UP = 1 << 6;
        const DOWN = 1 << 7;
        const R = 1 << 8;
        const L = 1 << 9;
    }
}

impl Keys {
    /// Drop both directions of an axis when they are held together.
    pub fn without_opposing(self) -> Self {
        let mut keys = self;
        if keys.contains(Keys::LEFT | Keys::RIGHT) {
            keys.remove(Keys::LEFT | Keys::RIGHT);
        }
        if keys.contains(Keys::UP | Keys::DOWN) {
            keys.remove(Keys::UP | Keys::DOWN);
        }
        keys
    }

    /// Look up a single button by its lowercase name.
    pub fn from_button_name(name: &str) -> Option<Self> {
        Self::from_name(&name.to_ascii_uppercase())
    }
}

/// Atomic keypad bitmask.
///
/// Every mutation is one read-modify-write on a single word, so a reader
/// always observes a mask that some sequence of whole updates produced.
#[derive(Debug, Default)]
pub struct KeyState {
    bits: AtomicU32,
}

impl KeyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole mask
    pub fn set(&self, keys: Keys) {
        self.bits.store(keys.bits(), Ordering::Release);
    }

    /// OR bits into the mask
    pub fn add(&self, keys: Keys) {
        self.bits.fetch_or(keys.bits(), Ordering::AcqRel);
    }

    /// Clear bits from the mask
    pub fn clear(&self, keys: Keys) {
        self.bits.fetch_and(!keys.bits(), Ordering::AcqRel);
    }

    /// Single consistent snapshot of the mask
    pub fn snapshot(&self) -> Keys {
        Keys::from_bits_retain(self.bits.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_set_add_clear() {
        let state = KeyState::new();
        state.set(Keys::A | Keys::START);
        state.add(Keys::UP);
        assert_eq!(state.snapshot(), Keys::A | Keys::START | Keys::UP);

        state.clear(Keys::A | Keys::UP);
        assert_eq!(state.snapshot(), Keys::START);

        state.set(Keys::empty());
        assert!(state.snapshot().is_empty());
    }

    #[test]
    fn test_opposing_directions_filtered() {
        let keys = Keys::LEFT | Keys::RIGHT | Keys::UP | Keys::A;
        assert_eq!(keys.without_opposing(), Keys::UP | Keys::A);

        let keys = Keys::UP | Keys::DOWN;
        assert!(keys.without_opposing().is_empty());
    }

    #[test]
    fn test_button_names() {
        assert_eq!(Keys::from_button_name("select"), Some(Keys::SELECT));
        assert_eq!(Keys::from_button_name("l"), Some(Keys::L));
        assert_eq!(Keys::from_button_name("turbo"), None);
    }

    #[test]
    fn test_concurrent_updates_never_tear() {
        // Each writer owns disjoint bits and toggles them as a unit, so any
        // snapshot must contain either all or none of a writer's bits.
        let state = Arc::new(KeyState::new());
        let groups = [Keys::A | Keys::B, Keys::UP | Keys::DOWN, Keys::L | Keys::R];

        let writers: Vec<_> = groups
            .iter()
            .map(|&group| {
                let state = Arc::clone(&state);
                std::thread::spawn(move || {
                    for _ in 0..10_000 {
                        state.add(group);
                        state.clear(group);
                    }
                })
            })
            .collect();

        for _ in 0..10_000 {
            let snapshot = state.snapshot();
            for group in groups {
                let held = snapshot & group;
                assert!(held.is_empty() || held == group, "torn mask {:?}", snapshot);
            }
        }

        for writer in writers {
            writer.join().unwrap();
        }
    }
}
