use crate::key::Key;

/// Anything that can report whether a key is physically held right now.
///
/// The platform layer implements this over its OS event stream; tests use a
/// plain set of keys.
pub trait KeySource {
    fn is_down(&self, key: Key) -> bool;
}

impl KeySource for std::collections::HashSet<Key> {
    fn is_down(&self, key: Key) -> bool {
        self.contains(&key)
    }
}

/// Keyboard tables recomputed every frame.
///
/// `down` is the sampled state, `pressed` is true only on the frame a key goes
/// from up to down, and `down_last_frame` feeds the next edge computation.
#[derive(Debug, Clone)]
pub struct InputState {
    down: [bool; Key::COUNT],
    pressed: [bool; Key::COUNT],
    down_last_frame: [bool; Key::COUNT],
}

impl Default for InputState {
    fn default() -> Self {
        Self {
            down: [false; Key::COUNT],
            pressed: [false; Key::COUNT],
            down_last_frame: [false; Key::COUNT],
        }
    }
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample every tracked key. Call once per frame before reading.
    pub fn update(&mut self, source: &impl KeySource) {
        for key in Key::ALL {
            let i = key.index();
            self.down[i] = source.is_down(key);
            self.pressed[i] = self.down[i] && !self.down_last_frame[i];
            self.down_last_frame[i] = self.down[i];
            if self.pressed[i] {
                tracing::trace!("key pressed: {key}");
            }
        }
    }

    /// True only on the frame `key` went down.
    pub fn key_pressed(&self, key: Key) -> bool {
        self.pressed[key.index()]
    }

    /// True every frame `key` is held.
    pub fn key_down(&self, key: Key) -> bool {
        self.down[key.index()]
    }

    /// Raw-index read; indices outside the table read as not held.
    pub fn key_down_index(&self, index: usize) -> bool {
        Key::from_index(index).is_some_and(|key| self.key_down(key))
    }

    /// Raw-index read; indices outside the table read as not pressed.
    pub fn key_pressed_index(&self, index: usize) -> bool {
        Key::from_index(index).is_some_and(|key| self.key_pressed(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn held(keys: &[Key]) -> HashSet<Key> {
        keys.iter().copied().collect()
    }

    #[test]
    fn pressed_fires_on_the_transition_frame_only() {
        let mut input = InputState::new();
        let none = held(&[]);
        let h = held(&[Key::H]);

        input.update(&none);
        assert!(!input.key_pressed(Key::H));
        assert!(!input.key_down(Key::H));

        input.update(&h);
        assert!(input.key_pressed(Key::H));
        assert!(input.key_down(Key::H));

        for _ in 0..5 {
            input.update(&h);
            assert!(!input.key_pressed(Key::H));
            assert!(input.key_down(Key::H));
        }

        input.update(&none);
        assert!(!input.key_pressed(Key::H));
        assert!(!input.key_down(Key::H));

        input.update(&h);
        assert!(input.key_pressed(Key::H));
    }

    #[test]
    fn keys_are_tracked_independently() {
        let mut input = InputState::new();
        input.update(&held(&[Key::W]));
        input.update(&held(&[Key::W, Key::Escape]));
        assert!(!input.key_pressed(Key::W));
        assert!(input.key_pressed(Key::Escape));
        assert!(input.key_down(Key::W));
        assert!(!input.key_down(Key::A));
    }

    #[test]
    fn out_of_range_indices_read_false() {
        let mut input = InputState::new();
        input.update(&held(&Key::ALL));
        assert!(input.key_down_index(Key::A.index()));
        assert!(input.key_pressed_index(Key::F12.index()));
        assert!(!input.key_down_index(Key::COUNT));
        assert!(!input.key_pressed_index(Key::COUNT + 100));
    }

    #[test]
    fn fresh_state_reports_nothing() {
        let input = InputState::new();
        assert!(Key::ALL.iter().all(|&k| !input.key_down(k) && !input.key_pressed(k)));
    }
}
