//! Keyboard State Tracking
//!
//! Builds [`KeyEvent`]s carrying the full set of held keys, the form the
//! shortcut matcher needs to compare pressed keys against a combination.

use crate::input::events::{KeyAction, KeyCode, KeyEvent, KeyItem, Timestamp};
use tracing::debug;

/// Tracks held keys and produces item-complete key events
#[derive(Debug, Default)]
pub struct KeyboardState {
    /// Currently pressed keys with their down time, in press order
    pressed_keys: Vec<(KeyCode, Timestamp)>,
}

impl KeyboardState {
    /// Create an empty keyboard state
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a key press
    ///
    /// A press of an already held key is an auto-repeat and keeps the
    /// original down time.
    pub fn handle_key_down(&mut self, key_code: KeyCode, action_time: Timestamp) -> KeyEvent {
        let is_repeat = self.is_key_pressed(key_code);
        if !is_repeat {
            self.pressed_keys.push((key_code, action_time));
        }

        debug!(
            "Key down: keycode={}, repeat={}, held={}",
            key_code,
            is_repeat,
            self.pressed_keys.len()
        );

        self.snapshot(key_code, KeyAction::Down, action_time, None)
    }

    /// Record a key release
    pub fn handle_key_up(&mut self, key_code: KeyCode, action_time: Timestamp) -> KeyEvent {
        let released = self.release(key_code, action_time);
        debug!("Key up: keycode={}, held={}", key_code, self.pressed_keys.len());
        self.snapshot(key_code, KeyAction::Up, action_time, Some(released))
    }

    /// Record a cancelled key
    pub fn handle_key_cancel(&mut self, key_code: KeyCode, action_time: Timestamp) -> KeyEvent {
        let released = self.release(key_code, action_time);
        debug!("Key cancel: keycode={}", key_code);
        self.snapshot(key_code, KeyAction::Cancel, action_time, Some(released))
    }

    /// Check if a key is currently pressed
    pub fn is_key_pressed(&self, key_code: KeyCode) -> bool {
        self.pressed_keys.iter().any(|(code, _)| *code == key_code)
    }

    /// Get number of currently pressed keys
    pub fn pressed_key_count(&self) -> usize {
        self.pressed_keys.len()
    }

    /// Reset keyboard state (release all keys)
    pub fn reset(&mut self) {
        self.pressed_keys.clear();
        debug!("Keyboard state reset");
    }

    fn release(&mut self, key_code: KeyCode, action_time: Timestamp) -> KeyItem {
        let down_time = match self.pressed_keys.iter().position(|(code, _)| *code == key_code) {
            Some(index) => self.pressed_keys.remove(index).1,
            None => action_time,
        };
        KeyItem {
            key_code,
            pressed: false,
            down_time,
        }
    }

    fn snapshot(
        &self,
        key_code: KeyCode,
        action: KeyAction,
        action_time: Timestamp,
        released: Option<KeyItem>,
    ) -> KeyEvent {
        let mut event = KeyEvent::new(key_code, action, action_time);
        event.items = self
            .pressed_keys
            .iter()
            .map(|&(code, down_time)| KeyItem {
                key_code: code,
                pressed: true,
                down_time,
            })
            .collect();
        if let Some(item) = released {
            event.items.push(item);
        }
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::events::keycodes::*;

    #[test]
    fn test_key_press_release() {
        let mut state = KeyboardState::new();

        let down = state.handle_key_down(KEYCODE_A, 100);
        assert_eq!(down.action, KeyAction::Down);
        assert_eq!(down.pressed_keys(), vec![KEYCODE_A]);
        assert_eq!(state.pressed_key_count(), 1);

        let up = state.handle_key_up(KEYCODE_A, 400);
        assert_eq!(up.action, KeyAction::Up);
        assert!(up.pressed_keys().is_empty());
        assert_eq!(up.key_item().map(|item| item.down_time), Some(100));
        assert_eq!(state.pressed_key_count(), 0);
    }

    #[test]
    fn test_combination_snapshot() {
        let mut state = KeyboardState::new();
        state.handle_key_down(KEYCODE_CTRL_LEFT, 0);
        state.handle_key_down(KEYCODE_SHIFT_LEFT, 10);
        let event = state.handle_key_down(KEYCODE_S, 20);

        assert_eq!(
            event.pressed_keys(),
            vec![KEYCODE_CTRL_LEFT, KEYCODE_SHIFT_LEFT, KEYCODE_S]
        );

        let up = state.handle_key_up(KEYCODE_SHIFT_LEFT, 30);
        assert_eq!(up.pressed_keys(), vec![KEYCODE_CTRL_LEFT, KEYCODE_S]);
    }

    #[test]
    fn test_auto_repeat_keeps_down_time() {
        let mut state = KeyboardState::new();
        state.handle_key_down(KEYCODE_POWER, 1_000);
        let repeat = state.handle_key_down(KEYCODE_POWER, 600_000);

        assert_eq!(state.pressed_key_count(), 1);
        assert_eq!(repeat.key_item().map(|item| item.down_time), Some(1_000));
    }

    #[test]
    fn test_cancel_and_reset() {
        let mut state = KeyboardState::new();
        state.handle_key_down(KEYCODE_A, 0);
        state.handle_key_down(KEYCODE_B, 0);

        let cancel = state.handle_key_cancel(KEYCODE_A, 5);
        assert_eq!(cancel.action, KeyAction::Cancel);
        assert!(!state.is_key_pressed(KEYCODE_A));

        state.reset();
        assert_eq!(state.pressed_key_count(), 0);
    }
}
