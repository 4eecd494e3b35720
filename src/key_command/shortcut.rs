//! Shortcut (combination key) matching
//!
//! A shortcut is a set of pre-keys held while a final key is pressed or
//! released. It matches when the acting key is the final key, the action is
//! the trigger action and the held keys are exactly the pre-keys plus the
//! final key. Down shortcuts with a key-down duration arm a hold timer and
//! launch only if the keys are still held when it fires.

use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

use crate::dispatch::{Ability, LaunchSource};
use crate::engine::EngineContext;
use crate::input::error::{InputError, Result};
use crate::input::events::{KeyAction, KeyCode, KeyEvent};
use crate::timer::{TimerId, TimerTarget};

/// Combination key bound to an ability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutKey {
    pub pre_keys: BTreeSet<KeyCode>,
    pub final_key: KeyCode,
    pub trigger_type: KeyAction,
    pub key_down_duration_ms: u64,
    pub business_id: Option<String>,
    pub status_config: Option<String>,
    pub enabled: bool,
    pub ability: Ability,
    pub(crate) timer: Option<TimerId>,
}

impl ShortcutKey {
    pub fn new(
        pre_keys: impl IntoIterator<Item = KeyCode>,
        final_key: KeyCode,
        trigger_type: KeyAction,
        ability: Ability,
    ) -> Self {
        Self {
            pre_keys: pre_keys.into_iter().collect(),
            final_key,
            trigger_type,
            key_down_duration_ms: 0,
            business_id: None,
            status_config: None,
            enabled: true,
            ability,
            timer: None,
        }
    }

    pub fn with_duration(mut self, key_down_duration_ms: u64) -> Self {
        self.key_down_duration_ms = key_down_duration_ms;
        self
    }

    pub fn with_business_id(mut self, business_id: impl Into<String>) -> Self {
        self.business_id = Some(business_id.into());
        self
    }

    pub fn with_status_config(mut self, key: impl Into<String>) -> Self {
        self.status_config = Some(key.into());
        self
    }

    /// Whether `event` completes this combination
    pub fn matches(&self, event: &KeyEvent) -> bool {
        if event.key_code != self.final_key || event.action != self.trigger_type {
            return false;
        }

        let mut held: BTreeSet<KeyCode> = event.pressed_keys().into_iter().collect();
        if event.action != KeyAction::Down {
            // The released final key is no longer reported as pressed
            held.insert(event.key_code);
        }
        held.remove(&self.final_key);
        held == self.pre_keys
    }

    fn describe(&self) -> String {
        format!("{:?}+{} ({})", self.pre_keys, self.final_key, self.trigger_type)
    }
}

/// Shortcut matcher state
#[derive(Debug, Default)]
pub struct ShortcutTable {
    keys: Vec<ShortcutKey>,
    /// Shortcut whose hold timer is armed
    last_matched: Option<usize>,
    /// Shortcut launched by its hold timer whose final key is still down
    current_launch: Option<usize>,
    duration_overrides: HashMap<String, u64>,
    launches: u64,
    dropped: u64,
}

impl ShortcutTable {
    pub fn new(keys: Vec<ShortcutKey>) -> Self {
        Self {
            keys,
            ..Self::default()
        }
    }

    pub fn keys(&self) -> &[ShortcutKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn launches(&self) -> u64 {
        self.launches
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Override the key-down duration of every shortcut with `business_id`
    pub fn set_duration_override(&mut self, business_id: &str, duration_ms: u64) -> Result<()> {
        if !self
            .keys
            .iter()
            .any(|key| key.business_id.as_deref() == Some(business_id))
        {
            return Err(InputError::InvalidParameter(format!(
                "unknown business id: {business_id}"
            )));
        }
        self.duration_overrides
            .insert(business_id.to_string(), duration_ms);
        info!("Key-down duration of {} set to {}ms", business_id, duration_ms);
        Ok(())
    }

    /// Apply a feature-flag change; returns the number of shortcuts updated
    pub fn set_flag(&mut self, key: &str, value: bool) -> usize {
        let mut updated = 0;
        for shortcut in self
            .keys
            .iter_mut()
            .filter(|shortcut| shortcut.status_config.as_deref() == Some(key))
        {
            shortcut.enabled = value;
            updated += 1;
        }
        updated
    }

    /// Feed a key event; returns whether it is consumed
    pub fn handle(&mut self, event: &KeyEvent, ctx: &mut EngineContext<'_>) -> bool {
        if let Some(index) = self.last_matched {
            if self.keys[index].matches(event) {
                debug!("Shortcut {} waiting for hold timer", self.keys[index].describe());
                return true;
            }
        }
        if let Some(index) = self.current_launch {
            if self.keys[index].matches(event) {
                debug!("Shortcut {} already launched", self.keys[index].describe());
                return true;
            }
        }

        if let Some(index) = self.last_matched.take() {
            if let Some(id) = self.keys[index].timer.take() {
                ctx.timers.remove_timer(id);
            }
        }

        let mut handled = false;
        for index in 0..self.keys.len() {
            self.apply_duration_override(index);
            let shortcut = &self.keys[index];
            if !shortcut.enabled || !shortcut.matches(event) {
                continue;
            }

            handled = match event.action {
                KeyAction::Down => self.handle_key_down(index, ctx) || handled,
                KeyAction::Up => self.handle_key_up(index, event, ctx) || handled,
                KeyAction::Cancel => {
                    if let Some(id) = self.keys[index].timer.take() {
                        ctx.timers.remove_timer(id);
                    }
                    handled
                }
            };
        }

        handled || self.handle_consumed_key(event, ctx)
    }

    /// Hold timer fired
    pub fn on_hold_timer(&mut self, index: usize, id: TimerId, ctx: &mut EngineContext<'_>) {
        let Some(shortcut) = self.keys.get_mut(index) else {
            return;
        };
        if shortcut.timer != Some(id) {
            debug!("Ignoring stale shortcut {}", id);
            return;
        }
        shortcut.timer = None;

        debug!("Hold timer fired for {}", shortcut.describe());
        self.current_launch = Some(index);
        self.launch(index, ctx);
    }

    fn handle_key_down(&mut self, index: usize, ctx: &mut EngineContext<'_>) -> bool {
        let duration = self.keys[index].key_down_duration_ms;
        if duration == 0 {
            self.launch(index, ctx);
            return true;
        }

        match ctx
            .timers
            .add_timer(duration, 1, TimerTarget::ShortcutHold(index))
        {
            Ok(id) => {
                debug!("Shortcut {} armed for {}ms", self.keys[index].describe(), duration);
                self.keys[index].timer = Some(id);
                self.last_matched = Some(index);
                true
            }
            Err(e) => {
                warn!("Dropping shortcut {}: {}", self.keys[index].describe(), e);
                self.dropped += 1;
                false
            }
        }
    }

    fn handle_key_up(&mut self, index: usize, event: &KeyEvent, ctx: &mut EngineContext<'_>) -> bool {
        let shortcut = &self.keys[index];
        let Some(item) = event.key_item() else {
            return false;
        };

        if shortcut.key_down_duration_ms == 0 {
            self.launch(index, ctx);
            return true;
        }

        let held_us = event.action_time - item.down_time;
        if held_us < (shortcut.key_down_duration_ms as i64) * 1000 {
            self.launch(index, ctx);
            return true;
        }

        debug!(
            "Shortcut {} held {}us, longer than {}ms",
            shortcut.describe(),
            held_us,
            shortcut.key_down_duration_ms
        );
        false
    }

    /// Replace the Up of a launched shortcut's final key with a Cancel
    fn handle_consumed_key(&mut self, event: &KeyEvent, ctx: &mut EngineContext<'_>) -> bool {
        let Some(index) = self.current_launch else {
            return false;
        };
        if event.key_code != self.keys[index].final_key || event.action != KeyAction::Up {
            return false;
        }

        debug!("Cancelling consumed key {}", event.key_code);
        self.current_launch = None;
        ctx.forward(event.with_action(KeyAction::Cancel));
        true
    }

    fn launch(&mut self, index: usize, ctx: &mut EngineContext<'_>) {
        if ctx.launch(&self.keys[index].ability, 0, LaunchSource::Shortcut) {
            self.launches += 1;
        }
        self.last_matched = None;
    }

    fn apply_duration_override(&mut self, index: usize) {
        let shortcut = &mut self.keys[index];
        if let Some(duration) = shortcut
            .business_id
            .as_ref()
            .and_then(|id| self.duration_overrides.get(id))
        {
            shortcut.key_down_duration_ms = *duration;
        }
    }
}
