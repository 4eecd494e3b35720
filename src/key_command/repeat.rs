//! Repeat-key counting
//!
//! Counts consecutive presses of one key. Each Up re-arms the window timer;
//! a Down inside the window holds it off. Reaching the configured count
//! launches the ability and cancels the press downstream. When the window
//! expires without a launch, the presses that were swallowed while waiting
//! are replayed downstream as Down/Up pairs.

use tracing::{debug, info, warn};

use crate::dispatch::{Ability, LaunchSource};
use crate::engine::EngineContext;
use crate::input::events::{KeyAction, KeyCode, KeyEvent, KeyItem, Timestamp};
use crate::timer::{TimerId, TimerTarget};

/// Key that launches an ability when pressed `times` times in a row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatKey {
    pub key_code: KeyCode,
    pub times: u32,
    /// Window between a release and the next press (ms)
    pub window_ms: u64,
    pub status_config: Option<String>,
    pub enabled: bool,
    pub ability: Ability,
}

impl RepeatKey {
    pub fn new(key_code: KeyCode, times: u32, window_ms: u64, ability: Ability) -> Self {
        Self {
            key_code,
            times,
            window_ms,
            status_config: None,
            enabled: true,
            ability,
        }
    }

    pub fn with_status_config(mut self, key: impl Into<String>) -> Self {
        self.status_config = Some(key.into());
        self
    }
}

/// Rolling press counter shared by every repeat key
#[derive(Debug, Default)]
pub struct RepeatKeyTracker {
    keys: Vec<RepeatKey>,
    max_count: u32,
    /// Window of the first configured key, shared by all of them
    window_ms: u64,
    count: u32,
    current_key: Option<KeyCode>,
    down_start: bool,
    last_up_time: Option<Timestamp>,
    launch_count: u32,
    timer: Option<TimerId>,
    key_cancelled: bool,
    launches: u64,
    replayed: u64,
}

impl RepeatKeyTracker {
    pub fn new(keys: Vec<RepeatKey>) -> Self {
        let max_count = keys.iter().map(|key| key.times).max().unwrap_or(0);
        let window_ms = keys.first().map_or(0, |key| key.window_ms);
        Self {
            keys,
            max_count,
            window_ms,
            ..Self::default()
        }
    }

    pub fn keys(&self) -> &[RepeatKey] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Whether a press of a repeat key is in progress
    pub fn is_down_start(&self) -> bool {
        self.down_start
    }

    pub fn launches(&self) -> u64 {
        self.launches
    }

    /// Presses replayed downstream after a window expired
    pub fn replayed(&self) -> u64 {
        self.replayed
    }

    /// Consume the "repeat key was cancelled" flag raised by the last event
    pub fn take_key_cancelled(&mut self) -> bool {
        std::mem::take(&mut self.key_cancelled)
    }

    /// Abandon the current count
    pub fn abort(&mut self) {
        self.count = 0;
        self.down_start = false;
    }

    pub fn set_flag(&mut self, key: &str, value: bool) -> usize {
        let mut updated = 0;
        for repeat in self
            .keys
            .iter_mut()
            .filter(|repeat| repeat.status_config.as_deref() == Some(key))
        {
            repeat.enabled = value;
            updated += 1;
        }
        updated
    }

    /// Feed a key event; returns whether the event belongs to a repeat key
    pub fn handle(&mut self, event: &KeyEvent, ctx: &mut EngineContext<'_>) -> bool {
        if self.keys.is_empty() || self.count > self.max_count {
            return false;
        }

        if event.action == KeyAction::Cancel && self.position(event.key_code).is_some() {
            debug!("Repeat key {} cancelled", event.key_code);
            self.key_cancelled = true;
            self.down_start = false;
            return false;
        }

        if self.position(event.key_code).is_some() && !self.count_event(event, ctx) {
            return false;
        }

        let mut waiting = false;
        let mut launched = false;
        for index in 0..self.keys.len() {
            let repeat = &self.keys[index];
            if repeat.key_code != event.key_code {
                continue;
            }
            waiting = true;
            if self.count != repeat.times || !repeat.enabled {
                continue;
            }

            info!("Key {} pressed {} times", repeat.key_code, repeat.times);
            if ctx.launch(&repeat.ability, 0, LaunchSource::RepeatKey) {
                self.launches += 1;
            }
            self.launch_count = self.count;
            self.down_start = false;
            launched = true;
            ctx.forward(event.with_action(KeyAction::Cancel));
        }

        launched || waiting
    }

    /// Window timer fired
    pub fn on_timer(&mut self, id: TimerId, handled_by_sequence: bool, ctx: &mut EngineContext<'_>) {
        if self.timer != Some(id) {
            debug!("Ignoring stale repeat window {}", id);
            return;
        }
        self.timer = None;

        if let (Some(key_code), false) = (self.current_key, handled_by_sequence) {
            let time = self.last_up_time.unwrap_or_default();
            for i in self.launch_count..self.count {
                if i != 0 {
                    ctx.forward(replay_event(key_code, KeyAction::Down, time));
                }
                ctx.forward(replay_event(key_code, KeyAction::Up, time));
                self.replayed += 1;
            }
        }

        self.count = 0;
        self.down_start = false;
        self.launch_count = 0;
    }

    fn position(&self, key_code: KeyCode) -> Option<usize> {
        self.keys.iter().position(|key| key.key_code == key_code)
    }

    /// Update the count for a Down or Up of a repeat key
    fn count_event(&mut self, event: &KeyEvent, ctx: &mut EngineContext<'_>) -> bool {
        match event.action {
            KeyAction::Up => {
                if self.current_key != Some(event.key_code) {
                    self.count = if event.pressed_keys().is_empty() { 1 } else { 0 };
                } else {
                    self.count += 1;
                }
                self.last_up_time = Some(event.action_time);

                if let Some(id) = self.timer.take() {
                    ctx.timers.remove_timer(id);
                }
                match ctx
                    .timers
                    .add_timer(self.window_ms, 1, TimerTarget::RepeatKeyReplay)
                {
                    Ok(id) => self.timer = Some(id),
                    Err(e) => {
                        warn!("Dropping repeat window for key {}: {}", event.key_code, e);
                        return false;
                    }
                }
                self.current_key = Some(event.key_code);
                debug!("Key {} released, count={}", event.key_code, self.count);
                true
            }
            KeyAction::Down => {
                self.current_key = Some(event.key_code);
                self.down_start = true;
                let window_us = (self.window_ms as i64) * 1000;
                if self
                    .last_up_time
                    .is_some_and(|up| event.action_time - up < window_us)
                {
                    if let Some(id) = self.timer.take() {
                        ctx.timers.remove_timer(id);
                    }
                }
                true
            }
            KeyAction::Cancel => false,
        }
    }
}

fn replay_event(key_code: KeyCode, action: KeyAction, action_time: Timestamp) -> KeyEvent {
    KeyEvent::new(key_code, action, action_time).with_item(KeyItem {
        key_code,
        pressed: action == KeyAction::Down,
        down_time: action_time,
    })
}
