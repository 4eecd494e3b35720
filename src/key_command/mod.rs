//! Shortcut, Sequence and Repeat-Key Engine
//!
//! Recognises key patterns in the raw key stream and launches the abilities
//! bound to them.
//!
//! # Architecture
//!
//! ```text
//! KeyEvent
//!    │
//!    ▼
//! ┌────────────────┐  vetoed   ┌──────────────┐
//! │  Pre-filter    │──────────►│ pass-through │
//! │ (combine keys) │           └──────────────┘
//! └───────┬────────┘
//!         ▼
//! ┌────────────────┐  ┌────────────────┐
//! │ ShortcutTable  │  │SequenceMatcher │   either consumed ──► done
//! └───────┬────────┘  └───────┬────────┘
//!         └─────────┬─────────┘
//!                   ▼ neither
//!         ┌──────────────────┐
//!         │ RepeatKeyTracker │ ──► consumed while counting
//!         └──────────────────┘
//! ```
//!
//! Hold, start-delay and repeat-window timers are armed through the
//! [`TimerService`](crate::timer::TimerService) in the [`EngineContext`] and
//! routed back through [`KeyCommandEngine::on_timer`].

mod repeat;
mod sequence;
mod shortcut;

pub use repeat::{RepeatKey, RepeatKeyTracker};
pub use sequence::{Sequence, SequenceMatcher, SequencePolicy, SequenceStep};
pub use shortcut::{ShortcutKey, ShortcutTable};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::engine::EngineContext;
use crate::input::error::{InputError, Result};
use crate::input::events::keycodes::{KEYCODE_L, KEYCODE_META_LEFT, KEYCODE_META_RIGHT};
use crate::input::events::{KeyAction, KeyCode, KeyEvent};
use crate::timer::{TimerId, TimerTarget};

/// Key command configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyCommandConfig {
    /// Gap between two keys that restarts the sequence key log (ms)
    #[serde(default = "default_max_sequence_delay_ms")]
    pub max_sequence_delay_ms: u64,

    /// Maximum number of keys kept in the sequence key log
    #[serde(default = "default_max_sequence_keys")]
    pub max_sequence_keys: usize,

    /// Start delay of deferred bundles while the screen is locked (ms)
    #[serde(default = "default_locked_start_delay_ms")]
    pub locked_start_delay_ms: u64,

    /// Bundles whose sequences follow the screen policy
    #[serde(default = "default_deferred_bundles")]
    pub deferred_bundles: Vec<String>,

    /// Whether combination keys are handled at startup
    #[serde(default = "default_true")]
    pub enable_combine_key: bool,

    /// Accepted range for runtime key-down duration updates (ms)
    #[serde(default)]
    pub min_key_down_duration_ms: u64,

    #[serde(default = "default_max_key_down_duration_ms")]
    pub max_key_down_duration_ms: u64,
}

fn default_max_sequence_delay_ms() -> u64 {
    1000
}
fn default_max_sequence_keys() -> usize {
    10
}
fn default_locked_start_delay_ms() -> u64 {
    2000
}
fn default_deferred_bundles() -> Vec<String> {
    vec!["com.ohos.screenshot".to_string()]
}
fn default_true() -> bool {
    true
}
fn default_max_key_down_duration_ms() -> u64 {
    4000
}

impl Default for KeyCommandConfig {
    fn default() -> Self {
        Self {
            max_sequence_delay_ms: default_max_sequence_delay_ms(),
            max_sequence_keys: default_max_sequence_keys(),
            locked_start_delay_ms: default_locked_start_delay_ms(),
            deferred_bundles: default_deferred_bundles(),
            enable_combine_key: true,
            min_key_down_duration_ms: 0,
            max_key_down_duration_ms: default_max_key_down_duration_ms(),
        }
    }
}

impl KeyCommandConfig {
    fn sequence_policy(&self) -> SequencePolicy {
        SequencePolicy {
            max_delay_us: (self.max_sequence_delay_ms as i64) * 1000,
            max_keys: self.max_sequence_keys,
            locked_start_delay_ms: self.locked_start_delay_ms,
            deferred_bundles: self.deferred_bundles.clone(),
        }
    }
}

/// Key that stays handled while combination keys are disabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExcludeKey {
    pub key_code: KeyCode,
    pub action: KeyAction,
}

/// Every key pattern of one ability launch configuration
#[derive(Debug, Clone, Default)]
pub struct KeyCommandPatterns {
    pub shortcuts: Vec<ShortcutKey>,
    pub sequences: Vec<Sequence>,
    pub repeat_keys: Vec<RepeatKey>,
    pub exclude_keys: Vec<ExcludeKey>,
}

impl KeyCommandPatterns {
    pub fn is_empty(&self) -> bool {
        self.shortcuts.is_empty() && self.sequences.is_empty() && self.repeat_keys.is_empty()
    }
}

/// Key command statistics
#[derive(Debug, Clone, Default)]
pub struct KeyCommandStats {
    pub events: u64,
    pub consumed: u64,
    /// Events vetoed by the combine-key switch
    pub vetoed: u64,
    pub shortcut_launches: u64,
    pub sequence_launches: u64,
    pub repeat_launches: u64,
    /// Candidates dropped because no timer could be armed
    pub dropped_candidates: u64,
    pub replayed_presses: u64,
}

/// Shortcut, sequence and repeat-key recogniser
pub struct KeyCommandEngine {
    config: KeyCommandConfig,
    shortcuts: ShortcutTable,
    sequences: SequenceMatcher,
    repeats: RepeatKeyTracker,
    exclude_keys: Vec<ExcludeKey>,
    enable_combine_key: bool,
    loaded: bool,
    /// A shortcut or sequence consumed the current press
    handled_by_sequence: bool,
    events: u64,
    consumed: u64,
    vetoed: u64,
}

impl KeyCommandEngine {
    /// Create an engine with no patterns; every event passes through
    pub fn new(config: KeyCommandConfig) -> Self {
        let policy = config.sequence_policy();
        Self {
            enable_combine_key: config.enable_combine_key,
            config,
            shortcuts: ShortcutTable::default(),
            sequences: SequenceMatcher::new(Vec::new(), policy),
            repeats: RepeatKeyTracker::default(),
            exclude_keys: Vec::new(),
            loaded: false,
            handled_by_sequence: false,
            events: 0,
            consumed: 0,
            vetoed: 0,
        }
    }

    /// Install the patterns of an ability launch configuration
    ///
    /// A configuration error leaves the engine in pass-through mode. It is
    /// reported here, once.
    pub fn apply_patterns(&mut self, patterns: Result<KeyCommandPatterns>) {
        match patterns {
            Ok(patterns) => {
                info!(
                    "Key commands loaded: {} shortcuts, {} sequences, {} repeat keys, {} exclude keys",
                    patterns.shortcuts.len(),
                    patterns.sequences.len(),
                    patterns.repeat_keys.len(),
                    patterns.exclude_keys.len()
                );
                self.shortcuts = ShortcutTable::new(patterns.shortcuts);
                self.sequences = SequenceMatcher::new(patterns.sequences, self.config.sequence_policy());
                self.repeats = RepeatKeyTracker::new(patterns.repeat_keys);
                self.exclude_keys = patterns.exclude_keys;
                self.loaded = true;
            }
            Err(e) => {
                error!("Key command configuration unusable, passing keys through: {}", e);
                self.shortcuts = ShortcutTable::default();
                self.sequences = SequenceMatcher::new(Vec::new(), self.config.sequence_policy());
                self.repeats = RepeatKeyTracker::default();
                self.loaded = false;
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn shortcuts(&self) -> &ShortcutTable {
        &self.shortcuts
    }

    pub fn sequences(&self) -> &SequenceMatcher {
        &self.sequences
    }

    pub fn repeat_keys(&self) -> &RepeatKeyTracker {
        &self.repeats
    }

    pub fn set_enable_combine_key(&mut self, enable: bool) {
        self.enable_combine_key = enable;
        info!("Combine keys {}", if enable { "enabled" } else { "disabled" });
    }

    /// Update the key-down duration of the shortcuts carrying `business_id`
    pub fn update_key_down_duration(&mut self, business_id: &str, duration_ms: u64) -> Result<()> {
        if business_id.is_empty() {
            return Err(InputError::InvalidParameter("empty business id".to_string()));
        }
        let range = self.config.min_key_down_duration_ms..=self.config.max_key_down_duration_ms;
        if !range.contains(&duration_ms) {
            return Err(InputError::InvalidParameter(format!(
                "key-down duration {}ms outside {}..={}ms",
                duration_ms,
                range.start(),
                range.end()
            )));
        }
        self.shortcuts.set_duration_override(business_id, duration_ms)
    }

    /// Apply a pushed feature-flag change; returns the number of patterns updated
    pub fn on_config_changed(&mut self, key: &str, value: bool) -> usize {
        let updated = self.shortcuts.set_flag(key, value)
            + self.sequences.set_flag(key, value)
            + self.repeats.set_flag(key, value);
        if updated > 0 {
            info!("Config changed key:{} value:{} ({} patterns)", key, value, updated);
        }
        updated
    }

    /// Handle a key event; returns whether it was consumed
    pub fn handle_key_event(&mut self, event: &KeyEvent, ctx: &mut EngineContext<'_>) -> bool {
        self.events += 1;
        if !self.loaded {
            return false;
        }
        if !self.is_combine_key_enabled(event) {
            debug!("Combine key {} left to the key command owner", event.key_code);
            self.vetoed += 1;
            return false;
        }

        let consumed = self.handle_patterns(event, ctx);
        if consumed {
            self.consumed += 1;
        }
        consumed
    }

    /// Route a fired timer; returns whether it belonged to this engine
    pub fn on_timer(&mut self, target: TimerTarget, id: TimerId, ctx: &mut EngineContext<'_>) -> bool {
        match target {
            TimerTarget::ShortcutHold(index) => self.shortcuts.on_hold_timer(index, id, ctx),
            TimerTarget::SequenceLaunch(_) | TimerTarget::SequenceDeferred(_) => {
                self.sequences.on_timer(target, id, ctx)
            }
            TimerTarget::RepeatKeyReplay => {
                self.repeats.on_timer(id, self.handled_by_sequence, ctx);
                self.handled_by_sequence = false;
            }
            TimerTarget::TwoFingerStart => return false,
        }
        true
    }

    pub fn stats(&self) -> KeyCommandStats {
        KeyCommandStats {
            events: self.events,
            consumed: self.consumed,
            vetoed: self.vetoed,
            shortcut_launches: self.shortcuts.launches(),
            sequence_launches: self.sequences.launches(),
            repeat_launches: self.repeats.launches(),
            dropped_candidates: self.shortcuts.dropped() + self.sequences.dropped(),
            replayed_presses: self.repeats.replayed(),
        }
    }

    fn handle_patterns(&mut self, event: &KeyEvent, ctx: &mut EngineContext<'_>) -> bool {
        let mut handled = self.shortcuts.handle(event, ctx);
        handled = self.sequences.handle(event, ctx) || handled;
        if handled {
            self.handled_by_sequence = !self.repeats.take_key_cancelled();
            return true;
        }

        if !self.repeats.is_down_start() {
            self.repeats.handle(event, ctx);
            return false;
        }
        if self.repeats.handle(event, ctx) {
            return true;
        }
        self.repeats.abort();
        false
    }

    /// Combine-key switch with its exceptions
    fn is_combine_key_enabled(&self, event: &KeyEvent) -> bool {
        if self.enable_combine_key {
            return true;
        }

        let excluded = self
            .exclude_keys
            .iter()
            .any(|key| key.key_code == event.key_code && key.action == event.action);
        if excluded {
            return event.items.len() == 1;
        }

        event.key_code == KEYCODE_L
            && event.items.iter().all(|item| {
                matches!(
                    item.key_code,
                    KEYCODE_L | KEYCODE_META_LEFT | KEYCODE_META_RIGHT
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{Ability, RecordingDispatcher};
    use crate::engine::ScreenStatus;
    use crate::input::events::keycodes::*;
    use crate::input::keyboard::KeyboardState;
    use crate::timer::{ManualTimerService, TimerService};

    struct Harness {
        engine: KeyCommandEngine,
        keyboard: KeyboardState,
        timers: ManualTimerService,
        dispatcher: RecordingDispatcher,
        forwarded: Vec<KeyEvent>,
    }

    impl Harness {
        fn new(patterns: KeyCommandPatterns) -> Self {
            let mut engine = KeyCommandEngine::new(KeyCommandConfig::default());
            engine.apply_patterns(Ok(patterns));
            Self {
                engine,
                keyboard: KeyboardState::new(),
                timers: ManualTimerService::new(),
                dispatcher: RecordingDispatcher::new(),
                forwarded: Vec::new(),
            }
        }

        fn feed(&mut self, event: KeyEvent) -> bool {
            self.timers.set_now((event.action_time / 1000) as u64);
            let mut ctx = EngineContext::new(
                &mut self.timers,
                &self.dispatcher,
                ScreenStatus::On,
                &mut self.forwarded,
            );
            self.engine.handle_key_event(&event, &mut ctx)
        }

        fn down(&mut self, key: KeyCode, ms: i64) -> bool {
            let event = self.keyboard.handle_key_down(key, ms * 1000);
            self.feed(event)
        }

        fn up(&mut self, key: KeyCode, ms: i64) -> bool {
            let event = self.keyboard.handle_key_up(key, ms * 1000);
            self.feed(event)
        }

        fn advance(&mut self, ms: u64) {
            while let Some(id) = self.timers.pop_due(ms) {
                if let Some(target) = self.timers.on_fired(id) {
                    let mut ctx = EngineContext::new(
                        &mut self.timers,
                        &self.dispatcher,
                        ScreenStatus::On,
                        &mut self.forwarded,
                    );
                    self.engine.on_timer(target, id, &mut ctx);
                }
            }
        }
    }

    fn ability(bundle: &str) -> Ability {
        Ability::new(bundle, "MainAbility")
    }

    #[test]
    fn test_unloaded_engine_passes_through() {
        let mut engine = KeyCommandEngine::new(KeyCommandConfig::default());
        engine.apply_patterns(Err(InputError::ConfigEmpty("no sections".to_string())));
        assert!(!engine.is_loaded());

        let mut timers = ManualTimerService::new();
        let dispatcher = RecordingDispatcher::new();
        let mut forwarded = Vec::new();
        let mut ctx = EngineContext::new(&mut timers, &dispatcher, ScreenStatus::On, &mut forwarded);
        let event = KeyEvent::single(KEYCODE_POWER, KeyAction::Down, 0);
        assert!(!engine.handle_key_event(&event, &mut ctx));
    }

    #[test]
    fn test_combine_key_switch() {
        let mut h = Harness::new(KeyCommandPatterns {
            shortcuts: vec![
                ShortcutKey::new([KEYCODE_CTRL_LEFT], KEYCODE_S, KeyAction::Down, ability("com.example.save")),
                ShortcutKey::new([KEYCODE_META_LEFT], KEYCODE_L, KeyAction::Down, ability("com.example.lock")),
            ],
            ..KeyCommandPatterns::default()
        });
        h.engine.set_enable_combine_key(false);

        h.down(KEYCODE_CTRL_LEFT, 0);
        assert!(!h.down(KEYCODE_S, 10));
        h.up(KEYCODE_S, 20);
        h.up(KEYCODE_CTRL_LEFT, 30);

        h.down(KEYCODE_META_LEFT, 100);
        assert!(h.down(KEYCODE_L, 110));
        assert_eq!(h.dispatcher.bundles(), vec!["com.example.lock"]);
        assert!(h.engine.stats().vetoed >= 1);
    }

    #[test]
    fn test_exclude_key_single_item_only() {
        let mut h = Harness::new(KeyCommandPatterns {
            shortcuts: vec![ShortcutKey::new([], KEYCODE_POWER, KeyAction::Down, ability("com.example.power"))],
            exclude_keys: vec![ExcludeKey {
                key_code: KEYCODE_POWER,
                action: KeyAction::Down,
            }],
            ..KeyCommandPatterns::default()
        });
        h.engine.set_enable_combine_key(false);

        assert!(h.down(KEYCODE_POWER, 0));
        h.up(KEYCODE_POWER, 50);
        assert_eq!(h.dispatcher.count(), 1);
    }

    #[test]
    fn test_update_key_down_duration_validation() {
        let mut h = Harness::new(KeyCommandPatterns {
            shortcuts: vec![ShortcutKey::new([], KEYCODE_POWER, KeyAction::Down, ability("com.example.power"))
                .with_duration(500)
                .with_business_id("power_hold")],
            ..KeyCommandPatterns::default()
        });

        assert!(h.engine.update_key_down_duration("power_hold", 1_000).is_ok());
        assert!(matches!(
            h.engine.update_key_down_duration("power_hold", 5_000),
            Err(InputError::InvalidParameter(_))
        ));
        assert!(matches!(
            h.engine.update_key_down_duration("unknown", 1_000),
            Err(InputError::InvalidParameter(_))
        ));
        assert!(h.engine.update_key_down_duration("", 1_000).is_err());
    }

    #[test]
    fn test_config_changed_reaches_every_pattern_kind() {
        let mut h = Harness::new(KeyCommandPatterns {
            shortcuts: vec![ShortcutKey::new([], KEYCODE_POWER, KeyAction::Down, ability("a")).with_status_config("flag")],
            sequences: vec![Sequence::new(
                vec![SequenceStep::new(KEYCODE_VOLUME_UP, KeyAction::Down, 0)],
                ability("b"),
            )
            .with_status_config("flag")],
            repeat_keys: vec![RepeatKey::new(KEYCODE_POWER, 2, 300, ability("c")).with_status_config("flag")],
            ..KeyCommandPatterns::default()
        });

        assert_eq!(h.engine.on_config_changed("flag", false), 3);
        assert_eq!(h.engine.on_config_changed("other", false), 0);
    }

    #[test]
    fn test_sequence_consumption_suppresses_repeat_replay() {
        let mut h = Harness::new(KeyCommandPatterns {
            sequences: vec![Sequence::new(
                vec![
                    SequenceStep::new(KEYCODE_POWER, KeyAction::Down, 0),
                    SequenceStep::new(KEYCODE_POWER, KeyAction::Up, 0),
                ],
                ability("com.example.seq"),
            )],
            repeat_keys: vec![RepeatKey::new(KEYCODE_POWER, 3, 300, ability("com.example.repeat"))],
            ..KeyCommandPatterns::default()
        });

        assert!(!h.down(KEYCODE_POWER, 0));
        assert!(h.up(KEYCODE_POWER, 50));
        assert_eq!(h.dispatcher.bundles(), vec!["com.example.seq"]);

        h.advance(1_000);
        assert!(h.forwarded.is_empty());
    }

    #[test]
    fn test_repeat_key_through_engine() {
        let mut h = Harness::new(KeyCommandPatterns {
            repeat_keys: vec![RepeatKey::new(KEYCODE_POWER, 2, 300, ability("com.example.wallet"))],
            ..KeyCommandPatterns::default()
        });

        assert!(!h.down(KEYCODE_POWER, 0));
        assert!(h.up(KEYCODE_POWER, 50));
        assert!(h.down(KEYCODE_POWER, 150));
        assert!(h.up(KEYCODE_POWER, 200));

        assert_eq!(h.dispatcher.bundles(), vec!["com.example.wallet"]);
        let stats = h.engine.stats();
        assert_eq!(stats.repeat_launches, 1);
    }
}
