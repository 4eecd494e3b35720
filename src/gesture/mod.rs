//! Touch Gesture Recognition
//!
//! Recognises knuckle double-taps (one and two knuckles), the two-finger
//! press and the touchpad three-finger tap from the touch/pointer stream.
//!
//! # Architecture
//!
//! ```text
//! PointerEvent
//!       ↓
//! ┌──────────────────────────┐
//! │   TouchGestureEngine     │ ← routes by action and tool type
//! └──────────────────────────┘
//!    ↓ knuckle          ↓ finger            ↓ triple tap
//! ┌──────────────┐ ┌──────────────────┐ ┌──────────────┐
//! │ KnuckleGesture│ │ TwoFingerGesture │ │ launch ability│
//! │ single/double │ │  start timer     │ └──────────────┘
//! └──────────────┘ └──────────────────┘
//!    ↓
//! ThresholdAutoTuner (interval, distance)
//! ```
//!
//! While a knuckle is on the panel the engine reports the touch stream as
//! consumed so downstream stages do not see it.

mod knuckle;
mod tuner;
mod two_finger;

pub use knuckle::{KnuckleConfig, KnuckleGesture, KnuckleKind, KnuckleObservation};
pub use tuner::{ActiveBand, ThresholdAutoTuner};
pub use two_finger::{DisplayConfig, TwoFingerConfig, TwoFingerGesture, TwoFingerRejection};

use tracing::{debug, warn};

use crate::dispatch::{Ability, LaunchSource};
use crate::engine::EngineContext;
use crate::input::error::{recovery_action, ErrorContext, InputError, RecoveryAction, Result};
use crate::input::events::{PointerAction, PointerEvent, PointerItem, Timestamp, ToolType};
use crate::timer::{TimerId, TimerTarget};

/// Ability bound to a gesture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GestureBinding {
    pub ability: Ability,
    pub start_delay_ms: u64,
    pub status_config: Option<String>,
}

/// Gesture abilities from the launch configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GestureBindings {
    pub single_knuckle: Option<GestureBinding>,
    pub double_knuckle: Option<GestureBinding>,
    pub two_finger: Option<GestureBinding>,
    pub three_finger_tap: Option<GestureBinding>,
}

/// Gesture engine statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GestureStats {
    pub touch_events: u64,
    pub knuckle_downs: u64,
    pub single_knuckle_launches: u64,
    pub double_knuckle_launches: u64,
    pub two_finger_launches: u64,
    pub three_finger_launches: u64,
    /// Knock diagnostics reported for unmatched knuckle taps
    pub knock_diagnostics: u64,
    /// Resets caused by out-of-order events
    pub temporal_resets: u64,
}

/// Touch gesture engine
pub struct TouchGestureEngine {
    single_knuckle: KnuckleGesture,
    double_knuckle: KnuckleGesture,
    two_finger: TwoFingerGesture,
    three_finger_tap: Option<GestureBinding>,
    three_finger_enabled: bool,
    knock_count: u32,
    knock_report_threshold: u32,
    is_double_click: bool,
    knuckle_state: bool,
    last_event_time: Option<Timestamp>,
    stats: GestureStats,
}

impl TouchGestureEngine {
    pub fn new(knuckle: &KnuckleConfig, two_finger: TwoFingerConfig, display: DisplayConfig) -> Self {
        Self {
            single_knuckle: KnuckleGesture::new(KnuckleKind::Single, knuckle),
            double_knuckle: KnuckleGesture::new(KnuckleKind::Double, knuckle),
            two_finger: TwoFingerGesture::new(two_finger, display),
            three_finger_tap: None,
            three_finger_enabled: true,
            knock_count: 0,
            knock_report_threshold: knuckle.knock_report_threshold,
            is_double_click: false,
            knuckle_state: false,
            last_event_time: None,
            stats: GestureStats::default(),
        }
    }

    /// Install the gesture abilities from a launch configuration
    pub fn configure(&mut self, bindings: &GestureBindings) {
        let knuckle = |binding: &Option<GestureBinding>| {
            (
                binding.as_ref().map(|b| b.ability.clone()),
                binding.as_ref().and_then(|b| b.status_config.clone()),
            )
        };

        let (ability, status) = knuckle(&bindings.single_knuckle);
        self.single_knuckle.set_ability(ability, status);
        let (ability, status) = knuckle(&bindings.double_knuckle);
        self.double_knuckle.set_ability(ability, status);

        match &bindings.two_finger {
            Some(binding) => self.two_finger.set_ability(
                Some(binding.ability.clone()),
                binding.start_delay_ms,
                binding.status_config.clone(),
            ),
            None => self.two_finger.set_ability(None, 0, None),
        }

        self.three_finger_tap = bindings.three_finger_tap.clone();
        self.three_finger_enabled = true;
    }

    /// Whether the current touch stream belongs to a knuckle
    pub fn knuckle_state(&self) -> bool {
        self.knuckle_state
    }

    pub fn single_knuckle(&self) -> &KnuckleGesture {
        &self.single_knuckle
    }

    pub fn double_knuckle(&self) -> &KnuckleGesture {
        &self.double_knuckle
    }

    pub fn two_finger(&self) -> &TwoFingerGesture {
        &self.two_finger
    }

    pub fn stats(&self) -> GestureStats {
        self.stats.clone()
    }

    /// Set the knuckle double-tap interval threshold (ms) of both variants
    pub fn set_knuckle_double_tap_interval(&mut self, interval_ms: f64) -> Result<()> {
        self.single_knuckle.set_interval_threshold_ms(interval_ms)?;
        self.double_knuckle.set_interval_threshold_ms(interval_ms)
    }

    /// Set the knuckle double-tap distance threshold (px) of both variants
    pub fn set_knuckle_double_tap_distance(&mut self, distance_px: f64) -> Result<()> {
        self.single_knuckle.set_distance_threshold(distance_px)?;
        self.double_knuckle.set_distance_threshold(distance_px)
    }

    /// Apply a feature-flag change; returns the number of gestures updated
    pub fn on_config_changed(&mut self, key: &str, value: bool) -> usize {
        let mut updated = 0;
        if self.single_knuckle.status_config() == Some(key) {
            self.single_knuckle.set_enabled(value);
            updated += 1;
        }
        if self.double_knuckle.status_config() == Some(key) {
            self.double_knuckle.set_enabled(value);
            updated += 1;
        }
        if self.two_finger.status_config() == Some(key) {
            self.two_finger.set_enabled(value);
            updated += 1;
        }
        if self
            .three_finger_tap
            .as_ref()
            .is_some_and(|binding| binding.status_config.as_deref() == Some(key))
        {
            self.three_finger_enabled = value;
            updated += 1;
        }
        updated
    }

    /// Forget knuckle history and any pending two-finger press
    fn reset_state(&mut self, ctx: &mut EngineContext<'_>) {
        self.single_knuckle.reset();
        self.double_knuckle.reset();
        self.two_finger.on_finger_up(ctx);
        self.knock_count = 0;
        self.stats.temporal_resets += 1;
    }

    /// Handle a touch-panel event; returns whether it is consumed
    pub fn handle_touch_event(&mut self, event: &PointerEvent, ctx: &mut EngineContext<'_>) -> bool {
        self.stats.touch_events += 1;

        if let Some(last) = self.last_event_time {
            if event.action_time < last {
                let error = InputError::TemporalInconsistency {
                    last,
                    current: event.action_time,
                };
                let context = ErrorContext::new()
                    .with_pointer_id(event.pointer_id)
                    .with_pattern("touch gestures");
                warn!("{} ({})", error, context);
                if recovery_action(&error) == RecoveryAction::ResetState {
                    self.reset_state(ctx);
                }
            }
        }
        self.last_event_time = Some(event.action_time);

        match event.action {
            PointerAction::Down => self.on_down(event, ctx),
            PointerAction::Move => self.two_finger.on_move(event, ctx),
            PointerAction::Up | PointerAction::Cancel => self.on_up(event, ctx),
            PointerAction::TripleTap => return self.handle_pointer_event(event, ctx),
        }

        if self.knuckle_state {
            debug!("Touch event consumed by knuckle gesture");
        }
        self.knuckle_state
    }

    /// Handle a touchpad pointer event; returns whether it is consumed
    pub fn handle_pointer_event(&mut self, event: &PointerEvent, ctx: &mut EngineContext<'_>) -> bool {
        if event.action != PointerAction::TripleTap {
            return false;
        }
        let Some(binding) = self.three_finger_tap.as_ref().filter(|_| self.three_finger_enabled)
        else {
            debug!("Three-finger tap without configured ability");
            return false;
        };

        if ctx.launch(&binding.ability, 0, LaunchSource::ThreeFingerTap) {
            self.stats.three_finger_launches += 1;
        }
        true
    }

    /// Route a fired timer; returns whether an ability was launched
    pub fn on_timer(&mut self, target: TimerTarget, id: TimerId, ctx: &mut EngineContext<'_>) -> bool {
        match target {
            TimerTarget::TwoFingerStart => {
                let launched = self.two_finger.on_timer(id, ctx);
                if launched {
                    self.stats.two_finger_launches += 1;
                }
                launched
            }
            _ => false,
        }
    }

    fn on_down(&mut self, event: &PointerEvent, ctx: &mut EngineContext<'_>) {
        self.single_knuckle.clear_matched();
        self.double_knuckle.clear_matched();

        let Some(item) = event.acting_item().copied() else {
            return;
        };
        match item.tool_type {
            ToolType::Finger => {
                self.knuckle_state = false;
                self.two_finger.on_finger_down(event, ctx);
            }
            ToolType::Knuckle => match event.pointer_count() {
                1 => {
                    self.process_knuckle(KnuckleKind::Single, &item, event.action_time, ctx);
                    self.is_double_click = false;
                    self.knock_count += 1;
                }
                2 => {
                    self.process_knuckle(KnuckleKind::Double, &item, event.action_time, ctx);
                    self.is_double_click = true;
                }
                count => debug!("Ignoring knuckle down with {} contacts", count),
            },
            _ => self.knuckle_state = false,
        }
    }

    fn on_up(&mut self, event: &PointerEvent, ctx: &mut EngineContext<'_>) {
        let Some(item) = event.acting_item() else {
            return;
        };
        match item.tool_type {
            ToolType::Finger => self.two_finger.on_finger_up(ctx),
            ToolType::Knuckle => match event.pointer_count() {
                1 if !self.is_double_click => self.single_knuckle.record_up(event.action_time),
                2 => self.double_knuckle.record_up(event.action_time),
                count => debug!("Ignoring knuckle up with {} contacts", count),
            },
            _ => {}
        }
    }

    fn process_knuckle(
        &mut self,
        kind: KnuckleKind,
        item: &PointerItem,
        action_time: Timestamp,
        ctx: &mut EngineContext<'_>,
    ) {
        self.knuckle_state = true;
        self.stats.knuckle_downs += 1;

        let gesture = match kind {
            KnuckleKind::Single => &mut self.single_knuckle,
            KnuckleKind::Double => &mut self.double_knuckle,
        };
        let observation = gesture.on_down(item.display_x, item.display_y, action_time);
        if observation.distance.is_none() {
            return;
        }

        if observation.matched {
            self.knock_count = 0;
            let launched = gesture
                .launchable()
                .is_some_and(|ability| ctx.launch(ability, 0, kind.source()));
            if launched {
                match kind {
                    KnuckleKind::Single => self.stats.single_knuckle_launches += 1,
                    KnuckleKind::Double => self.stats.double_knuckle_launches += 1,
                }
            }
        } else if self.knock_count > self.knock_report_threshold {
            self.knock_count = 0;
            self.stats.knock_diagnostics += 1;
            warn!(
                kind = ?kind,
                interval_us = ?observation.interval_us,
                distance = ?observation.distance,
                interval_threshold_ms = gesture.interval_threshold_ms(),
                distance_threshold = gesture.distance_threshold(),
                "Knuckle knock did not match"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::RecordingDispatcher;
    use crate::engine::ScreenStatus;
    use crate::input::touch::TouchState;
    use crate::timer::ManualTimerService;

    struct Harness {
        engine: TouchGestureEngine,
        touch: TouchState,
        timers: ManualTimerService,
        dispatcher: RecordingDispatcher,
        forwarded: Vec<crate::input::events::KeyEvent>,
    }

    impl Harness {
        fn new() -> Self {
            let mut engine = TouchGestureEngine::new(
                &KnuckleConfig::default(),
                TwoFingerConfig::default(),
                DisplayConfig::default(),
            );
            let binding = |bundle: &str| GestureBinding {
                ability: Ability::new(bundle, "MainAbility"),
                start_delay_ms: 0,
                status_config: Some(format!("{bundle}.enabled")),
            };
            engine.configure(&GestureBindings {
                single_knuckle: Some(binding("single")),
                double_knuckle: Some(binding("double")),
                two_finger: None,
                three_finger_tap: Some(binding("tap")),
            });
            Self {
                engine,
                touch: TouchState::new(),
                timers: ManualTimerService::new(),
                dispatcher: RecordingDispatcher::new(),
                forwarded: Vec::new(),
            }
        }

        fn feed(&mut self, event: PointerEvent) -> bool {
            let mut ctx = EngineContext::new(
                &mut self.timers,
                &self.dispatcher,
                ScreenStatus::On,
                &mut self.forwarded,
            );
            self.engine.handle_touch_event(&event, &mut ctx)
        }

        fn knuckle_tap(&mut self, x: f64, down_ms: i64, up_ms: i64) -> bool {
            let down = self.touch.handle_down(0, x, 500.0, ToolType::Knuckle, down_ms * 1000);
            let consumed = self.feed(down);
            if let Some(up) = self.touch.handle_up(0, x, 500.0, up_ms * 1000) {
                self.feed(up);
            }
            consumed
        }
    }

    #[test]
    fn test_single_knuckle_double_tap_launches() {
        let mut h = Harness::new();
        assert!(h.knuckle_tap(100.0, 0, 50));
        assert!(h.knuckle_tap(105.0, 200, 250));

        assert_eq!(h.dispatcher.bundles(), vec!["single".to_string()]);
        assert!(h.engine.single_knuckle().is_matched());
        assert_eq!(h.engine.stats().single_knuckle_launches, 1);
    }

    #[test]
    fn test_adaptive_interval_end_to_end() {
        let mut h = Harness::new();
        let mut t = 0;
        h.knuckle_tap(100.0, t, t + 50);

        for _ in 0..5 {
            t += 600;
            h.knuckle_tap(100.0, t, t + 50);
        }
        assert_eq!(h.dispatcher.count(), 0);
        assert_eq!(h.engine.single_knuckle().interval_threshold_ms(), 700.0);

        t += 700;
        h.knuckle_tap(100.0, t, t + 50);
        assert_eq!(h.dispatcher.count(), 1);
    }

    #[test]
    fn test_knock_diagnostic_after_threshold() {
        let mut h = Harness::new();
        h.knuckle_tap(100.0, 0, 50);
        h.knuckle_tap(100.0, 2_000, 2_050);
        h.knuckle_tap(100.0, 4_000, 4_050);

        assert_eq!(h.engine.stats().knock_diagnostics, 1);
    }

    #[test]
    fn test_double_knuckle_uses_two_contacts() {
        let mut h = Harness::new();
        for start in [0, 200] {
            let t = start * 1000;
            let first = h.touch.handle_down(0, 100.0, 500.0, ToolType::Knuckle, t);
            h.feed(first);
            let second = h.touch.handle_down(1, 200.0, 500.0, ToolType::Knuckle, t + 1_000);
            h.feed(second);
            let up = h.touch.handle_up(1, 200.0, 500.0, t + 50_000).unwrap();
            h.feed(up);
            let up = h.touch.handle_up(0, 100.0, 500.0, t + 51_000).unwrap();
            h.feed(up);
        }

        assert_eq!(h.dispatcher.bundles(), vec!["double".to_string()]);
    }

    #[test]
    fn test_finger_touch_is_not_consumed() {
        let mut h = Harness::new();
        h.knuckle_tap(100.0, 0, 50);
        assert!(h.engine.knuckle_state());

        let down = h.touch.handle_down(3, 10.0, 10.0, ToolType::Finger, 1_000_000);
        assert!(!h.feed(down));
    }

    #[test]
    fn test_disabled_flag_blocks_launch() {
        let mut h = Harness::new();
        assert_eq!(h.engine.on_config_changed("single.enabled", false), 1);

        h.knuckle_tap(100.0, 0, 50);
        h.knuckle_tap(100.0, 200, 250);
        assert_eq!(h.dispatcher.count(), 0);
    }

    #[test]
    fn test_three_finger_tap_launches_directly() {
        let mut h = Harness::new();
        let tap = PointerEvent::new(0, PointerAction::TripleTap, 0);
        assert!(h.feed(tap));
        assert_eq!(h.dispatcher.bundles(), vec!["tap".to_string()]);

        let moved = PointerEvent::new(0, PointerAction::Move, 0);
        let mut ctx = EngineContext::new(&mut h.timers, &h.dispatcher, ScreenStatus::On, &mut h.forwarded);
        assert!(!h.engine.handle_pointer_event(&moved, &mut ctx));
    }

    #[test]
    fn test_out_of_order_event_resets_knuckles() {
        let mut h = Harness::new();
        h.knuckle_tap(100.0, 1_000, 1_050);
        h.knuckle_tap(100.0, 500, 550);

        assert_eq!(h.engine.stats().temporal_resets, 1);
        assert_eq!(h.dispatcher.count(), 0);
    }
}
