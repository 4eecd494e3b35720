//! Input Service
//!
//! Single-writer owner of every engine. All input, frame requests, timer
//! fires and configuration pushes arrive as [`ServiceEvent`]s and are handled
//! one at a time, so engine state is never shared.
//!
//! # Architecture
//!
//! ```text
//!  Key ─────────► KeyCommandEngine ──┐
//!  Touch ───────► TouchGestureEngine ─┼─► not consumed ─► CoordinateResampler ─► ServiceOutput
//!  Pointer ─────► (three-finger tap) ─┘                          ▲
//!  Frame ────────────────────────────────────────────────────────┘
//!  TimerFired ──► TimerService::on_fired ──► owning engine
//! ```
//!
//! [`InputService`] is the synchronous core; [`spawn_service`] runs it on a
//! tokio task behind a bounded channel.

mod event_loop;

pub use event_loop::{spawn_service, ServiceHandle};

use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::config::{AbilityLaunchConfig, Config};
use crate::dispatch::AbilityDispatcher;
use crate::engine::{EngineContext, ScreenStatus};
use crate::gesture::{GestureBindings, GestureStats, TouchGestureEngine};
use crate::input::error::Result;
use crate::input::events::{KeyEvent, PointerEvent, Timestamp};
use crate::key_command::{ExcludeKey, KeyCommandEngine, KeyCommandStats};
use crate::resample::{CoordinateResampler, ResampleStats, ResampledEvent};
use crate::timer::{ManualTimerService, TimerId, TimerService};

/// Event consumed by the service
#[derive(Debug, Clone)]
pub enum ServiceEvent {
    /// Raw key event
    Key(KeyEvent),
    /// Touch-panel event
    Touch(PointerEvent),
    /// Touchpad pointer event
    Pointer(PointerEvent),
    /// Renderer requests the touch state for a frame
    Frame { frame_time: Timestamp },
    /// A timer armed through the timer service fired
    TimerFired(TimerId),
    /// Feature flag pushed by the settings store
    ConfigChanged { key: String, value: bool },
    ScreenStatus(ScreenStatus),
    EnableCombineKey(bool),
    UpdateKeyDownDuration { business_id: String, duration_ms: u64 },
    SetKnuckleDoubleTapInterval(f64),
    SetKnuckleDoubleTapDistance(f64),
    /// Stop the event loop
    Shutdown,
}

/// Event handed to the downstream stage
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceOutput {
    /// Key event passed through, synthesised cancel or replayed press
    Key(KeyEvent),
    /// Touch sample, passed through or resampled
    Touch(ResampledEvent),
    /// Touchpad pointer event not consumed by a gesture
    Pointer(PointerEvent),
}

/// Service statistics snapshot
#[derive(Debug, Clone, Default)]
pub struct ServiceStats {
    pub events: u64,
    pub keys_consumed: u64,
    pub touches_consumed: u64,
    pub outputs: u64,
    pub timer_fires: u64,
    /// Fire notifications for timers already removed
    pub stale_timers: u64,
    pub key_command: KeyCommandStats,
    pub gesture: GestureStats,
    pub resample: ResampleStats,
}

/// Synchronous pipeline core
pub struct InputService<T: TimerService> {
    resampler: CoordinateResampler,
    key_commands: KeyCommandEngine,
    gestures: TouchGestureEngine,
    timers: T,
    dispatcher: Arc<dyn AbilityDispatcher>,
    screen: ScreenStatus,
    events: u64,
    keys_consumed: u64,
    touches_consumed: u64,
    outputs: u64,
    timer_fires: u64,
    stale_timers: u64,
}

impl<T: TimerService> InputService<T> {
    /// Create a service with no ability bindings
    pub fn new(config: &Config, timers: T, dispatcher: Arc<dyn AbilityDispatcher>) -> Self {
        Self {
            resampler: CoordinateResampler::new(config.resample.clone()),
            key_commands: KeyCommandEngine::new(config.key_command.clone()),
            gestures: TouchGestureEngine::new(
                &config.knuckle,
                config.two_finger.clone(),
                config.display.clone(),
            ),
            timers,
            dispatcher,
            screen: ScreenStatus::On,
            events: 0,
            keys_consumed: 0,
            touches_consumed: 0,
            outputs: 0,
            timer_fires: 0,
            stale_timers: 0,
        }
    }

    /// Install an ability launch configuration
    ///
    /// On error the key engine passes every event through and no gesture
    /// launches anything.
    pub fn load_abilities(&mut self, abilities: Result<AbilityLaunchConfig>, exclude_keys: Vec<ExcludeKey>) {
        match abilities {
            Ok(config) => {
                let mut patterns = config.patterns;
                patterns.exclude_keys = exclude_keys;
                self.key_commands.apply_patterns(Ok(patterns));
                self.gestures.configure(&config.gestures);
            }
            Err(e) => {
                self.key_commands.apply_patterns(Err(e));
                self.gestures.configure(&GestureBindings::default());
            }
        }
    }

    pub fn key_commands(&self) -> &KeyCommandEngine {
        &self.key_commands
    }

    pub fn gestures(&self) -> &TouchGestureEngine {
        &self.gestures
    }

    pub fn resampler(&self) -> &CoordinateResampler {
        &self.resampler
    }

    pub fn timers(&self) -> &T {
        &self.timers
    }

    pub fn screen(&self) -> ScreenStatus {
        self.screen
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            events: self.events,
            keys_consumed: self.keys_consumed,
            touches_consumed: self.touches_consumed,
            outputs: self.outputs,
            timer_fires: self.timer_fires,
            stale_timers: self.stale_timers,
            key_command: self.key_commands.stats(),
            gesture: self.gestures.stats(),
            resample: self.resampler.stats(),
        }
    }

    /// Handle one event; returns what goes downstream
    pub fn process(&mut self, event: ServiceEvent) -> Vec<ServiceOutput> {
        self.events += 1;
        let mut forwarded = Vec::new();
        let mut outputs = Vec::new();

        match event {
            ServiceEvent::Key(event) => {
                let mut ctx = EngineContext::new(
                    &mut self.timers,
                    self.dispatcher.as_ref(),
                    self.screen,
                    &mut forwarded,
                );
                if self.key_commands.handle_key_event(&event, &mut ctx) {
                    self.keys_consumed += 1;
                } else {
                    forwarded.push(event);
                }
            }
            ServiceEvent::Touch(event) => {
                let mut ctx = EngineContext::new(
                    &mut self.timers,
                    self.dispatcher.as_ref(),
                    self.screen,
                    &mut forwarded,
                );
                if self.gestures.handle_touch_event(&event, &mut ctx) {
                    self.touches_consumed += 1;
                } else if let Some(sample) = event.sample() {
                    outputs.extend(self.resampler.push(sample).map(ServiceOutput::Touch));
                }
            }
            ServiceEvent::Pointer(event) => {
                let mut ctx = EngineContext::new(
                    &mut self.timers,
                    self.dispatcher.as_ref(),
                    self.screen,
                    &mut forwarded,
                );
                if !self.gestures.handle_pointer_event(&event, &mut ctx) {
                    outputs.push(ServiceOutput::Pointer(event));
                }
            }
            ServiceEvent::Frame { frame_time } => {
                let frame = self.resampler.consume_frame(frame_time);
                trace!("Frame {}us: {} resampled events", frame_time, frame.len());
                outputs.extend(frame.into_iter().map(ServiceOutput::Touch));
            }
            ServiceEvent::TimerFired(id) => self.route_timer(id, &mut forwarded),
            ServiceEvent::ConfigChanged { key, value } => {
                let updated = self.key_commands.on_config_changed(&key, value)
                    + self.gestures.on_config_changed(&key, value);
                if updated == 0 {
                    debug!("Config key {} matches no pattern", key);
                }
            }
            ServiceEvent::ScreenStatus(status) => {
                info!("Screen status: {} -> {}", self.screen, status);
                self.screen = status;
            }
            ServiceEvent::EnableCombineKey(enable) => self.key_commands.set_enable_combine_key(enable),
            ServiceEvent::UpdateKeyDownDuration {
                business_id,
                duration_ms,
            } => {
                if let Err(e) = self
                    .key_commands
                    .update_key_down_duration(&business_id, duration_ms)
                {
                    warn!("Rejected key-down duration update: {}", e);
                }
            }
            ServiceEvent::SetKnuckleDoubleTapInterval(interval_ms) => {
                if let Err(e) = self.gestures.set_knuckle_double_tap_interval(interval_ms) {
                    warn!("Rejected knuckle interval: {}", e);
                }
            }
            ServiceEvent::SetKnuckleDoubleTapDistance(distance) => {
                if let Err(e) = self.gestures.set_knuckle_double_tap_distance(distance) {
                    warn!("Rejected knuckle distance: {}", e);
                }
            }
            ServiceEvent::Shutdown => debug!("Shutdown reached the service core"),
        }

        let mut result: Vec<ServiceOutput> = forwarded.into_iter().map(ServiceOutput::Key).collect();
        result.extend(outputs);
        self.outputs += result.len() as u64;
        result
    }

    fn route_timer(&mut self, id: TimerId, forwarded: &mut Vec<KeyEvent>) {
        let Some(target) = self.timers.on_fired(id) else {
            trace!("Stale fire for {}", id);
            self.stale_timers += 1;
            return;
        };
        self.timer_fires += 1;

        let mut ctx = EngineContext::new(
            &mut self.timers,
            self.dispatcher.as_ref(),
            self.screen,
            forwarded,
        );
        if !self.key_commands.on_timer(target, id, &mut ctx) {
            self.gestures.on_timer(target, id, &mut ctx);
        }
    }
}

impl InputService<ManualTimerService> {
    /// Fire every virtual timer due up to `now_ms` and move the clock there
    pub fn advance_to(&mut self, now_ms: u64) -> Vec<ServiceOutput> {
        let mut outputs = Vec::new();
        while let Some(id) = self.timers.pop_due(now_ms) {
            outputs.extend(self.process(ServiceEvent::TimerFired(id)));
        }
        self.timers.set_now(now_ms);
        outputs
    }
}
