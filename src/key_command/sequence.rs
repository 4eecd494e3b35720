//! Key sequence matching
//!
//! Every key event is appended to a rolling key log. The candidate set starts
//! as every configured sequence and is narrowed on each event:
//!
//! ```text
//! key log:   (A,down) --120ms--> (A,up) --80ms--> (B,down)
//! sequence:  (A,down,<500) ------> (A,up,<500) ---> (B,down)
//!                    ^ log delay must stay below the step's max delay
//! ```
//!
//! A candidate whose steps are all matched launches immediately or arms a
//! start-delay timer. Any new key interrupts pending start-delay timers.

use tracing::{debug, info, warn};

use crate::dispatch::{Ability, LaunchSource};
use crate::engine::{EngineContext, ScreenStatus};
use crate::input::error::{recovery_action, ErrorContext, InputError, RecoveryAction};
use crate::input::events::{KeyAction, KeyCode, KeyEvent, Timestamp};
use crate::timer::{TimerId, TimerTarget};

/// One step of a sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceStep {
    pub key_code: KeyCode,
    pub action: KeyAction,
    /// Maximum delay before the next step in µs; 0 means unbounded
    pub max_delay_us: Timestamp,
}

impl SequenceStep {
    pub fn new(key_code: KeyCode, action: KeyAction, max_delay_ms: i64) -> Self {
        Self {
            key_code,
            action,
            max_delay_us: max_delay_ms * 1000,
        }
    }
}

/// Ordered key sequence bound to an ability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    pub steps: Vec<SequenceStep>,
    pub ability: Ability,
    pub ability_start_delay_ms: u64,
    pub status_config: Option<String>,
    pub enabled: bool,
    pub(crate) timer: Option<TimerId>,
}

impl Sequence {
    pub fn new(steps: Vec<SequenceStep>, ability: Ability) -> Self {
        Self {
            steps,
            ability,
            ability_start_delay_ms: 0,
            status_config: None,
            enabled: true,
            timer: None,
        }
    }

    pub fn with_start_delay(mut self, delay_ms: u64) -> Self {
        self.ability_start_delay_ms = delay_ms;
        self
    }

    pub fn with_status_config(mut self, key: impl Into<String>) -> Self {
        self.status_config = Some(key.into());
        self
    }
}

/// Logged key with the delay to the key that followed it
#[derive(Debug, Clone, Copy)]
struct LoggedKey {
    key_code: KeyCode,
    action: KeyAction,
    action_time: Timestamp,
    delay_us: Timestamp,
}

/// Limits and screen policy of the sequence matcher
#[derive(Debug, Clone)]
pub struct SequencePolicy {
    /// Gap that restarts the key log (µs)
    pub max_delay_us: Timestamp,
    pub max_keys: usize,
    /// Start delay used for deferred bundles while the screen is locked
    pub locked_start_delay_ms: u64,
    /// Bundles suppressed when the screen is off and delayed when it is locked
    pub deferred_bundles: Vec<String>,
}

impl Default for SequencePolicy {
    fn default() -> Self {
        Self {
            max_delay_us: 1_000_000,
            max_keys: 10,
            locked_start_delay_ms: 2000,
            deferred_bundles: vec!["com.ohos.screenshot".to_string()],
        }
    }
}

/// Rolling key log and candidate filter
#[derive(Debug, Default)]
pub struct SequenceMatcher {
    sequences: Vec<Sequence>,
    policy: SequencePolicy,
    keys: Vec<LoggedKey>,
    candidates: Vec<usize>,
    /// Screen-locked deferral
    deferred: Option<(usize, TimerId)>,
    launches: u64,
    dropped: u64,
    suppressed: u64,
}

impl SequenceMatcher {
    pub fn new(sequences: Vec<Sequence>, policy: SequencePolicy) -> Self {
        Self {
            sequences,
            policy,
            ..Self::default()
        }
    }

    pub fn sequences(&self) -> &[Sequence] {
        &self.sequences
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Number of keys currently in the log
    pub fn logged_keys(&self) -> usize {
        self.keys.len()
    }

    /// Number of sequences still matching the key log
    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    pub fn launches(&self) -> u64 {
        self.launches
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Full matches suppressed because the screen was off
    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }

    pub fn set_flag(&mut self, key: &str, value: bool) -> usize {
        let mut updated = 0;
        for sequence in self
            .sequences
            .iter_mut()
            .filter(|sequence| sequence.status_config.as_deref() == Some(key))
        {
            sequence.enabled = value;
            updated += 1;
        }
        updated
    }

    /// Feed a key event; returns whether a sequence launched or was scheduled
    pub fn handle(&mut self, event: &KeyEvent, ctx: &mut EngineContext<'_>) -> bool {
        if let Some((_, id)) = self.deferred.take() {
            debug!("Removing deferred sequence {}", id);
            ctx.timers.remove_timer(id);
        }
        if self.sequences.is_empty() {
            return false;
        }

        if !self.add_key(event, ctx) {
            return false;
        }

        if self.candidates.is_empty() {
            self.candidates = (0..self.sequences.len()).collect();
        }

        let mut scheduled = false;
        let mut immediate = None;
        let candidates = std::mem::take(&mut self.candidates);
        for index in candidates {
            match self.check_candidate(index, ctx) {
                CandidateState::Rejected => {}
                CandidateState::Partial => self.candidates.push(index),
                CandidateState::Scheduled => {
                    scheduled = true;
                    self.candidates.push(index);
                }
                CandidateState::Launched => {
                    scheduled = true;
                    immediate = Some(index);
                    self.candidates.push(index);
                }
            }
        }

        if self.candidates.is_empty() {
            debug!("No sequence matches {} logged keys", self.keys.len());
            self.keys.clear();
            return false;
        }

        if let Some(launched) = immediate {
            for &index in self.candidates.iter().filter(|&&index| index != launched) {
                if let Some(id) = self.sequences[index].timer.take() {
                    debug!("Cancelling competing sequence {}", index);
                    ctx.timers.remove_timer(id);
                }
            }
        }

        scheduled
    }

    /// A start-delay or deferral timer fired
    pub fn on_timer(&mut self, target: TimerTarget, id: TimerId, ctx: &mut EngineContext<'_>) {
        match target {
            TimerTarget::SequenceLaunch(index) => {
                let Some(sequence) = self.sequences.get_mut(index) else {
                    return;
                };
                if sequence.timer != Some(id) {
                    debug!("Ignoring stale sequence {}", id);
                    return;
                }
                sequence.timer = None;
                let delay = sequence.ability_start_delay_ms;
                self.launch(index, delay, ctx);
            }
            TimerTarget::SequenceDeferred(index) => {
                if self.deferred != Some((index, id)) {
                    debug!("Ignoring stale deferred sequence {}", id);
                    return;
                }
                self.deferred = None;
                let delay = self.policy.locked_start_delay_ms;
                self.launch(index, delay, ctx);
            }
            _ => {}
        }
    }

    /// Clear the key log and every pending timer
    pub fn reset(&mut self, ctx: &mut EngineContext<'_>) {
        self.interrupt_timers(ctx);
        self.keys.clear();
        self.candidates.clear();
    }

    fn add_key(&mut self, event: &KeyEvent, ctx: &mut EngineContext<'_>) -> bool {
        let key = LoggedKey {
            key_code: event.key_code,
            action: event.action,
            action_time: event.action_time,
            delay_us: 0,
        };

        if let Some(last) = self.keys.last() {
            if last.action_time > key.action_time {
                let error = InputError::TemporalInconsistency {
                    last: last.action_time,
                    current: key.action_time,
                };
                let context = ErrorContext::new()
                    .with_key_code(key.key_code)
                    .with_pattern("key sequences");
                warn!("{} ({})", error, context);
                if recovery_action(&error) == RecoveryAction::ResetState {
                    self.reset(ctx);
                }
                return false;
            }

            let gap = key.action_time - last.action_time;
            if gap > self.policy.max_delay_us {
                debug!("Key gap {}us exceeds max delay, restarting key log", gap);
                self.reset(ctx);
            } else {
                if self.is_repeat(&key) {
                    debug!("Repeated key {} {} not logged", key.key_code, key.action);
                    return false;
                }
                if let Some(last) = self.keys.last_mut() {
                    last.delay_us = gap;
                }
                self.interrupt_timers(ctx);
            }
        }

        if self.keys.len() >= self.policy.max_keys {
            debug!("Key log full ({} keys)", self.keys.len());
            return false;
        }
        self.keys.push(key);
        true
    }

    /// Whether the most recent logged entry for this key has the same action
    fn is_repeat(&self, key: &LoggedKey) -> bool {
        self.keys
            .iter()
            .rev()
            .find(|logged| logged.key_code == key.key_code)
            .is_some_and(|logged| logged.action == key.action)
    }

    fn interrupt_timers(&mut self, ctx: &mut EngineContext<'_>) {
        for &index in &self.candidates {
            if let Some(id) = self.sequences[index].timer.take() {
                debug!("Key log changed, removing {}", id);
                ctx.timers.remove_timer(id);
            }
        }
    }

    fn check_candidate(&mut self, index: usize, ctx: &mut EngineContext<'_>) -> CandidateState {
        let sequence = &self.sequences[index];
        if !sequence.enabled || self.keys.len() > sequence.steps.len() {
            return CandidateState::Rejected;
        }

        let last = self.keys.len() - 1;
        for (i, (key, step)) in self.keys.iter().zip(&sequence.steps).enumerate() {
            if key.key_code != step.key_code || key.action != step.action {
                return CandidateState::Rejected;
            }
            if i != last && step.max_delay_us != 0 && key.delay_us >= step.max_delay_us {
                debug!(
                    "Sequence {} step {}: delay {}us exceeds {}us",
                    index, i, key.delay_us, step.max_delay_us
                );
                return CandidateState::Rejected;
            }
        }

        if self.keys.len() < sequence.steps.len() {
            return CandidateState::Partial;
        }

        let deferred = self
            .policy
            .deferred_bundles
            .iter()
            .any(|bundle| *bundle == sequence.ability.bundle_name);
        if deferred {
            match ctx.screen {
                ScreenStatus::Off => {
                    info!("Screen off, suppressing {}", sequence.ability);
                    self.suppressed += 1;
                    return CandidateState::Rejected;
                }
                ScreenStatus::Locked => return self.defer(index, ctx),
                ScreenStatus::On => {}
            }
        }

        self.start(index, ctx)
    }

    fn start(&mut self, index: usize, ctx: &mut EngineContext<'_>) -> CandidateState {
        let delay = self.sequences[index].ability_start_delay_ms;
        if delay == 0 {
            self.launch(index, 0, ctx);
            return CandidateState::Launched;
        }

        if let Some(id) = self.sequences[index].timer.take() {
            ctx.timers.remove_timer(id);
        }
        match ctx
            .timers
            .add_timer(delay, 1, TimerTarget::SequenceLaunch(index))
        {
            Ok(id) => {
                debug!("Sequence {} launches in {}ms", index, delay);
                self.sequences[index].timer = Some(id);
                CandidateState::Scheduled
            }
            Err(e) => {
                warn!("Dropping sequence {}: {}", index, e);
                self.dropped += 1;
                CandidateState::Rejected
            }
        }
    }

    fn defer(&mut self, index: usize, ctx: &mut EngineContext<'_>) -> CandidateState {
        let delay = self.policy.locked_start_delay_ms;
        match ctx
            .timers
            .add_timer(delay, 1, TimerTarget::SequenceDeferred(index))
        {
            Ok(id) => {
                info!(
                    "Screen locked, delaying {} by {}ms",
                    self.sequences[index].ability, delay
                );
                if let Some((_, previous)) = self.deferred.replace((index, id)) {
                    ctx.timers.remove_timer(previous);
                }
                CandidateState::Scheduled
            }
            Err(e) => {
                warn!("Dropping deferred sequence {}: {}", index, e);
                self.dropped += 1;
                CandidateState::Rejected
            }
        }
    }

    fn launch(&mut self, index: usize, delay_ms: u64, ctx: &mut EngineContext<'_>) {
        if ctx.launch(&self.sequences[index].ability, delay_ms, LaunchSource::Sequence) {
            self.launches += 1;
        }
    }
}

enum CandidateState {
    Rejected,
    /// Prefix matched, more steps expected
    Partial,
    Scheduled,
    Launched,
}
