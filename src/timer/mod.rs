//! Timer Boundary
//!
//! Engines arm cancellable one-shot (or counted repeating) timers through
//! [`TimerService`]. A timer carries only a [`TimerTarget`]: the arena index
//! of the pattern that armed it. When a timer fires the service event loop
//! asks the timer service which target it belongs to and routes the expiry
//! to the owning engine on the same task that handles input, so a callback
//! never races an input event.
//!
//! Two implementations exist:
//!
//! - [`TokioTimerService`]: `tokio::time::sleep` tasks posting
//!   [`ServiceEvent::TimerFired`](crate::service::ServiceEvent) into the
//!   service channel.
//! - [`ManualTimerService`]: a virtual clock advanced explicitly, used for
//!   script replay and deterministic tests.

mod manual;
mod tokio_timer;

pub use manual::ManualTimerService;
pub use tokio_timer::TokioTimerService;

use std::fmt;

use crate::input::error::Result;

/// Handle of an armed timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Pattern a timer belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerTarget {
    /// Hold timer of the shortcut at this index
    ShortcutHold(usize),
    /// Start-delay timer of the sequence at this index
    SequenceLaunch(usize),
    /// Screen-locked deferral of the sequence at this index
    SequenceDeferred(usize),
    /// Repeat-key window expiry
    RepeatKeyReplay,
    /// Two-finger press start delay
    TwoFingerStart,
}

/// Cancellable timers, one owner per handle
pub trait TimerService: Send {
    /// Arm a timer firing `repeat` times (at least once) every `delay_ms`
    fn add_timer(&mut self, delay_ms: u64, repeat: u32, target: TimerTarget) -> Result<TimerId>;

    /// Cancel a timer; returns whether it was still armed
    fn remove_timer(&mut self, id: TimerId) -> bool;

    /// Acknowledge a fire notification
    ///
    /// Returns the target when the timer is still live, retiring it once its
    /// repeats are used up. A notification for a removed timer yields `None`.
    fn on_fired(&mut self, id: TimerId) -> Option<TimerTarget>;

    /// Number of armed timers
    fn active_count(&self) -> usize;
}
