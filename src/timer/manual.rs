//! Virtual-clock timer service
//!
//! Nothing fires on its own: the owner advances the clock with
//! [`ManualTimerService::pop_due`] and routes every returned id through the
//! normal fire path.

use std::collections::HashMap;
use tracing::trace;

use super::{TimerId, TimerService, TimerTarget};
use crate::input::error::{InputError, Result};

#[derive(Debug, Clone, Copy)]
struct PendingTimer {
    deadline_ms: u64,
    interval_ms: u64,
    remaining: u32,
    target: TimerTarget,
}

/// Timer service driven by an explicit millisecond clock
#[derive(Debug, Default)]
pub struct ManualTimerService {
    now_ms: u64,
    next_id: u64,
    pending: HashMap<TimerId, PendingTimer>,
    /// Fired but not yet acknowledged
    fired: HashMap<TimerId, TimerTarget>,
    capacity: Option<usize>,
}

impl ManualTimerService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the number of simultaneously armed timers
    pub fn with_capacity(limit: usize) -> Self {
        Self {
            capacity: Some(limit),
            ..Self::default()
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Move the clock forward without firing anything
    pub fn set_now(&mut self, now_ms: u64) {
        self.now_ms = self.now_ms.max(now_ms);
    }

    /// Earliest armed deadline, if any
    pub fn next_deadline(&self) -> Option<u64> {
        self.pending.values().map(|timer| timer.deadline_ms).min()
    }

    /// Fire the earliest timer due at or before `until_ms`
    ///
    /// The clock moves to the fired deadline. Ties fire in arming order.
    pub fn pop_due(&mut self, until_ms: u64) -> Option<TimerId> {
        let (&id, _) = self
            .pending
            .iter()
            .filter(|(_, timer)| timer.deadline_ms <= until_ms)
            .min_by_key(|(id, timer)| (timer.deadline_ms, **id))?;

        let mut timer = self.pending.remove(&id)?;
        self.now_ms = self.now_ms.max(timer.deadline_ms);
        self.fired.insert(id, timer.target);

        if timer.remaining > 1 {
            timer.remaining -= 1;
            timer.deadline_ms += timer.interval_ms.max(1);
            self.pending.insert(id, timer);
        }

        trace!("Manual clock fired {} at {}ms", id, self.now_ms);
        Some(id)
    }
}

impl TimerService for ManualTimerService {
    fn add_timer(&mut self, delay_ms: u64, repeat: u32, target: TimerTarget) -> Result<TimerId> {
        if let Some(limit) = self.capacity {
            if self.pending.len() >= limit {
                return Err(InputError::TimerExhausted(format!(
                    "{} timers armed (limit {})",
                    self.pending.len(),
                    limit
                )));
            }
        }

        self.next_id += 1;
        let id = TimerId::new(self.next_id);
        self.pending.insert(
            id,
            PendingTimer {
                deadline_ms: self.now_ms + delay_ms,
                interval_ms: delay_ms,
                remaining: repeat.max(1),
                target,
            },
        );
        Ok(id)
    }

    fn remove_timer(&mut self, id: TimerId) -> bool {
        let pending = self.pending.remove(&id).is_some();
        let fired = self.fired.remove(&id).is_some();
        pending || fired
    }

    fn on_fired(&mut self, id: TimerId) -> Option<TimerTarget> {
        self.fired.remove(&id)
    }

    fn active_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_in_deadline_order() {
        let mut timers = ManualTimerService::new();
        let late = timers.add_timer(300, 1, TimerTarget::RepeatKeyReplay).unwrap();
        let early = timers.add_timer(100, 1, TimerTarget::TwoFingerStart).unwrap();

        assert_eq!(timers.pop_due(50), None);
        assert_eq!(timers.pop_due(1_000), Some(early));
        assert_eq!(timers.now_ms(), 100);
        assert_eq!(timers.on_fired(early), Some(TimerTarget::TwoFingerStart));
        assert_eq!(timers.pop_due(1_000), Some(late));
        assert_eq!(timers.pop_due(1_000), None);
    }

    #[test]
    fn test_removed_timer_never_fires() {
        let mut timers = ManualTimerService::new();
        let id = timers.add_timer(10, 1, TimerTarget::ShortcutHold(0)).unwrap();

        assert!(timers.remove_timer(id));
        assert!(!timers.remove_timer(id));
        assert_eq!(timers.pop_due(100), None);
        assert_eq!(timers.on_fired(id), None);
    }

    #[test]
    fn test_repeating_timer() {
        let mut timers = ManualTimerService::new();
        let id = timers.add_timer(10, 3, TimerTarget::SequenceLaunch(2)).unwrap();

        let mut fires = 0;
        while let Some(fired) = timers.pop_due(1_000) {
            assert_eq!(fired, id);
            assert_eq!(timers.on_fired(fired), Some(TimerTarget::SequenceLaunch(2)));
            fires += 1;
        }
        assert_eq!(fires, 3);
        assert_eq!(timers.now_ms(), 30);
        assert_eq!(timers.active_count(), 0);
    }

    #[test]
    fn test_capacity_limit() {
        let mut timers = ManualTimerService::with_capacity(1);
        timers.add_timer(10, 1, TimerTarget::RepeatKeyReplay).unwrap();

        let err = timers
            .add_timer(10, 1, TimerTarget::TwoFingerStart)
            .unwrap_err();
        assert!(matches!(err, InputError::TimerExhausted(_)));
    }

    #[test]
    fn test_delay_is_relative_to_clock() {
        let mut timers = ManualTimerService::new();
        timers.set_now(500);
        timers.add_timer(100, 1, TimerTarget::RepeatKeyReplay).unwrap();

        assert_eq!(timers.next_deadline(), Some(600));
        timers.set_now(100);
        assert_eq!(timers.now_ms(), 500);
    }
}
