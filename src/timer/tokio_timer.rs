//! Tokio-backed timer service
//!
//! Each timer is a spawned task sleeping on `tokio::time::sleep` and posting
//! `ServiceEvent::TimerFired` into the service channel. Removing a timer
//! aborts its task; a notification already in flight is filtered out by
//! [`TimerService::on_fired`]. Tasks hold a weak sender so armed timers never
//! keep the service channel open.

use std::collections::HashMap;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::{TimerId, TimerService, TimerTarget};
use crate::input::error::{InputError, Result};
use crate::service::ServiceEvent;

struct ArmedTimer {
    task: JoinHandle<()>,
    remaining: u32,
    target: TimerTarget,
}

/// Timer service for the tokio event loop
pub struct TokioTimerService {
    events: mpsc::WeakSender<ServiceEvent>,
    next_id: u64,
    armed: HashMap<TimerId, ArmedTimer>,
    capacity: Option<usize>,
}

impl TokioTimerService {
    /// Create a timer service posting fires into `events`
    pub fn new(events: &mpsc::Sender<ServiceEvent>) -> Self {
        Self {
            events: events.downgrade(),
            next_id: 0,
            armed: HashMap::new(),
            capacity: None,
        }
    }

    /// Limit the number of simultaneously armed timers
    pub fn with_capacity(mut self, limit: usize) -> Self {
        self.capacity = Some(limit);
        self
    }
}

impl TimerService for TokioTimerService {
    fn add_timer(&mut self, delay_ms: u64, repeat: u32, target: TimerTarget) -> Result<TimerId> {
        if let Some(limit) = self.capacity {
            if self.armed.len() >= limit {
                return Err(InputError::TimerExhausted(format!(
                    "{} timers armed (limit {})",
                    self.armed.len(),
                    limit
                )));
            }
        }

        let runtime = Handle::try_current()
            .map_err(|e| InputError::TimerExhausted(format!("no tokio runtime: {e}")))?;

        self.next_id += 1;
        let id = TimerId::new(self.next_id);
        let repeat = repeat.max(1);
        let events = self.events.clone();
        let period = Duration::from_millis(delay_ms);

        let task = runtime.spawn(async move {
            for _ in 0..repeat {
                tokio::time::sleep(period).await;
                let Some(sender) = events.upgrade() else {
                    trace!("Service channel closed, dropping {}", id);
                    break;
                };
                if sender.send(ServiceEvent::TimerFired(id)).await.is_err() {
                    trace!("Service channel closed, dropping {}", id);
                    break;
                }
            }
        });

        debug!("Armed {} ({}ms x{}) for {:?}", id, delay_ms, repeat, target);
        self.armed.insert(
            id,
            ArmedTimer {
                task,
                remaining: repeat,
                target,
            },
        );
        Ok(id)
    }

    fn remove_timer(&mut self, id: TimerId) -> bool {
        match self.armed.remove(&id) {
            Some(timer) => {
                timer.task.abort();
                trace!("Removed {}", id);
                true
            }
            None => false,
        }
    }

    fn on_fired(&mut self, id: TimerId) -> Option<TimerTarget> {
        let timer = self.armed.get_mut(&id)?;
        let target = timer.target;
        timer.remaining = timer.remaining.saturating_sub(1);
        if timer.remaining == 0 {
            self.armed.remove(&id);
        }
        Some(target)
    }

    fn active_count(&self) -> usize {
        self.armed.len()
    }
}

impl Drop for TokioTimerService {
    fn drop(&mut self) {
        for (_, timer) in self.armed.drain() {
            timer.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timer_posts_fire_event() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut timers = TokioTimerService::new(&tx);

        let id = timers.add_timer(10, 1, TimerTarget::RepeatKeyReplay).unwrap();

        match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
            Ok(Some(ServiceEvent::TimerFired(fired))) => assert_eq!(fired, id),
            _ => panic!("Expected TimerFired"),
        }
        assert_eq!(timers.on_fired(id), Some(TimerTarget::RepeatKeyReplay));
        assert_eq!(timers.active_count(), 0);
    }

    #[tokio::test]
    async fn test_removed_timer_is_aborted() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut timers = TokioTimerService::new(&tx);

        let id = timers.add_timer(20, 1, TimerTarget::TwoFingerStart).unwrap();
        assert!(timers.remove_timer(id));
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(rx.try_recv().is_err());
        assert_eq!(timers.on_fired(id), None);
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let (tx, _rx) = mpsc::channel(8);
        let mut timers = TokioTimerService::new(&tx).with_capacity(1);

        timers.add_timer(1_000, 1, TimerTarget::RepeatKeyReplay).unwrap();
        assert!(timers
            .add_timer(1_000, 1, TimerTarget::TwoFingerStart)
            .is_err());
    }

    #[test]
    fn test_requires_runtime() {
        let (tx, _rx) = mpsc::channel(8);
        let mut timers = TokioTimerService::new(&tx);

        let err = timers
            .add_timer(10, 1, TimerTarget::RepeatKeyReplay)
            .unwrap_err();
        assert!(matches!(err, InputError::TimerExhausted(_)));
    }
}
