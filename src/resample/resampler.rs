//! Coordinate Resampler
//!
//! Aligns touch samples to the renderer's frame cadence. Move samples are
//! queued per pointer; when a frame is requested the queue is drained up to
//! `frame_time - latency` and a coordinate for that instant is produced by
//! blending two samples:
//!
//! ```text
//! resampled = current + alpha * (other - current)
//!
//! interpolation:  current = last consumed, other = next queued
//!                 alpha = (sample_time - current.t) / (other.t - current.t)
//!
//! extrapolation:  current = h0, other = h1 (previous)
//!                 alpha = (h0.t - sample_time) / (h0.t - h1.t)   (negative)
//!                 sample_time <= h0.t + min(delta / 2, max_prediction)
//! ```
//!
//! Down, Up and Cancel bypass the blend.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, trace, warn};

use crate::input::error::{recovery_action, ErrorContext, InputError, RecoveryAction};
use crate::input::events::{PointerSample, SampleAction, Timestamp};

/// Configuration for the coordinate resampler (all times in µs)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResampleConfig {
    /// Distance between the frame time and the resampled instant
    #[serde(default = "default_latency_us")]
    pub latency_us: i64,

    /// Samples closer than this are not blended
    #[serde(default = "default_min_delta_us")]
    pub min_delta_us: i64,

    /// History spacing above which extrapolation is refused
    #[serde(default = "default_max_delta_us")]
    pub max_delta_us: i64,

    /// Maximum extrapolation beyond the newest sample
    #[serde(default = "default_max_prediction_us")]
    pub max_prediction_us: i64,

    /// Resampled samples kept per pointer
    #[serde(default = "default_history_size")]
    pub history_size: usize,

    /// Pointers silent for longer than this are dropped on the next Down
    #[serde(default = "default_stale_pointer_us")]
    pub stale_pointer_us: i64,
}

fn default_latency_us() -> i64 {
    5_000
}
fn default_min_delta_us() -> i64 {
    2_000
}
fn default_max_delta_us() -> i64 {
    20_000
}
fn default_max_prediction_us() -> i64 {
    8_000
}
fn default_history_size() -> usize {
    2
}
fn default_stale_pointer_us() -> i64 {
    1_000_000
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            latency_us: default_latency_us(),
            min_delta_us: default_min_delta_us(),
            max_delta_us: default_max_delta_us(),
            max_prediction_us: default_max_prediction_us(),
            history_size: default_history_size(),
            stale_pointer_us: default_stale_pointer_us(),
        }
    }
}

/// Outcome of a resample call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResampleStatus {
    /// An event is ready to dispatch
    Ok,
    /// Nothing to dispatch this frame
    WouldBlock,
}

/// How the coordinates of a resampled event were obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResampleKind {
    /// Down/Up/Cancel forwarded as received
    Passthrough,
    /// Latest consumed sample, not blended
    Unmodified,
    Interpolated,
    Extrapolated,
}

/// Event produced for a frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResampledEvent {
    pub pointer_id: i32,
    pub action: SampleAction,
    pub display_x: f64,
    pub display_y: f64,
    pub action_time: Timestamp,
    pub kind: ResampleKind,
}

impl ResampledEvent {
    fn from_sample(sample: &PointerSample, kind: ResampleKind) -> Self {
        Self {
            pointer_id: sample.pointer_id,
            action: sample.action,
            display_x: sample.display_x,
            display_y: sample.display_y,
            action_time: sample.action_time,
            kind,
        }
    }
}

/// Resampler statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResampleStats {
    pub passthrough: u64,
    pub unmodified: u64,
    pub interpolated: u64,
    pub extrapolated: u64,
    pub would_block: u64,
    /// Samples that arrived out of order and reset their pointer
    pub resets: u64,
    /// Pointers dropped after their release was never seen
    pub evicted: u64,
}

#[derive(Debug, Default)]
struct PointerState {
    /// Newest first
    history: VecDeque<PointerSample>,
    /// Oldest first, strictly increasing timestamps
    batch: VecDeque<PointerSample>,
    /// Time of the last sample accepted for this pointer
    last_seen: Timestamp,
}

impl PointerState {
    fn reset(&mut self) {
        self.history.clear();
        self.batch.clear();
    }

    fn push_history(&mut self, sample: PointerSample, limit: usize) {
        self.history.push_front(sample);
        self.history.truncate(limit.max(1));
    }

    fn newest_time(&self) -> Option<Timestamp> {
        self.batch
            .back()
            .or_else(|| self.history.front())
            .map(|sample| sample.action_time)
    }
}

/// Per-pointer touch coordinate resampler
pub struct CoordinateResampler {
    config: ResampleConfig,
    pointers: HashMap<i32, PointerState>,
    /// Pointer evaluated by `consume(None, ..)`
    last_pointer: Option<i32>,
    stats: ResampleStats,
}

impl CoordinateResampler {
    pub fn new(config: ResampleConfig) -> Self {
        Self {
            config,
            pointers: HashMap::new(),
            last_pointer: None,
            stats: ResampleStats::default(),
        }
    }

    pub fn config(&self) -> &ResampleConfig {
        &self.config
    }

    pub fn stats(&self) -> ResampleStats {
        self.stats.clone()
    }

    /// Feed an optional new sample and evaluate the frame at `frame_time`
    ///
    /// With `None` the most recently fed pointer is evaluated.
    pub fn consume(
        &mut self,
        sample: Option<PointerSample>,
        frame_time: Timestamp,
    ) -> (Option<ResampledEvent>, ResampleStatus) {
        let pointer_id = match sample {
            Some(sample) => {
                if let Some(event) = self.push(sample) {
                    return (Some(event), ResampleStatus::Ok);
                }
                sample.pointer_id
            }
            None => match self.last_pointer {
                Some(pointer_id) => pointer_id,
                None => {
                    self.stats.would_block += 1;
                    return (None, ResampleStatus::WouldBlock);
                }
            },
        };

        match self.evaluate(pointer_id, frame_time) {
            Some(event) => (Some(event), ResampleStatus::Ok),
            None => (None, ResampleStatus::WouldBlock),
        }
    }

    /// Record a sample without evaluating a frame
    ///
    /// Down/Up/Cancel come back immediately; moves wait for the next frame.
    pub fn push(&mut self, sample: PointerSample) -> Option<ResampledEvent> {
        self.last_pointer = Some(sample.pointer_id);
        let event = self.accept(sample)?;
        self.stats.passthrough += 1;
        Some(event)
    }

    /// Evaluate every tracked pointer for a frame
    pub fn consume_frame(&mut self, frame_time: Timestamp) -> Vec<ResampledEvent> {
        let mut ids: Vec<i32> = self.pointers.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter()
            .filter_map(|pointer_id| self.evaluate(pointer_id, frame_time))
            .collect()
    }

    /// Drop all per-pointer state
    pub fn reset(&mut self) {
        self.pointers.clear();
        self.last_pointer = None;
    }

    pub fn pending_count(&self, pointer_id: i32) -> usize {
        self.pointers
            .get(&pointer_id)
            .map_or(0, |state| state.batch.len())
    }

    pub fn history_len(&self, pointer_id: i32) -> usize {
        self.pointers
            .get(&pointer_id)
            .map_or(0, |state| state.history.len())
    }

    /// Record a sample; returns the passthrough event for Down/Up/Cancel
    fn accept(&mut self, sample: PointerSample) -> Option<ResampledEvent> {
        let limit = self.config.history_size;
        if sample.action == SampleAction::Down {
            self.evict_stale(sample.pointer_id, sample.action_time);
        }
        let state = self.pointers.entry(sample.pointer_id).or_default();
        state.last_seen = sample.action_time;

        match sample.action {
            SampleAction::Down => {
                state.reset();
                state.push_history(sample, limit);
                trace!("Resampler down: pointer={}", sample.pointer_id);
                Some(ResampledEvent::from_sample(&sample, ResampleKind::Passthrough))
            }
            SampleAction::Up | SampleAction::Cancel => {
                // Queued moves are older than the release and are superseded by it
                if !state.batch.is_empty() {
                    trace!(
                        "Resampler flushing {} pending moves for pointer {}",
                        state.batch.len(),
                        sample.pointer_id
                    );
                }
                self.pointers.remove(&sample.pointer_id);
                Some(ResampledEvent::from_sample(&sample, ResampleKind::Passthrough))
            }
            SampleAction::Move => {
                if let Some(newest) = state.newest_time() {
                    if sample.action_time <= newest {
                        let error = InputError::TemporalInconsistency {
                            last: newest,
                            current: sample.action_time,
                        };
                        let context = ErrorContext::new().with_pointer_id(sample.pointer_id);
                        warn!("{} ({})", error, context);
                        if recovery_action(&error) == RecoveryAction::ResetState {
                            state.reset();
                            self.stats.resets += 1;
                        }
                    }
                }
                state.batch.push_back(sample);
                None
            }
        }
    }

    /// Drop pointers other than `pointer_id` not heard from for too long
    fn evict_stale(&mut self, pointer_id: i32, now: Timestamp) {
        let cutoff = now - self.config.stale_pointer_us;
        let before = self.pointers.len();
        self.pointers
            .retain(|id, state| *id == pointer_id || state.last_seen >= cutoff);
        let evicted = before - self.pointers.len();
        if evicted > 0 {
            debug!("Evicted {} stale pointers", evicted);
            self.stats.evicted += evicted as u64;
        }
    }

    fn evaluate(&mut self, pointer_id: i32, frame_time: Timestamp) -> Option<ResampledEvent> {
        let sample_time = frame_time - self.config.latency_us;
        let limit = self.config.history_size;

        let Some(state) = self.pointers.get_mut(&pointer_id) else {
            self.stats.would_block += 1;
            return None;
        };

        let mut consumed = 0;
        while state
            .batch
            .front()
            .is_some_and(|pending| pending.action_time <= sample_time)
        {
            if let Some(pending) = state.batch.pop_front() {
                state.push_history(pending, limit);
                consumed += 1;
            }
        }

        if consumed == 0 {
            trace!(
                "Resampler would block: pointer={}, sample_time={}",
                pointer_id,
                sample_time
            );
            self.stats.would_block += 1;
            return None;
        }

        let current = *state.history.front()?;
        let event = match state.batch.front() {
            Some(next) => interpolate(&self.config, &current, next, sample_time),
            None => extrapolate(&self.config, &current, state.history.get(1), sample_time),
        };

        match event.kind {
            ResampleKind::Interpolated => self.stats.interpolated += 1,
            ResampleKind::Extrapolated => self.stats.extrapolated += 1,
            _ => self.stats.unmodified += 1,
        }
        debug!(
            "Resampled pointer {} -> ({:.2}, {:.2}) at {}us ({:?})",
            pointer_id, event.display_x, event.display_y, event.action_time, event.kind
        );
        Some(event)
    }
}

fn blend(current: &PointerSample, other: &PointerSample, alpha: f64) -> (f64, f64) {
    (
        current.display_x + alpha * (other.display_x - current.display_x),
        current.display_y + alpha * (other.display_y - current.display_y),
    )
}

fn interpolate(
    config: &ResampleConfig,
    current: &PointerSample,
    next: &PointerSample,
    sample_time: Timestamp,
) -> ResampledEvent {
    let delta = next.action_time - current.action_time;
    if delta < config.min_delta_us {
        return ResampledEvent::from_sample(current, ResampleKind::Unmodified);
    }

    let alpha = (sample_time - current.action_time) as f64 / delta as f64;
    let (x, y) = blend(current, next, alpha);
    ResampledEvent {
        pointer_id: current.pointer_id,
        action: SampleAction::Move,
        display_x: x,
        display_y: y,
        action_time: sample_time,
        kind: ResampleKind::Interpolated,
    }
}

fn extrapolate(
    config: &ResampleConfig,
    current: &PointerSample,
    previous: Option<&PointerSample>,
    sample_time: Timestamp,
) -> ResampledEvent {
    let Some(previous) = previous else {
        return ResampledEvent::from_sample(current, ResampleKind::Unmodified);
    };

    let delta = current.action_time - previous.action_time;
    if delta < config.min_delta_us || delta > config.max_delta_us {
        return ResampledEvent::from_sample(current, ResampleKind::Unmodified);
    }

    let max_predict = current.action_time + (delta / 2).min(config.max_prediction_us);
    let sample_time = sample_time.min(max_predict);
    let alpha = (current.action_time - sample_time) as f64 / delta as f64;
    let (x, y) = blend(current, previous, alpha);
    ResampledEvent {
        pointer_id: current.pointer_id,
        action: SampleAction::Move,
        display_x: x,
        display_y: y,
        action_time: sample_time,
        kind: ResampleKind::Extrapolated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(action: SampleAction, t: Timestamp, x: f64, y: f64) -> PointerSample {
        PointerSample::new(0, action, t, x, y)
    }

    fn resampler(latency_us: i64) -> CoordinateResampler {
        CoordinateResampler::new(ResampleConfig {
            latency_us,
            ..ResampleConfig::default()
        })
    }

    #[test]
    fn test_down_and_up_pass_through() {
        let mut r = resampler(4_000);

        let down = sample(SampleAction::Down, 10_000, 10.0, 10.0);
        let (event, status) = r.consume(Some(down), 50_000);
        assert_eq!(status, ResampleStatus::Ok);
        let event = event.unwrap();
        assert_eq!(event.kind, ResampleKind::Passthrough);
        assert_eq!((event.display_x, event.action_time), (10.0, 10_000));
        assert_eq!(r.history_len(0), 1);

        r.consume(Some(sample(SampleAction::Move, 12_500, 20.0, 20.0)), 0);
        let up = sample(SampleAction::Up, 15_000, 30.0, 30.0);
        let (event, status) = r.consume(Some(up), 0);
        assert_eq!(status, ResampleStatus::Ok);
        assert_eq!(event.unwrap().display_x, 30.0);
        assert_eq!(r.history_len(0), 0);
        assert_eq!(r.pending_count(0), 0);
    }

    #[test]
    fn test_would_block_without_consumable_sample() {
        let mut r = resampler(4_000);
        assert_eq!(r.consume(None, 18_000).1, ResampleStatus::WouldBlock);

        r.consume(Some(sample(SampleAction::Down, 10_000, 10.0, 10.0)), 0);
        let (event, status) = r.consume(Some(sample(SampleAction::Move, 20_000, 20.0, 20.0)), 18_000);
        assert!(event.is_none());
        assert_eq!(status, ResampleStatus::WouldBlock);
        assert_eq!(r.pending_count(0), 1);
    }

    #[test]
    fn test_interpolation_between_neighbours() {
        let mut r = resampler(4_000);
        r.consume(Some(sample(SampleAction::Down, 10_000, 10.0, 10.0)), 0);
        r.consume(Some(sample(SampleAction::Move, 12_500, 20.0, 20.0)), 0);
        r.consume(Some(sample(SampleAction::Move, 15_000, 30.0, 30.0)), 0);

        let (event, status) = r.consume(None, 18_000);
        assert_eq!(status, ResampleStatus::Ok);
        let event = event.unwrap();
        assert_eq!(event.kind, ResampleKind::Interpolated);
        assert_eq!(event.action_time, 14_000);
        assert!((event.display_x - 26.0).abs() < 1e-9);
        assert!(event.display_x > 20.0 && event.display_x < 30.0);
        assert_eq!(r.pending_count(0), 1);
    }

    #[test]
    fn test_interpolation_skipped_below_min_delta() {
        let mut r = resampler(4_000);
        r.consume(Some(sample(SampleAction::Down, 10_000, 10.0, 10.0)), 0);
        r.consume(Some(sample(SampleAction::Move, 13_000, 20.0, 20.0)), 0);
        r.consume(Some(sample(SampleAction::Move, 14_500, 30.0, 30.0)), 0);

        let event = r.consume(None, 18_000).0.unwrap();
        assert_eq!(event.kind, ResampleKind::Unmodified);
        assert_eq!((event.display_x, event.action_time), (20.0, 13_000));
    }

    #[test]
    fn test_extrapolation_end_to_end_scenario() {
        let mut r = resampler(4_000);
        r.consume(Some(sample(SampleAction::Down, 10_000, 10.0, 10.0)), 18_000);

        let (event, status) = r.consume(Some(sample(SampleAction::Move, 12_500, 20.0, 20.0)), 18_000);
        assert_eq!(status, ResampleStatus::Ok);
        let event = event.unwrap();

        // sample time 14000 is clamped to 12500 + 2500 / 2
        assert_eq!(event.kind, ResampleKind::Extrapolated);
        assert_eq!(event.action_time, 13_750);
        assert!((event.display_x - 25.0).abs() < 1e-9);
        assert!((event.display_y - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_extrapolation_beyond_max_delta() {
        let mut r = resampler(4_000);
        r.consume(Some(sample(SampleAction::Down, 10_000, 10.0, 10.0)), 0);

        let event = r
            .consume(Some(sample(SampleAction::Move, 40_000, 20.0, 20.0)), 50_000)
            .0
            .unwrap();
        assert_eq!(event.kind, ResampleKind::Unmodified);
        assert_eq!((event.display_x, event.action_time), (20.0, 40_000));
    }

    #[test]
    fn test_out_of_order_move_resets_pointer() {
        let mut r = resampler(4_000);
        r.consume(Some(sample(SampleAction::Down, 10_000, 10.0, 10.0)), 0);
        r.consume(Some(sample(SampleAction::Move, 12_000, 20.0, 20.0)), 0);
        r.consume(Some(sample(SampleAction::Move, 11_000, 15.0, 15.0)), 0);

        assert_eq!(r.history_len(0), 0);
        assert_eq!(r.pending_count(0), 1);
        assert_eq!(r.stats().resets, 1);
    }

    #[test]
    fn test_lost_release_is_evicted_on_next_down() {
        let mut r = resampler(4_000);
        r.consume(Some(PointerSample::new(3, SampleAction::Down, 0, 0.0, 0.0)), 0);
        r.consume(Some(PointerSample::new(3, SampleAction::Move, 8_000, 5.0, 5.0)), 0);

        // Another finger shortly after: pointer 3 is still live
        r.consume(Some(PointerSample::new(4, SampleAction::Down, 500_000, 0.0, 0.0)), 0);
        assert_eq!(r.pending_count(3), 1);
        assert_eq!(r.stats().evicted, 0);

        // Pointer 3 never released and has been silent past the bound
        r.consume(Some(PointerSample::new(5, SampleAction::Down, 1_200_000, 0.0, 0.0)), 0);
        assert_eq!(r.pending_count(3), 0);
        assert_eq!(r.history_len(3), 0);
        assert_eq!(r.history_len(4), 1);
        assert_eq!(r.history_len(5), 1);
        assert_eq!(r.stats().evicted, 1);
    }

    #[test]
    fn test_consume_frame_covers_every_pointer() {
        let mut r = resampler(4_000);
        for id in 0..2 {
            r.consume(Some(PointerSample::new(id, SampleAction::Down, 10_000, 0.0, 0.0)), 0);
            r.consume(Some(PointerSample::new(id, SampleAction::Move, 12_500, 10.0, 10.0)), 0);
        }

        let events = r.consume_frame(18_000);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].pointer_id, 0);
        assert_eq!(events[1].pointer_id, 1);
        assert_eq!(r.stats().extrapolated, 2);
    }
}
