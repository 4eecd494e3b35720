//! Knuckle Double-Tap Recognition
//!
//! A knuckle gesture matches when a knuckle touches down close in time to the
//! previous lift and close in space to the previous touch:
//!
//! ```text
//! interval = down_time - prev_up_time        match iff 0 < interval <= interval_threshold
//! distance = |down - prev_down|                      and distance  <  distance_threshold
//! ```
//!
//! Both thresholds are adaptive (see [`ThresholdAutoTuner`]); every
//! observation is fed to the tuners after the match decision.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tuner::ThresholdAutoTuner;
use crate::dispatch::{Ability, LaunchSource};
use crate::input::error::Result;
use crate::input::events::Timestamp;

/// Knuckle recognition configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnuckleConfig {
    /// Default down-to-previous-up interval (ms)
    #[serde(default = "default_interval_ms")]
    pub interval_default_ms: f64,

    /// Interval adopted for users who tap slowly (ms)
    #[serde(default = "default_interval_slow_ms")]
    pub interval_slow_ms: f64,

    /// Default down-to-previous-down distance (px)
    #[serde(default = "default_distance_px")]
    pub distance_default_px: f64,

    /// Distance adopted for users who tap loosely (px)
    #[serde(default = "default_distance_long_px")]
    pub distance_long_px: f64,

    /// Consecutive observations needed to switch a threshold
    #[serde(default = "default_adjust_after")]
    pub adjust_after_observations: u32,

    /// Unmatched knocks tolerated before a diagnostic is reported
    #[serde(default = "default_knock_report_threshold")]
    pub knock_report_threshold: u32,
}

fn default_interval_ms() -> f64 {
    300.0
}
fn default_interval_slow_ms() -> f64 {
    700.0
}
fn default_distance_px() -> f64 {
    64.0
}
fn default_distance_long_px() -> f64 {
    96.0
}
fn default_adjust_after() -> u32 {
    5
}
fn default_knock_report_threshold() -> u32 {
    1
}

impl Default for KnuckleConfig {
    fn default() -> Self {
        Self {
            interval_default_ms: default_interval_ms(),
            interval_slow_ms: default_interval_slow_ms(),
            distance_default_px: default_distance_px(),
            distance_long_px: default_distance_long_px(),
            adjust_after_observations: default_adjust_after(),
            knock_report_threshold: default_knock_report_threshold(),
        }
    }
}

/// Single (one contact) or double (two contacts) knuckle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnuckleKind {
    Single,
    Double,
}

impl KnuckleKind {
    pub fn source(self) -> LaunchSource {
        match self {
            Self::Single => LaunchSource::SingleKnuckle,
            Self::Double => LaunchSource::DoubleKnuckle,
        }
    }
}

/// Result of feeding one knuckle down to a gesture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KnuckleObservation {
    /// Down to previous up, in µs; `None` on the first down
    pub interval_us: Option<Timestamp>,
    /// Down to previous down, in px; `None` on the first down
    pub distance: Option<f64>,
    pub matched: bool,
}

/// State of one knuckle variant
#[derive(Debug, Clone)]
pub struct KnuckleGesture {
    kind: KnuckleKind,
    ability: Option<Ability>,
    status_config: Option<String>,
    enabled: bool,
    last_down: Option<(f64, f64)>,
    last_up_time: Option<Timestamp>,
    matched: bool,
    interval_tuner: ThresholdAutoTuner,
    distance_tuner: ThresholdAutoTuner,
}

impl KnuckleGesture {
    pub fn new(kind: KnuckleKind, config: &KnuckleConfig) -> Self {
        Self {
            kind,
            ability: None,
            status_config: None,
            enabled: true,
            last_down: None,
            last_up_time: None,
            matched: false,
            interval_tuner: ThresholdAutoTuner::new(
                "knuckle interval",
                config.interval_default_ms,
                config.interval_slow_ms,
                config.adjust_after_observations,
            ),
            distance_tuner: ThresholdAutoTuner::new(
                "knuckle distance",
                config.distance_default_px,
                config.distance_long_px,
                config.adjust_after_observations,
            ),
        }
    }

    pub fn kind(&self) -> KnuckleKind {
        self.kind
    }

    pub fn set_ability(&mut self, ability: Option<Ability>, status_config: Option<String>) {
        self.ability = ability;
        self.status_config = status_config;
        self.enabled = true;
    }

    /// Ability to launch, when configured and enabled
    pub fn launchable(&self) -> Option<&Ability> {
        self.ability.as_ref().filter(|_| self.enabled)
    }

    pub fn status_config(&self) -> Option<&str> {
        self.status_config.as_deref()
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_matched(&self) -> bool {
        self.matched
    }

    pub fn clear_matched(&mut self) {
        self.matched = false;
    }

    /// Active interval threshold (ms)
    pub fn interval_threshold_ms(&self) -> f64 {
        self.interval_tuner.active()
    }

    /// Active distance threshold (px)
    pub fn distance_threshold(&self) -> f64 {
        self.distance_tuner.active()
    }

    pub fn set_interval_threshold_ms(&mut self, value: f64) -> Result<()> {
        self.interval_tuner.set_active(value)
    }

    pub fn set_distance_threshold(&mut self, value: f64) -> Result<()> {
        self.distance_tuner.set_active(value)
    }

    pub fn record_up(&mut self, up_time: Timestamp) {
        self.last_up_time = Some(up_time);
    }

    /// Forget the previous touch, keeping the learned thresholds
    pub fn reset(&mut self) {
        self.last_down = None;
        self.last_up_time = None;
        self.matched = false;
    }

    /// Feed a knuckle down; the down always becomes the previous touch
    pub fn on_down(&mut self, x: f64, y: f64, down_time: Timestamp) -> KnuckleObservation {
        let Some((prev_x, prev_y)) = self.last_down.replace((x, y)) else {
            debug!("{:?} knuckle: first down recorded", self.kind);
            return KnuckleObservation {
                interval_us: None,
                distance: None,
                matched: false,
            };
        };

        let interval_us = self.last_up_time.map(|up| down_time - up);
        let distance = (x - prev_x).hypot(y - prev_y);

        let interval_ready = interval_us.is_some_and(|interval| {
            interval > 0 && interval as f64 <= self.interval_tuner.active() * 1000.0
        });
        let distance_ready = distance < self.distance_tuner.active();
        self.matched = interval_ready && distance_ready;

        debug!(
            "{:?} knuckle: interval={:?}us distance={:.1}px matched={}",
            self.kind, interval_us, distance, self.matched
        );

        match interval_us.filter(|interval| *interval > 0) {
            Some(interval) => {
                self.interval_tuner.observe(interval as f64 / 1000.0);
            }
            None => self.interval_tuner.interrupt(),
        }
        self.distance_tuner.observe(distance);

        KnuckleObservation {
            interval_us,
            distance: Some(distance),
            matched: self.matched,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tap(gesture: &mut KnuckleGesture, x: f64, down_ms: i64, up_ms: i64) -> KnuckleObservation {
        let observation = gesture.on_down(x, 100.0, down_ms * 1000);
        gesture.record_up(up_ms * 1000);
        observation
    }

    #[test]
    fn test_first_down_only_records() {
        let mut gesture = KnuckleGesture::new(KnuckleKind::Single, &KnuckleConfig::default());
        let observation = tap(&mut gesture, 100.0, 0, 50);

        assert!(!observation.matched);
        assert_eq!(observation.interval_us, None);
    }

    #[test]
    fn test_double_tap_matches() {
        let mut gesture = KnuckleGesture::new(KnuckleKind::Single, &KnuckleConfig::default());
        tap(&mut gesture, 100.0, 0, 50);
        let observation = tap(&mut gesture, 110.0, 250, 300);

        assert!(observation.matched);
        assert_eq!(observation.interval_us, Some(200_000));
        assert!(gesture.is_matched());
    }

    #[test]
    fn test_far_or_slow_tap_does_not_match() {
        let mut gesture = KnuckleGesture::new(KnuckleKind::Double, &KnuckleConfig::default());
        tap(&mut gesture, 100.0, 0, 50);
        assert!(!tap(&mut gesture, 300.0, 150, 200).matched);
        assert!(!tap(&mut gesture, 300.0, 600, 650).matched);
    }

    #[test]
    fn test_interval_threshold_adapts() {
        let mut gesture = KnuckleGesture::new(KnuckleKind::Single, &KnuckleConfig::default());
        let mut t = 0;
        tap(&mut gesture, 100.0, t, t + 50);

        for _ in 0..5 {
            t += 600;
            assert!(!tap(&mut gesture, 100.0, t, t + 50).matched);
        }
        assert_eq!(gesture.interval_threshold_ms(), 700.0);

        t += 700;
        assert!(tap(&mut gesture, 100.0, t, t + 50).matched);
    }

    #[test]
    fn test_threshold_setters() {
        let mut gesture = KnuckleGesture::new(KnuckleKind::Single, &KnuckleConfig::default());
        gesture.set_interval_threshold_ms(450.0).unwrap();
        gesture.set_distance_threshold(80.0).unwrap();

        assert_eq!(gesture.interval_threshold_ms(), 450.0);
        assert_eq!(gesture.distance_threshold(), 80.0);
        assert!(gesture.set_distance_threshold(0.0).is_err());
    }
}
