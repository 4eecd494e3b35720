//! Threshold Auto-Tuner
//!
//! Debounced switching between two admissible values of one metric. The
//! alternate value is the more permissive one (a longer interval, a larger
//! distance):
//!
//! | Active    | Qualifying observation        | After N in a row |
//! |-----------|-------------------------------|------------------|
//! | default   | `default <= v <= alternate`   | switch to alternate |
//! | alternate | `v <= default`                | switch back to default |
//!
//! Any non-qualifying observation resets the streak, so a single outlier
//! never flips behaviour.

use tracing::{debug, info};

use crate::input::error::{InputError, Result};

/// Which admissible value is active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveBand {
    Default,
    Alternate,
    /// Set explicitly to a value outside the two bands; tuning is suspended
    Manual,
}

/// Hysteresis state for one metric
#[derive(Debug, Clone)]
pub struct ThresholdAutoTuner {
    metric: &'static str,
    default_value: f64,
    alternate_value: f64,
    active_value: f64,
    band: ActiveBand,
    streak: u32,
    required: u32,
    switches: u64,
}

impl ThresholdAutoTuner {
    /// Create a tuner starting on `default_value`
    ///
    /// `required` is the number of consecutive qualifying observations that
    /// triggers a switch.
    pub fn new(metric: &'static str, default_value: f64, alternate_value: f64, required: u32) -> Self {
        Self {
            metric,
            default_value,
            alternate_value,
            active_value: default_value,
            band: ActiveBand::Default,
            streak: 0,
            required: required.max(1),
            switches: 0,
        }
    }

    pub fn active(&self) -> f64 {
        self.active_value
    }

    pub fn band(&self) -> ActiveBand {
        self.band
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    /// Number of switches performed so far
    pub fn switches(&self) -> u64 {
        self.switches
    }

    /// Feed one observation; returns true when the active value switched
    pub fn observe(&mut self, value: f64) -> bool {
        let qualifying = match self.band {
            ActiveBand::Default => value >= self.default_value && value <= self.alternate_value,
            ActiveBand::Alternate => value <= self.default_value,
            ActiveBand::Manual => return false,
        };

        if !qualifying {
            if self.streak > 0 {
                debug!("{} tuner streak reset by {:.1}", self.metric, value);
            }
            self.streak = 0;
            return false;
        }

        self.streak += 1;
        if self.streak < self.required {
            return false;
        }

        let (band, value) = match self.band {
            ActiveBand::Default => (ActiveBand::Alternate, self.alternate_value),
            _ => (ActiveBand::Default, self.default_value),
        };
        info!(
            "{} threshold switched {:.1} -> {:.1} after {} observations",
            self.metric, self.active_value, value, self.streak
        );
        self.band = band;
        self.active_value = value;
        self.streak = 0;
        self.switches += 1;
        true
    }

    /// Break the current streak without observing a value
    pub fn interrupt(&mut self) {
        self.streak = 0;
    }

    /// Set the active value explicitly
    ///
    /// Setting one of the two admissible values selects that band; any other
    /// positive value suspends tuning until the next explicit set.
    pub fn set_active(&mut self, value: f64) -> Result<()> {
        if !value.is_finite() || value <= 0.0 {
            return Err(InputError::InvalidParameter(format!(
                "{} threshold must be positive, got {}",
                self.metric, value
            )));
        }

        self.band = if value == self.default_value {
            ActiveBand::Default
        } else if value == self.alternate_value {
            ActiveBand::Alternate
        } else {
            ActiveBand::Manual
        };
        self.active_value = value;
        self.streak = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval_tuner() -> ThresholdAutoTuner {
        ThresholdAutoTuner::new("interval", 300.0, 700.0, 5)
    }

    #[test]
    fn test_switches_after_consecutive_observations() {
        let mut tuner = interval_tuner();

        for _ in 0..4 {
            assert!(!tuner.observe(550.0));
        }
        assert_eq!(tuner.active(), 300.0);
        assert!(tuner.observe(550.0));
        assert_eq!(tuner.active(), 700.0);
        assert_eq!(tuner.band(), ActiveBand::Alternate);
        assert_eq!(tuner.streak(), 0);
    }

    #[test]
    fn test_single_outlier_resets_streak() {
        let mut tuner = interval_tuner();

        for _ in 0..4 {
            tuner.observe(550.0);
        }
        tuner.observe(900.0);
        assert_eq!(tuner.streak(), 0);

        for _ in 0..4 {
            tuner.observe(550.0);
        }
        assert_eq!(tuner.active(), 300.0);
    }

    #[test]
    fn test_switches_back_to_default() {
        let mut tuner = interval_tuner();
        tuner.set_active(700.0).unwrap();
        assert_eq!(tuner.band(), ActiveBand::Alternate);

        tuner.observe(550.0);
        assert_eq!(tuner.streak(), 0);

        for _ in 0..5 {
            tuner.observe(200.0);
        }
        assert_eq!(tuner.active(), 300.0);
        assert_eq!(tuner.switches(), 1);
    }

    #[test]
    fn test_manual_value_suspends_tuning() {
        let mut tuner = interval_tuner();
        tuner.set_active(450.0).unwrap();

        for _ in 0..10 {
            assert!(!tuner.observe(500.0));
        }
        assert_eq!(tuner.active(), 450.0);
        assert!(tuner.set_active(-1.0).is_err());
        assert!(tuner.set_active(f64::NAN).is_err());
    }
}
