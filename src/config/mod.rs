//! Configuration management
//!
//! Two documents configure the pipeline:
//! - the service configuration (TOML): engine tuning, queue sizes, logging
//! - the ability launch configuration (JSON, see [`ability`]): which key
//!   patterns and gestures launch which abilities

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub mod ability;
pub mod types;

pub use ability::{load_exclude_keys, parse_exclude_keys, AbilityLaunchConfig};
pub use types::{LoggingConfig, ServiceConfig};

use crate::gesture::{DisplayConfig, KnuckleConfig, TwoFingerConfig};
use crate::key_command::KeyCommandConfig;
use crate::resample::ResampleConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Coordinate resampler configuration
    #[serde(default)]
    pub resample: ResampleConfig,
    /// Shortcut, sequence and repeat-key configuration
    #[serde(default)]
    pub key_command: KeyCommandConfig,
    /// Knuckle double-tap configuration
    #[serde(default)]
    pub knuckle: KnuckleConfig,
    /// Two-finger press configuration
    #[serde(default)]
    pub two_finger: TwoFingerConfig,
    /// Display geometry
    #[serde(default)]
    pub display: DisplayConfig,
    /// Service loop configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Create default configuration
    pub fn default_config() -> Self {
        Self::default()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let resample = &self.resample;
        if resample.latency_us < 0 {
            anyhow::bail!("Resample latency cannot be negative: {}", resample.latency_us);
        }
        if resample.min_delta_us <= 0 || resample.min_delta_us > resample.max_delta_us {
            anyhow::bail!(
                "Resample min delta ({}) must be positive and not above max delta ({})",
                resample.min_delta_us,
                resample.max_delta_us
            );
        }
        if resample.max_prediction_us <= 0 {
            anyhow::bail!(
                "Resample max prediction must be positive: {}",
                resample.max_prediction_us
            );
        }
        if resample.history_size < 2 {
            anyhow::bail!("Resample history must hold at least 2 samples");
        }
        if resample.stale_pointer_us <= resample.max_delta_us {
            anyhow::bail!(
                "Resample stale pointer bound ({}) must exceed max delta ({})",
                resample.stale_pointer_us,
                resample.max_delta_us
            );
        }

        let knuckle = &self.knuckle;
        if knuckle.interval_default_ms <= 0.0 || knuckle.interval_slow_ms < knuckle.interval_default_ms {
            anyhow::bail!(
                "Knuckle intervals invalid: default {} slow {}",
                knuckle.interval_default_ms,
                knuckle.interval_slow_ms
            );
        }
        if knuckle.distance_default_px <= 0.0 || knuckle.distance_long_px < knuckle.distance_default_px {
            anyhow::bail!(
                "Knuckle distances invalid: default {} long {}",
                knuckle.distance_default_px,
                knuckle.distance_long_px
            );
        }
        if knuckle.adjust_after_observations == 0 {
            anyhow::bail!("Knuckle adjust_after_observations must be at least 1");
        }

        let two_finger = &self.two_finger;
        if two_finger.press_skew_limit_ms < 0 {
            anyhow::bail!("Two-finger press skew limit cannot be negative");
        }
        let margins = [
            two_finger.min_distance_vp,
            two_finger.move_threshold_vp,
            two_finger.margin_left_vp,
            two_finger.margin_right_vp,
            two_finger.margin_top_vp,
            two_finger.margin_bottom_vp,
        ];
        if margins.iter().any(|vp| *vp < 0.0) {
            anyhow::bail!("Two-finger distances and margins cannot be negative");
        }

        if self.display.width <= 0 || self.display.height <= 0 || self.display.dpi <= 0 {
            anyhow::bail!(
                "Invalid display {}x{} @ {}dpi",
                self.display.width,
                self.display.height,
                self.display.dpi
            );
        }

        let key_command = &self.key_command;
        if key_command.max_sequence_keys == 0 {
            anyhow::bail!("key_command.max_sequence_keys must be at least 1");
        }
        if key_command.min_key_down_duration_ms > key_command.max_key_down_duration_ms {
            anyhow::bail!(
                "min_key_down_duration_ms ({}) cannot be greater than max_key_down_duration_ms ({})",
                key_command.min_key_down_duration_ms,
                key_command.max_key_down_duration_ms
            );
        }

        if self.service.event_queue_capacity == 0
            || self.service.launch_queue_capacity == 0
            || self.service.timer_capacity == 0
        {
            anyhow::bail!("Service queue and timer capacities must be non-zero");
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Invalid log level: {}", self.logging.level),
        }

        Ok(())
    }
}
