//! Two-Finger Press Recognition
//!
//! Two fingers touching down together and staying still for the start delay
//! launch an ability. The press is validated when the start-delay timer
//! fires:
//!
//! - both fingers went down within `press_skew_limit_ms` of each other
//! - the fingers are at least `min_distance_vp` apart
//! - both fingers lie inside the display minus its edge margins
//!
//! Any movement beyond `move_threshold_vp`, any lift, or a third finger
//! cancels the pending press. Thresholds are in virtual pixels and scaled by
//! the display density.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::dispatch::{Ability, LaunchSource};
use crate::engine::EngineContext;
use crate::input::events::{PointerEvent, Timestamp};
use crate::timer::{TimerId, TimerTarget};

/// Density of one virtual pixel, in dpi
const BASE_DPI: f64 = 160.0;

/// Two-finger press configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwoFingerConfig {
    /// Maximum gap between the two down times (ms)
    #[serde(default = "default_press_skew_limit_ms")]
    pub press_skew_limit_ms: i64,

    /// Minimum distance between the fingers (vp)
    #[serde(default = "default_min_distance_vp")]
    pub min_distance_vp: f64,

    /// Movement that cancels a pending press (vp)
    #[serde(default = "default_move_threshold_vp")]
    pub move_threshold_vp: f64,

    #[serde(default = "default_margin_left_vp")]
    pub margin_left_vp: f64,

    #[serde(default = "default_margin_right_vp")]
    pub margin_right_vp: f64,

    #[serde(default = "default_margin_top_vp")]
    pub margin_top_vp: f64,

    #[serde(default = "default_margin_bottom_vp")]
    pub margin_bottom_vp: f64,
}

fn default_press_skew_limit_ms() -> i64 {
    300
}
fn default_min_distance_vp() -> f64 {
    16.0
}
fn default_move_threshold_vp() -> f64 {
    15.0
}
fn default_margin_left_vp() -> f64 {
    24.0
}
fn default_margin_right_vp() -> f64 {
    24.0
}
fn default_margin_top_vp() -> f64 {
    80.0
}
fn default_margin_bottom_vp() -> f64 {
    41.0
}

impl Default for TwoFingerConfig {
    fn default() -> Self {
        Self {
            press_skew_limit_ms: default_press_skew_limit_ms(),
            min_distance_vp: default_min_distance_vp(),
            move_threshold_vp: default_move_threshold_vp(),
            margin_left_vp: default_margin_left_vp(),
            margin_right_vp: default_margin_right_vp(),
            margin_top_vp: default_margin_top_vp(),
            margin_bottom_vp: default_margin_bottom_vp(),
        }
    }
}

/// Geometry of the touch display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_width")]
    pub width: i32,

    #[serde(default = "default_height")]
    pub height: i32,

    #[serde(default = "default_dpi")]
    pub dpi: i32,
}

fn default_width() -> i32 {
    1080
}
fn default_height() -> i32 {
    2340
}
fn default_dpi() -> i32 {
    480
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            dpi: default_dpi(),
        }
    }
}

impl DisplayConfig {
    /// Convert virtual pixels to physical pixels
    pub fn vp_to_px(&self, vp: f64) -> f64 {
        if vp <= 0.0 || self.dpi <= 0 {
            return 0.0;
        }
        vp * (f64::from(self.dpi) / BASE_DPI)
    }
}

/// Why a pending press was not launched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwoFingerRejection {
    PressSkew,
    TooClose,
    OutsideRegion,
}

impl fmt::Display for TwoFingerRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PressSkew => write!(f, "fingers pressed too far apart in time"),
            Self::TooClose => write!(f, "fingers too close together"),
            Self::OutsideRegion => write!(f, "finger outside the active region"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct TouchSlot {
    id: i32,
    x: f64,
    y: f64,
    down_time: Timestamp,
}

/// Two-finger press state
#[derive(Debug)]
pub struct TwoFingerGesture {
    config: TwoFingerConfig,
    display: DisplayConfig,
    ability: Option<Ability>,
    start_delay_ms: u64,
    status_config: Option<String>,
    enabled: bool,
    touches: [TouchSlot; 2],
    timer: Option<TimerId>,
}

impl TwoFingerGesture {
    pub fn new(config: TwoFingerConfig, display: DisplayConfig) -> Self {
        Self {
            config,
            display,
            ability: None,
            start_delay_ms: 0,
            status_config: None,
            enabled: true,
            touches: [TouchSlot::default(); 2],
            timer: None,
        }
    }

    pub fn set_ability(
        &mut self,
        ability: Option<Ability>,
        start_delay_ms: u64,
        status_config: Option<String>,
    ) {
        self.ability = ability;
        self.start_delay_ms = start_delay_ms;
        self.status_config = status_config;
        self.enabled = true;
    }

    /// Configured and enabled
    pub fn is_active(&self) -> bool {
        self.ability.is_some() && self.enabled
    }

    pub fn status_config(&self) -> Option<&str> {
        self.status_config.as_deref()
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_pending(&self) -> bool {
        self.timer.is_some()
    }

    pub fn display(&self) -> &DisplayConfig {
        &self.display
    }

    /// A finger touched down
    pub fn on_finger_down(&mut self, event: &PointerEvent, ctx: &mut EngineContext<'_>) {
        if !self.is_active() {
            return;
        }

        let count = event.pointer_count();
        if count == 2 {
            self.start(ctx);
        } else {
            self.stop(ctx);
        }

        if (1..=2).contains(&count) {
            if let Some(item) = event.acting_item() {
                self.touches[count - 1] = TouchSlot {
                    id: event.pointer_id,
                    x: item.display_x,
                    y: item.display_y,
                    down_time: item.down_time,
                };
            }
        }
    }

    /// A finger moved; too much movement cancels the pending press
    pub fn on_move(&mut self, event: &PointerEvent, ctx: &mut EngineContext<'_>) {
        if self.timer.is_none() {
            return;
        }
        let Some(item) = event.acting_item() else {
            return;
        };
        let Some(slot) = self.touches.iter().find(|slot| slot.id == event.pointer_id) else {
            return;
        };

        let moved = (item.display_x - slot.x).hypot(item.display_y - slot.y);
        if moved > self.display.vp_to_px(self.config.move_threshold_vp) {
            debug!("Two-finger press cancelled: pointer {} moved {:.1}px", event.pointer_id, moved);
            self.stop(ctx);
        }
    }

    /// A finger lifted or was cancelled
    pub fn on_finger_up(&mut self, ctx: &mut EngineContext<'_>) {
        self.stop(ctx);
    }

    /// Start-delay timer fired; returns whether the ability was launched
    pub fn on_timer(&mut self, id: TimerId, ctx: &mut EngineContext<'_>) -> bool {
        if self.timer != Some(id) {
            debug!("Ignoring stale two-finger {}", id);
            return false;
        }
        self.timer = None;

        if let Err(rejection) = self.check_press() {
            debug!("Two-finger press rejected: {}", rejection);
            return false;
        }
        let Some(ability) = self.ability.as_ref().filter(|_| self.enabled) else {
            return false;
        };

        let [first, second] = self.touches;
        let ability = ability
            .clone()
            .with_param("displayX1", format!("{}", first.x.round() as i64))
            .with_param("displayY1", format!("{}", first.y.round() as i64))
            .with_param("displayX2", format!("{}", second.x.round() as i64))
            .with_param("displayY2", format!("{}", second.y.round() as i64));
        ctx.launch(&ability, 0, LaunchSource::TwoFinger)
    }

    /// Validate the recorded press
    pub fn check_press(&self) -> Result<(), TwoFingerRejection> {
        let [first, second] = self.touches;

        if (first.down_time - second.down_time).abs() > self.config.press_skew_limit_ms * 1000 {
            return Err(TwoFingerRejection::PressSkew);
        }

        let distance = (first.x - second.x).hypot(first.y - second.y);
        if distance < self.display.vp_to_px(self.config.min_distance_vp) {
            return Err(TwoFingerRejection::TooClose);
        }

        let left = self.display.vp_to_px(self.config.margin_left_vp);
        let right = f64::from(self.display.width) - self.display.vp_to_px(self.config.margin_right_vp);
        let top = self.display.vp_to_px(self.config.margin_top_vp);
        let bottom =
            f64::from(self.display.height) - self.display.vp_to_px(self.config.margin_bottom_vp);

        // A point on a margin line is outside
        let outside =
            |slot: &TouchSlot| slot.x <= left || slot.x >= right || slot.y <= top || slot.y >= bottom;
        if outside(&first) || outside(&second) {
            return Err(TwoFingerRejection::OutsideRegion);
        }
        Ok(())
    }

    fn start(&mut self, ctx: &mut EngineContext<'_>) {
        self.stop(ctx);
        match ctx
            .timers
            .add_timer(self.start_delay_ms, 1, TimerTarget::TwoFingerStart)
        {
            Ok(id) => {
                debug!("Two-finger press pending ({}ms)", self.start_delay_ms);
                self.timer = Some(id);
            }
            Err(e) => warn!("Dropping two-finger press: {}", e),
        }
    }

    fn stop(&mut self, ctx: &mut EngineContext<'_>) {
        if let Some(id) = self.timer.take() {
            ctx.timers.remove_timer(id);
        }
    }
}
