//! Raw Input Event Types
//!
//! Key and pointer events as they arrive from the driver layer. Times are
//! monotonic microseconds; display coordinates are physical pixels.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::input::error::InputError;

/// Monotonic event time in microseconds
pub type Timestamp = i64;

/// Platform key code
pub type KeyCode = i32;

/// Key codes referenced by the recognition engines
pub mod keycodes {
    use super::KeyCode;

    pub const KEYCODE_VOLUME_UP: KeyCode = 16;
    pub const KEYCODE_VOLUME_DOWN: KeyCode = 17;
    pub const KEYCODE_POWER: KeyCode = 18;
    pub const KEYCODE_A: KeyCode = 2017;
    pub const KEYCODE_B: KeyCode = 2018;
    pub const KEYCODE_C: KeyCode = 2019;
    pub const KEYCODE_L: KeyCode = 2028;
    pub const KEYCODE_S: KeyCode = 2035;
    pub const KEYCODE_ALT_LEFT: KeyCode = 2045;
    pub const KEYCODE_SHIFT_LEFT: KeyCode = 2047;
    pub const KEYCODE_CTRL_LEFT: KeyCode = 2072;
    pub const KEYCODE_META_LEFT: KeyCode = 2076;
    pub const KEYCODE_META_RIGHT: KeyCode = 2077;
}

/// Key event action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyAction {
    Cancel,
    Down,
    Up,
}

impl KeyAction {
    /// Decode the numeric action code used by launch configuration documents
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Cancel),
            2 => Some(Self::Down),
            3 => Some(Self::Up),
            _ => None,
        }
    }

    /// Numeric action code
    pub fn code(self) -> i32 {
        match self {
            Self::Cancel => 1,
            Self::Down => 2,
            Self::Up => 3,
        }
    }
}

impl fmt::Display for KeyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancel => write!(f, "cancel"),
            Self::Down => write!(f, "down"),
            Self::Up => write!(f, "up"),
        }
    }
}

impl FromStr for KeyAction {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cancel" | "key_cancel" => Ok(Self::Cancel),
            "down" | "key_down" => Ok(Self::Down),
            "up" | "key_up" => Ok(Self::Up),
            _ => Err(InputError::InvalidParameter(format!("unknown key action: {s}"))),
        }
    }
}

/// One key held (or just released) at the time of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyItem {
    pub key_code: KeyCode,
    pub pressed: bool,
    pub down_time: Timestamp,
}

/// Key event with a snapshot of every key involved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub key_code: KeyCode,
    pub action: KeyAction,
    pub action_time: Timestamp,
    pub items: Vec<KeyItem>,
}

impl KeyEvent {
    /// Create an event with no items attached
    pub fn new(key_code: KeyCode, action: KeyAction, action_time: Timestamp) -> Self {
        Self {
            key_code,
            action,
            action_time,
            items: Vec::new(),
        }
    }

    /// Single-key event whose only item describes the acting key
    pub fn single(key_code: KeyCode, action: KeyAction, action_time: Timestamp) -> Self {
        Self::new(key_code, action, action_time).with_item(KeyItem {
            key_code,
            pressed: action == KeyAction::Down,
            down_time: action_time,
        })
    }

    pub fn with_item(mut self, item: KeyItem) -> Self {
        self.items.push(item);
        self
    }

    /// Item describing the acting key
    pub fn key_item(&self) -> Option<&KeyItem> {
        self.items.iter().find(|item| item.key_code == self.key_code)
    }

    /// Codes of every key reported as pressed
    pub fn pressed_keys(&self) -> Vec<KeyCode> {
        self.items
            .iter()
            .filter(|item| item.pressed)
            .map(|item| item.key_code)
            .collect()
    }

    /// Copy of this event carrying a different action
    pub fn with_action(&self, action: KeyAction) -> Self {
        let mut event = self.clone();
        event.action = action;
        event
    }
}

/// Pointer event action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerAction {
    Down,
    Move,
    Up,
    Cancel,
    /// Touchpad three-finger tap, reported as a single action
    TripleTap,
}

/// Contact tool reported by the touch panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolType {
    #[default]
    Finger,
    Knuckle,
    Pen,
    Palm,
}

/// One contact of a pointer event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerItem {
    pub pointer_id: i32,
    pub display_x: f64,
    pub display_y: f64,
    pub tool_type: ToolType,
    pub down_time: Timestamp,
    pub pressed: bool,
}

/// Pointer event with every active contact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointerEvent {
    /// Contact that produced the action
    pub pointer_id: i32,
    pub action: PointerAction,
    pub action_time: Timestamp,
    pub items: Vec<PointerItem>,
}

impl PointerEvent {
    pub fn new(pointer_id: i32, action: PointerAction, action_time: Timestamp) -> Self {
        Self {
            pointer_id,
            action,
            action_time,
            items: Vec::new(),
        }
    }

    pub fn with_item(mut self, item: PointerItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn pointer_item(&self, pointer_id: i32) -> Option<&PointerItem> {
        self.items.iter().find(|item| item.pointer_id == pointer_id)
    }

    /// Item of the acting contact
    pub fn acting_item(&self) -> Option<&PointerItem> {
        self.pointer_item(self.pointer_id)
    }

    pub fn pointer_count(&self) -> usize {
        self.items.len()
    }

    /// Sample of the acting contact, if it has a resampleable action
    pub fn sample(&self) -> Option<PointerSample> {
        let action = match self.action {
            PointerAction::Down => SampleAction::Down,
            PointerAction::Move => SampleAction::Move,
            PointerAction::Up => SampleAction::Up,
            PointerAction::Cancel => SampleAction::Cancel,
            PointerAction::TripleTap => return None,
        };
        let item = self.acting_item()?;
        Some(PointerSample {
            pointer_id: self.pointer_id,
            display_x: item.display_x,
            display_y: item.display_y,
            action,
            action_time: self.action_time,
        })
    }
}

/// Action of a resampleable touch sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleAction {
    Down,
    Move,
    Up,
    Cancel,
}

/// Single-contact touch sample fed to the resampler
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerSample {
    pub pointer_id: i32,
    pub display_x: f64,
    pub display_y: f64,
    pub action: SampleAction,
    pub action_time: Timestamp,
}

impl PointerSample {
    pub fn new(
        pointer_id: i32,
        action: SampleAction,
        action_time: Timestamp,
        display_x: f64,
        display_y: f64,
    ) -> Self {
        Self {
            pointer_id,
            display_x,
            display_y,
            action,
            action_time,
        }
    }
}
