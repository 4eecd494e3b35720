//! Shared handler context
//!
//! Engines own their pattern state but borrow the collaborators (timers,
//! dispatcher, downstream queue) from the service for the duration of one
//! event.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::dispatch::{launch_ability, Ability, AbilityDispatcher, LaunchSource};
use crate::input::error::InputError;
use crate::input::events::KeyEvent;
use crate::timer::TimerService;

/// Display power/lock state pushed by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenStatus {
    #[default]
    On,
    Off,
    Locked,
}

impl fmt::Display for ScreenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => write!(f, "on"),
            Self::Off => write!(f, "off"),
            Self::Locked => write!(f, "locked"),
        }
    }
}

impl FromStr for ScreenStatus {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            "locked" => Ok(Self::Locked),
            _ => Err(InputError::InvalidParameter(format!("unknown screen status: {s}"))),
        }
    }
}

/// Collaborators borrowed by an engine while it handles one event
pub struct EngineContext<'a> {
    pub timers: &'a mut dyn TimerService,
    pub dispatcher: &'a dyn AbilityDispatcher,
    pub screen: ScreenStatus,
    /// Key events synthesised for the downstream stage
    pub forwarded: &'a mut Vec<KeyEvent>,
}

impl<'a> EngineContext<'a> {
    pub fn new(
        timers: &'a mut dyn TimerService,
        dispatcher: &'a dyn AbilityDispatcher,
        screen: ScreenStatus,
        forwarded: &'a mut Vec<KeyEvent>,
    ) -> Self {
        Self {
            timers,
            dispatcher,
            screen,
            forwarded,
        }
    }

    pub fn launch(&self, ability: &Ability, delay_ms: u64, source: LaunchSource) -> bool {
        launch_ability(self.dispatcher, ability, delay_ms, source)
    }

    pub fn forward(&mut self, event: KeyEvent) {
        self.forwarded.push(event);
    }
}
