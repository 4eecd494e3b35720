//! Ability Dispatch Boundary
//!
//! Every recognised pattern ends in a [`LaunchRequest`] handed to an
//! [`AbilityDispatcher`]. The engines treat the ability as opaque: they only
//! clone it, optionally add parameters, and dispatch it. Failures are logged
//! and never retried.
//!
//! # Implementations
//!
//! - [`LoggingDispatcher`]: logs each launch (default for the binary)
//! - [`ChannelDispatcher`]: forwards requests over a bounded tokio channel
//!   with `try_send`, never blocking the event loop
//! - [`RecordingDispatcher`]: keeps every request in memory for replay
//!   reports and tests

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::input::error::{InputError, Result};

/// Ability flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbilityKind {
    /// Started as a regular ability
    #[default]
    Normal,
    /// Started as an extension ability
    Extension,
}

/// Externally launchable ability descriptor
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ability {
    pub bundle_name: String,
    pub ability_name: String,
    pub device_id: String,
    pub action: String,
    pub uri: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub entities: Vec<String>,
    pub params: BTreeMap<String, String>,
    pub kind: AbilityKind,
}

impl Ability {
    pub fn new(bundle_name: impl Into<String>, ability_name: impl Into<String>) -> Self {
        Self {
            bundle_name: bundle_name.into(),
            ability_name: ability_name.into(),
            ..Self::default()
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.bundle_name.is_empty()
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bundle_name, self.ability_name)
    }
}

/// Pattern family that produced a launch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchSource {
    Shortcut,
    Sequence,
    RepeatKey,
    SingleKnuckle,
    DoubleKnuckle,
    TwoFinger,
    ThreeFingerTap,
}

impl fmt::Display for LaunchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Shortcut => "shortcut",
            Self::Sequence => "sequence",
            Self::RepeatKey => "repeat_key",
            Self::SingleKnuckle => "single_knuckle",
            Self::DoubleKnuckle => "double_knuckle",
            Self::TwoFinger => "two_finger",
            Self::ThreeFingerTap => "three_finger_tap",
        };
        f.write_str(name)
    }
}

/// Launch handed to the dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchRequest {
    pub ability: Ability,
    /// Start delay already waited out before this launch
    pub delay_ms: u64,
    pub source: LaunchSource,
}

/// Performs the externally visible launch
#[cfg_attr(test, mockall::automock)]
pub trait AbilityDispatcher: Send + Sync {
    fn dispatch(&self, request: &LaunchRequest) -> Result<()>;
}

/// Dispatch an ability, logging the outcome
///
/// Returns whether the dispatcher accepted it. An ability without a bundle
/// name is never dispatched.
pub fn launch_ability(
    dispatcher: &dyn AbilityDispatcher,
    ability: &Ability,
    delay_ms: u64,
    source: LaunchSource,
) -> bool {
    if ability.is_empty() {
        warn!("Skipping {} launch: ability has no bundle name", source);
        return false;
    }

    let request = LaunchRequest {
        ability: ability.clone(),
        delay_ms,
        source,
    };
    match dispatcher.dispatch(&request) {
        Ok(()) => {
            info!("Launched {} via {} (delay {}ms)", ability, source, delay_ms);
            true
        }
        Err(e) => {
            error!("Failed to launch {} via {}: {}", ability, source, e);
            false
        }
    }
}

/// Dispatcher that only logs
#[derive(Debug, Default)]
pub struct LoggingDispatcher;

impl AbilityDispatcher for LoggingDispatcher {
    fn dispatch(&self, request: &LaunchRequest) -> Result<()> {
        info!(
            bundle = %request.ability.bundle_name,
            ability = %request.ability.ability_name,
            source = %request.source,
            delay_ms = request.delay_ms,
            "Ability launch requested"
        );
        Ok(())
    }
}

/// Dispatcher forwarding requests over a bounded channel
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    sender: mpsc::Sender<LaunchRequest>,
}

impl ChannelDispatcher {
    /// Create the dispatcher and the receiving end
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<LaunchRequest>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl AbilityDispatcher for ChannelDispatcher {
    fn dispatch(&self, request: &LaunchRequest) -> Result<()> {
        self.sender
            .try_send(request.clone())
            .map_err(|e| InputError::DispatchFailed {
                bundle: request.ability.bundle_name.clone(),
                reason: match e {
                    mpsc::error::TrySendError::Full(_) => "launch queue full".to_string(),
                    mpsc::error::TrySendError::Closed(_) => "launch receiver closed".to_string(),
                },
            })
    }
}

/// Dispatcher that records every request
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    launches: Mutex<Vec<LaunchRequest>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every recorded request, oldest first
    pub fn launches(&self) -> Vec<LaunchRequest> {
        self.launches.lock().clone()
    }

    /// Drain the recorded requests
    pub fn take(&self) -> Vec<LaunchRequest> {
        std::mem::take(&mut *self.launches.lock())
    }

    pub fn count(&self) -> usize {
        self.launches.lock().len()
    }

    /// Bundle names of the recorded requests, oldest first
    pub fn bundles(&self) -> Vec<String> {
        self.launches
            .lock()
            .iter()
            .map(|request| request.ability.bundle_name.clone())
            .collect()
    }
}

impl AbilityDispatcher for RecordingDispatcher {
    fn dispatch(&self, request: &LaunchRequest) -> Result<()> {
        self.launches.lock().push(request.clone());
        Ok(())
    }
}
