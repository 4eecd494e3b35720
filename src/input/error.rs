//! Input Pipeline Error Types
//!
//! Errors never cross an engine boundary: engines turn them into a
//! recovery action and report only "consumed?" to the caller.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::input::events::Timestamp;

/// Result type for input pipeline operations
pub type Result<T> = std::result::Result<T, InputError>;

/// Input pipeline error types
#[derive(Error, Debug)]
pub enum InputError {
    /// Configuration document could not be read
    #[error("Failed to read configuration {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration document is not valid JSON
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// Configuration document has no usable section
    #[error("Configuration has no valid section: {0}")]
    ConfigEmpty(String),

    /// A configuration value is out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Runtime setter received a bad argument
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Timer service could not allocate a timer
    #[error("Timer allocation failed: {0}")]
    TimerExhausted(String),

    /// Ability dispatcher refused the launch
    #[error("Ability dispatch failed for {bundle}: {reason}")]
    DispatchFailed { bundle: String, reason: String },

    /// Event is older than the last event recorded for the same stream
    #[error("Event at {current}us precedes last recorded event at {last}us")]
    TemporalInconsistency { last: Timestamp, current: Timestamp },

    /// Service channel closed
    #[error("Service event channel closed")]
    ChannelClosed,

    /// Service channel full
    #[error("Service event queue is full")]
    EventQueueFull,

    /// Service task panicked or was aborted
    #[error("Service task failed: {0}")]
    TaskFailed(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error classification for recovery strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// Configuration errors
    Configuration,
    /// Timer service errors
    Timer,
    /// Ability dispatch errors
    Dispatch,
    /// Event ordering errors
    Temporal,
    /// Event queue errors
    EventQueue,
    /// Caller errors
    Parameter,
    /// Unknown error type
    Unknown,
}

/// Classify error for recovery strategy selection
pub fn classify_error(error: &InputError) -> ErrorType {
    match error {
        InputError::ConfigRead { .. }
        | InputError::ConfigParse(_)
        | InputError::ConfigEmpty(_)
        | InputError::InvalidConfig(_) => ErrorType::Configuration,

        InputError::TimerExhausted(_) => ErrorType::Timer,

        InputError::DispatchFailed { .. } => ErrorType::Dispatch,

        InputError::TemporalInconsistency { .. } => ErrorType::Temporal,

        InputError::ChannelClosed | InputError::EventQueueFull | InputError::TaskFailed(_) => {
            ErrorType::EventQueue
        }

        InputError::InvalidParameter(_) => ErrorType::Parameter,

        InputError::Io(_) => ErrorType::Unknown,
    }
}

/// Where an error was raised, for diagnostics
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Key code if applicable
    pub key_code: Option<i32>,

    /// Pointer id if applicable
    pub pointer_id: Option<i32>,

    /// Pattern group (sequences, gestures, ...) the error belongs to
    pub pattern: Option<String>,
}

impl ErrorContext {
    /// Create new error context
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key_code(mut self, key_code: i32) -> Self {
        self.key_code = Some(key_code);
        self
    }

    pub fn with_pointer_id(mut self, pointer_id: i32) -> Self {
        self.pointer_id = Some(pointer_id);
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(pattern) = &self.pattern {
            parts.push(pattern.clone());
        }
        if let Some(key_code) = self.key_code {
            parts.push(format!("key {key_code}"));
        }
        if let Some(pointer_id) = self.pointer_id {
            parts.push(format!("pointer {pointer_id}"));
        }
        if parts.is_empty() {
            write!(f, "no context")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Recovery action to take after error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Skip this event
    Skip,

    /// Reset the per-stream state that produced the error
    ResetState,

    /// Drop the candidate pattern for this event
    DropCandidate,

    /// Run with empty pattern sets, forwarding every event
    UsePassThrough,
}

/// Determine recovery action for error
pub fn recovery_action(error: &InputError) -> RecoveryAction {
    match classify_error(error) {
        ErrorType::Configuration => RecoveryAction::UsePassThrough,
        ErrorType::Timer => RecoveryAction::DropCandidate,
        ErrorType::Temporal => RecoveryAction::ResetState,
        ErrorType::Dispatch
        | ErrorType::EventQueue
        | ErrorType::Parameter
        | ErrorType::Unknown => RecoveryAction::Skip,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let error = InputError::ConfigEmpty("abilities.json".to_string());
        assert_eq!(classify_error(&error), ErrorType::Configuration);

        let error = InputError::TimerExhausted("limit 4".to_string());
        assert_eq!(classify_error(&error), ErrorType::Timer);

        let error = InputError::TemporalInconsistency {
            last: 200,
            current: 100,
        };
        assert_eq!(classify_error(&error), ErrorType::Temporal);

        let error = InputError::EventQueueFull;
        assert_eq!(classify_error(&error), ErrorType::EventQueue);
    }

    #[test]
    fn test_error_context_display() {
        let ctx = ErrorContext::new()
            .with_pattern("key sequences")
            .with_key_code(18)
            .with_pointer_id(2);
        assert_eq!(ctx.to_string(), "key sequences, key 18, pointer 2");
        assert_eq!(ErrorContext::new().to_string(), "no context");
    }

    #[test]
    fn test_recovery_actions() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(
            recovery_action(&InputError::ConfigParse(parse)),
            RecoveryAction::UsePassThrough
        );
        assert_eq!(
            recovery_action(&InputError::TimerExhausted(String::new())),
            RecoveryAction::DropCandidate
        );
        assert_eq!(
            recovery_action(&InputError::TemporalInconsistency {
                last: 2_000,
                current: 1_000
            }),
            RecoveryAction::ResetState
        );
        assert_eq!(
            recovery_action(&InputError::DispatchFailed {
                bundle: "b".into(),
                reason: "r".into()
            }),
            RecoveryAction::Skip
        );
    }

    #[test]
    fn test_error_display() {
        let error = InputError::TemporalInconsistency {
            last: 2000,
            current: 1000,
        };
        assert_eq!(
            error.to_string(),
            "Event at 1000us precedes last recorded event at 2000us"
        );
    }
}
