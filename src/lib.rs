//! # lamco-input-pipeline
//!
//! Input event conditioning for touch and key devices.
//!
//! This crate sits between the driver layer and the application dispatcher:
//! - [`resample`] - touch coordinate resampling aligned to display frames
//! - [`key_command`] - shortcut, key sequence and repeat-key recognition
//! - [`gesture`] - knuckle, two-finger and three-finger tap gestures
//! - [`timer`] / [`dispatch`] - the timer and ability launch boundaries
//!
//! # Architecture
//!
//! ```text
//! lamco-input-pipeline
//!   ├─> InputService (single writer, one event at a time)
//!   │     ├─> KeyCommandEngine   (shortcuts, sequences, repeat keys)
//!   │     ├─> TouchGestureEngine (knuckle taps, two-finger press, 3-finger tap)
//!   │     └─> CoordinateResampler
//!   ├─> TimerService  (tokio tasks or a virtual clock)
//!   └─> AbilityDispatcher (fire-and-forget launches)
//! ```
//!
//! # Data Flow
//!
//! **Key Path:** Driver → KeyboardState → KeyCommandEngine → downstream / launch
//!
//! **Touch Path:** Driver → TouchState → TouchGestureEngine → CoordinateResampler → downstream
//!
//! **Timer Path:** TimerService → ServiceEvent::TimerFired → owning engine

#![warn(clippy::all)]

/// Service and ability launch configuration
pub mod config;

/// Ability launch boundary
pub mod dispatch;

/// Context shared by the engines while they handle an event
pub mod engine;

/// Touch gesture recognition
///
/// Knuckle single/double taps with adaptive thresholds, the two-finger long
/// press and the touchpad three-finger tap.
pub mod gesture;

/// Raw input events, state trackers and the pipeline error type
pub mod input;

/// Shortcut, sequence and repeat-key recognition
pub mod key_command;

/// Event script replay on a virtual clock
pub mod replay;

/// Touch coordinate resampling
pub mod resample;

/// Single-writer service and its tokio event loop
pub mod service;

/// Timer boundary
pub mod timer;

pub use config::Config;
pub use input::{InputError, Result};
pub use service::{InputService, ServiceEvent, ServiceOutput};
