//! Input Event Model
//!
//! Raw key and touch events as they come out of the driver layer, the state
//! trackers that turn per-key/per-contact reports into snapshot events, and
//! the error type shared by every stage of the pipeline.
//!
//! # Architecture
//!
//! ```text
//! driver reports
//!       ↓
//! ┌───────────────┐   ┌──────────────┐
//! │ KeyboardState │   │  TouchState  │   ← held keys / active contacts
//! └───────────────┘   └──────────────┘
//!       ↓                    ↓
//!   KeyEvent            PointerEvent      ← snapshot events
//!       ↓                    ↓
//! KeyCommandEngine   TouchGestureEngine / CoordinateResampler
//! ```

pub mod error;
pub mod events;
pub mod keyboard;
pub mod touch;

pub use error::{
    classify_error, recovery_action, ErrorContext, ErrorType, InputError, RecoveryAction, Result,
};
pub use events::{
    keycodes, KeyAction, KeyCode, KeyEvent, KeyItem, PointerAction, PointerEvent, PointerItem,
    PointerSample, SampleAction, Timestamp, ToolType,
};
pub use keyboard::KeyboardState;
pub use touch::TouchState;
