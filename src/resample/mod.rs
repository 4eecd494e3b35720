//! Touch Coordinate Resampling
//!
//! Touch panels report at their own rate while the renderer draws at the
//! display rate. The resampler produces one coordinate per frame for each
//! active pointer, placed `latency` before the frame time, by interpolating
//! between queued samples or extrapolating from the last two.
//!
//! # Example
//!
//! ```rust
//! use lamco_input_pipeline::input::{PointerSample, SampleAction};
//! use lamco_input_pipeline::resample::{CoordinateResampler, ResampleConfig, ResampleStatus};
//!
//! let mut resampler = CoordinateResampler::new(ResampleConfig::default());
//! resampler.consume(Some(PointerSample::new(0, SampleAction::Down, 10_000, 10.0, 10.0)), 0);
//! resampler.consume(Some(PointerSample::new(0, SampleAction::Move, 12_000, 20.0, 20.0)), 0);
//! resampler.consume(Some(PointerSample::new(0, SampleAction::Move, 16_000, 40.0, 40.0)), 0);
//!
//! let (event, status) = resampler.consume(None, 19_000);
//! assert_eq!(status, ResampleStatus::Ok);
//! assert!(event.is_some());
//! ```

mod resampler;

pub use resampler::{
    CoordinateResampler, ResampleConfig, ResampleKind, ResampleStats, ResampleStatus,
    ResampledEvent,
};
