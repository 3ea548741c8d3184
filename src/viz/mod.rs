//! Visualization — banded sample frames and the signal sampler.
//!
//! ```text
//! PlaybackDevice::tap ──▶ SignalSampler (~60 Hz tick) ──▶ SampleFrame
//!                                                            │
//!                                        index-addressed BarSinks (session)
//! ```

pub mod frame;
pub mod sampler;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use frame::{SampleFrame, BAND_COUNT, MAGNITUDE_CEIL, MAGNITUDE_FLOOR};
pub use sampler::{SampleStream, SignalSampler, TARGET_FRAME_INTERVAL};
