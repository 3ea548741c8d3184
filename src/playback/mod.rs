//! Playback — artifacts, the output-device capability, and the controller.
//!
//! # Architecture
//!
//! ```text
//! AudioArtifact ──▶ PlaybackController ──▶ PlaybackDevice (trait)
//!                        │                      └─ RodioOutput (engine thread)
//!                        └─ broadcast PlaybackEvent (Play / Pause / Ended)
//!                                │
//!                                └─ consumed by the signal sampler + UI
//! ```
//!
//! The controller owns the device exclusively: no other component starts or
//! stops playback.  The Main channel carries the podcast track; the Answer
//! channel exists only while an interruption is in progress.

pub mod artifact;
pub mod controller;
pub mod device;
pub mod output;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use artifact::AudioArtifact;
pub use controller::{
    ControllerError, MainState, PlaybackController, PlaybackEvent, PlaybackEventKind,
};
pub use device::{ChannelKind, DeviceError, DeviceEvent, FrequencyTap, PlaybackDevice};
pub use output::RodioOutput;

// test-only re-export so controller/sampler/session test modules can import
// the mock without reaching into `device::mock`.
#[cfg(test)]
pub(crate) use device::MockDevice;
