//! The playback-device capability.
//!
//! [`PlaybackDevice`] abstracts the single audio output shared by the whole
//! session so the controller and sampler can be exercised without real
//! hardware.  A device exposes two independent channels (Main and Answer)
//! over one physical output; natural-end notifications arrive on the event
//! receiver handed out when the concrete device is constructed.
//!
//! [`RodioOutput`](crate::playback::RodioOutput) is the production
//! implementation; [`MockDevice`] (test-only) records calls and lets tests
//! drive end-of-clip events by hand.

use std::time::Duration;

use thiserror::Error;

use super::artifact::AudioArtifact;

// ---------------------------------------------------------------------------
// ChannelKind
// ---------------------------------------------------------------------------

/// One playback slot bound to at most one artifact at a time.
///
/// `Main` carries the podcast track; `Answer` is the transient channel used
/// while a question's spoken answer interrupts the main track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Main,
    Answer,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelKind::Main => write!(f, "main"),
            ChannelKind::Answer => write!(f, "answer"),
        }
    }
}

// ---------------------------------------------------------------------------
// DeviceEvent
// ---------------------------------------------------------------------------

/// Asynchronous notifications from the device thread.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// The channel's source drained to its natural end.
    Ended(ChannelKind),
    /// The channel's source died mid-playback.
    Failed {
        channel: ChannelKind,
        message: String,
    },
}

// ---------------------------------------------------------------------------
// DeviceError
// ---------------------------------------------------------------------------

/// Errors surfaced by playback-device operations.
#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    /// The output device could not be opened, or its engine thread is gone.
    #[error("audio output unavailable: {0}")]
    Unavailable(String),

    /// The artifact's payload could not be decoded for playback.
    #[error("failed to decode audio payload: {0}")]
    Decode(String),

    /// The operation needs an artifact bound to the channel, but none is.
    #[error("no artifact bound to the {0} channel")]
    NoBinding(ChannelKind),
}

// ---------------------------------------------------------------------------
// FrequencyTap
// ---------------------------------------------------------------------------

/// A live read handle onto a channel's frequency-domain data.
///
/// Each call to [`bins`](FrequencyTap::bins) returns the *instantaneous*
/// spectrum — there is no history and nothing to drain.  Dropping the tap
/// releases the underlying analysis resources; the sampler creates at most
/// one tap per channel activation and drops it on every exit transition.
pub trait FrequencyTap: Send {
    /// Current spectrum magnitudes, each normalized to `[0.0, 1.0]`.
    fn bins(&self) -> Vec<f32>;
}

// ---------------------------------------------------------------------------
// PlaybackDevice
// ---------------------------------------------------------------------------

/// Object-safe, thread-safe interface to the audio output.
///
/// The device is owned exclusively by the
/// [`PlaybackController`](crate::playback::PlaybackController); no other
/// component starts or stops playback directly.
///
/// # Contract
///
/// - `load` binds an artifact to a channel, replacing (and releasing) any
///   previous binding, and leaves the channel paused at position zero.
/// - `play` / `pause` require a binding and are idempotent.
/// - `position` reports how much of the bound artifact has played.
/// - A channel whose source drains naturally produces
///   [`DeviceEvent::Ended`] on the device's event stream.
pub trait PlaybackDevice: Send + Sync {
    /// Bind `artifact` to `channel`, paused at position zero.
    fn load(&self, channel: ChannelKind, artifact: &AudioArtifact) -> Result<(), DeviceError>;

    /// Start (or resume) audible playback on `channel`.
    fn play(&self, channel: ChannelKind) -> Result<(), DeviceError>;

    /// Pause `channel`, retaining its position.
    fn pause(&self, channel: ChannelKind) -> Result<(), DeviceError>;

    /// Elapsed playback position of `channel` (zero when unbound).
    fn position(&self, channel: ChannelKind) -> Duration;

    /// Drop `channel`'s binding and release its resources.  No-op when
    /// nothing is bound.
    fn unload(&self, channel: ChannelKind);

    /// Open a frequency tap on `channel`.
    fn tap(&self, channel: ChannelKind) -> Result<Box<dyn FrequencyTap>, DeviceError>;
}

// Compile-time assertion: Box<dyn PlaybackDevice> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn PlaybackDevice>) {}
};

// ---------------------------------------------------------------------------
// MockDevice  (test-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) use mock::MockDevice;

#[cfg(test)]
mod mock {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;

    /// State of one mock channel binding.
    #[derive(Debug, Clone)]
    pub(crate) struct MockChannel {
        pub artifact_id: u64,
        pub playing: bool,
        pub position: Duration,
    }

    /// In-memory [`PlaybackDevice`] that records bindings and lets tests
    /// emit end-of-clip events by hand.
    pub(crate) struct MockDevice {
        channels: Mutex<HashMap<ChannelKind, MockChannel>>,
        bins: Arc<Mutex<Vec<f32>>>,
        taps_open: Arc<AtomicUsize>,
        fail_next_load: Mutex<Option<ChannelKind>>,
        events_tx: mpsc::UnboundedSender<DeviceEvent>,
    }

    struct MockTap {
        bins: Arc<Mutex<Vec<f32>>>,
        taps_open: Arc<AtomicUsize>,
    }

    impl FrequencyTap for MockTap {
        fn bins(&self) -> Vec<f32> {
            self.bins.lock().unwrap().clone()
        }
    }

    impl Drop for MockTap {
        fn drop(&mut self) {
            self.taps_open.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl MockDevice {
        pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<DeviceEvent>) {
            let (events_tx, events_rx) = mpsc::unbounded_channel();
            let device = Arc::new(Self {
                channels: Mutex::new(HashMap::new()),
                bins: Arc::new(Mutex::new(vec![0.0; 16])),
                taps_open: Arc::new(AtomicUsize::new(0)),
                fail_next_load: Mutex::new(None),
                events_tx,
            });
            (device, events_rx)
        }

        /// Make the next `load` on `channel` fail with a decode error.
        pub fn fail_next_load(&self, channel: ChannelKind) {
            *self.fail_next_load.lock().unwrap() = Some(channel);
        }

        /// Overwrite the playback position reported for `channel`.
        pub fn set_position(&self, channel: ChannelKind, position: Duration) {
            if let Some(ch) = self.channels.lock().unwrap().get_mut(&channel) {
                ch.position = position;
            }
        }

        /// Replace the spectrum served to open taps.
        pub fn set_bins(&self, bins: Vec<f32>) {
            *self.bins.lock().unwrap() = bins;
        }

        /// Simulate the channel's source draining to its natural end.
        pub fn emit_ended(&self, channel: ChannelKind) {
            if let Some(ch) = self.channels.lock().unwrap().get_mut(&channel) {
                ch.playing = false;
            }
            let _ = self.events_tx.send(DeviceEvent::Ended(channel));
        }

        /// Simulate the channel's source dying mid-playback.
        pub fn emit_failed(&self, channel: ChannelKind, message: &str) {
            if let Some(ch) = self.channels.lock().unwrap().get_mut(&channel) {
                ch.playing = false;
            }
            let _ = self.events_tx.send(DeviceEvent::Failed {
                channel,
                message: message.to_string(),
            });
        }

        /// Snapshot of the channel's binding, if any.
        pub fn channel(&self, channel: ChannelKind) -> Option<MockChannel> {
            self.channels.lock().unwrap().get(&channel).cloned()
        }

        /// `true` when the channel is bound and audibly playing.
        pub fn is_playing(&self, channel: ChannelKind) -> bool {
            self.channel(channel).map(|c| c.playing).unwrap_or(false)
        }

        /// Number of taps currently open across all channels.
        pub fn taps_open(&self) -> usize {
            self.taps_open.load(Ordering::SeqCst)
        }
    }

    impl PlaybackDevice for MockDevice {
        fn load(&self, channel: ChannelKind, artifact: &AudioArtifact) -> Result<(), DeviceError> {
            if self.fail_next_load.lock().unwrap().take() == Some(channel) {
                return Err(DeviceError::Decode("mock decode failure".into()));
            }
            self.channels.lock().unwrap().insert(
                channel,
                MockChannel {
                    artifact_id: artifact.id(),
                    playing: false,
                    position: Duration::ZERO,
                },
            );
            Ok(())
        }

        fn play(&self, channel: ChannelKind) -> Result<(), DeviceError> {
            let mut channels = self.channels.lock().unwrap();
            let ch = channels
                .get_mut(&channel)
                .ok_or(DeviceError::NoBinding(channel))?;
            ch.playing = true;
            Ok(())
        }

        fn pause(&self, channel: ChannelKind) -> Result<(), DeviceError> {
            let mut channels = self.channels.lock().unwrap();
            let ch = channels
                .get_mut(&channel)
                .ok_or(DeviceError::NoBinding(channel))?;
            ch.playing = false;
            Ok(())
        }

        fn position(&self, channel: ChannelKind) -> Duration {
            self.channel(channel)
                .map(|c| c.position)
                .unwrap_or(Duration::ZERO)
        }

        fn unload(&self, channel: ChannelKind) {
            self.channels.lock().unwrap().remove(&channel);
        }

        fn tap(&self, channel: ChannelKind) -> Result<Box<dyn FrequencyTap>, DeviceError> {
            if self.channel(channel).is_none() {
                return Err(DeviceError::NoBinding(channel));
            }
            self.taps_open.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockTap {
                bins: Arc::clone(&self.bins),
                taps_open: Arc::clone(&self.taps_open),
            }))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
