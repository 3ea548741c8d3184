//! Signal sampler — periodic amplitude frames from the live channel.
//!
//! [`SignalSampler::attach`] opens a frequency tap on a playing channel and
//! returns a [`SampleStream`]: a lazy sequence of [`SampleFrame`]s produced
//! at a fixed best-effort cadence (~60 Hz by default).  Ticks missed under
//! load are skipped, never queued — every emitted frame reflects the
//! spectrum at the moment it was sampled.
//!
//! The stream ends exactly when its channel leaves `Playing` (a `Pause` or
//! `Ended` lifecycle event, which covers user pause, interruption and
//! natural end).  The tap is dropped deterministically at that point, and
//! restarting playback requires a fresh `attach` — a dead stream never
//! fires again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;

use crate::playback::{
    ChannelKind, DeviceError, PlaybackDevice, PlaybackEvent, PlaybackEventKind,
};

use super::frame::SampleFrame;

/// Default frame cadence (~60 Hz, matched to typical display refresh).
pub const TARGET_FRAME_INTERVAL: Duration = Duration::from_millis(16);

// ---------------------------------------------------------------------------
// SampleStream
// ---------------------------------------------------------------------------

/// A lazy, infinite-while-playing sequence of [`SampleFrame`]s.
///
/// At most one frame is ever pending; a consumer that falls behind simply
/// misses frames.  [`next_frame`](Self::next_frame) returns `None` once the
/// channel has left `Playing` — no frame is ever emitted for a detached
/// channel.
pub struct SampleStream {
    rx: mpsc::Receiver<SampleFrame>,
}

impl SampleStream {
    /// Await the next frame; `None` means the stream has ended.
    pub async fn next_frame(&mut self) -> Option<SampleFrame> {
        self.rx.recv().await
    }
}

// ---------------------------------------------------------------------------
// SignalSampler
// ---------------------------------------------------------------------------

/// Produces [`SampleStream`]s over the playback device's frequency taps.
pub struct SignalSampler {
    device: Arc<dyn PlaybackDevice>,
    frame_interval: Duration,
}

impl SignalSampler {
    /// Create a sampler with the default ~60 Hz cadence.
    pub fn new(device: Arc<dyn PlaybackDevice>) -> Self {
        Self::with_interval(device, TARGET_FRAME_INTERVAL)
    }

    /// Create a sampler with an explicit frame interval.
    pub fn with_interval(device: Arc<dyn PlaybackDevice>, frame_interval: Duration) -> Self {
        Self {
            device,
            frame_interval,
        }
    }

    /// Attach to `channel` and start emitting frames.
    ///
    /// `events` must be a freshly subscribed lifecycle-event receiver (from
    /// [`PlaybackController::subscribe`]); the stream terminates on the
    /// first `Pause` or `Ended` it carries for `channel`.  The underlying
    /// analysis tap is created here — at most once per activation — and torn
    /// down when the stream ends or is dropped.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// [`PlaybackController::subscribe`]: crate::playback::PlaybackController::subscribe
    pub fn attach(
        &self,
        channel: ChannelKind,
        mut events: broadcast::Receiver<PlaybackEvent>,
    ) -> Result<SampleStream, DeviceError> {
        let tap = self.device.tap(channel)?;
        let (tx, rx) = mpsc::channel::<SampleFrame>(1);

        let frame_interval = self.frame_interval;
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(frame_interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticks.tick() => {
                        let frame = SampleFrame::from_bins(&tap.bins());
                        match tx.try_send(frame) {
                            Ok(()) => {}
                            // Consumer is behind — skip this frame.
                            Err(TrySendError::Full(_)) => {}
                            // Consumer dropped the stream.
                            Err(TrySendError::Closed(_)) => break,
                        }
                    }
                    event = events.recv() => match event {
                        Ok(ev)
                            if ev.channel == channel
                                && matches!(
                                    ev.kind,
                                    PlaybackEventKind::Pause | PlaybackEventKind::Ended
                                ) =>
                        {
                            break;
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            log::debug!("sampler: lagged {missed} lifecycle events");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
            // Deterministic teardown: the tap (and its analysis resources)
            // goes away on every exit transition.
            drop(tap);
        });

        Ok(SampleStream { rx })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
