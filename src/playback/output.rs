//! Audio output via `rodio`.
//!
//! [`RodioOutput`] implements [`PlaybackDevice`] with one output stream and
//! one `rodio::Sink` per channel, all owned by a dedicated engine thread
//! (cpal streams are not `Send`).  Commands arrive over an mpsc channel with
//! synchronous replies; natural end-of-clip is detected by watching a
//! playing sink drain and is reported on the device event stream.
//!
//! Each channel's decoded samples pass through [`AnalyzingSource`], which
//! computes an FFT spectrum into state shared with the channel's
//! [`FrequencyTap`]s.  The FFT only runs while at least one tap is open.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use rodio::{Decoder, OutputStream, Sink, Source};
use rustfft::{num_complex::Complex, FftPlanner};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use super::artifact::AudioArtifact;
use super::device::{ChannelKind, DeviceError, DeviceEvent, FrequencyTap, PlaybackDevice};

/// FFT window length (samples) for the spectrum tap.
const FFT_SIZE: usize = 512;

/// Number of spectrum bins exposed to taps.
const SPECTRUM_BINS: usize = 16;

/// How often the engine thread checks for drained sinks.
const DRAIN_POLL: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// Shared spectrum state
// ---------------------------------------------------------------------------

/// Per-channel analysis state shared between the engine thread and taps.
struct SpectrumShared {
    bins: Mutex<[f32; SPECTRUM_BINS]>,
    /// Open tap count; the analyzer skips FFT work at zero.
    taps: AtomicUsize,
    /// Whether an artifact is currently bound to the channel.
    bound: AtomicBool,
}

impl SpectrumShared {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            bins: Mutex::new([0.0; SPECTRUM_BINS]),
            taps: AtomicUsize::new(0),
            bound: AtomicBool::new(false),
        })
    }

    fn reset(&self) {
        *self.bins.lock().unwrap() = [0.0; SPECTRUM_BINS];
    }
}

struct SpectrumTap {
    shared: Arc<SpectrumShared>,
}

impl FrequencyTap for SpectrumTap {
    fn bins(&self) -> Vec<f32> {
        self.shared.bins.lock().unwrap().to_vec()
    }
}

impl Drop for SpectrumTap {
    fn drop(&mut self) {
        self.shared.taps.fetch_sub(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// AnalyzingSource
// ---------------------------------------------------------------------------

/// Wrapper source that passes samples through unchanged while writing an FFT
/// spectrum into [`SpectrumShared`].
struct AnalyzingSource<S> {
    inner: S,
    shared: Arc<SpectrumShared>,
    /// Mono downmix accumulation buffer.
    window: Vec<f32>,
    /// Running sum of the current interleaved frame.
    frame_acc: f32,
    frame_fill: u16,
    channels: u16,
    sample_rate: u32,
    planner: FftPlanner<f32>,
}

impl<S> AnalyzingSource<S>
where
    S: Source<Item = f32>,
{
    fn new(inner: S, shared: Arc<SpectrumShared>) -> Self {
        let channels = inner.channels().max(1);
        let sample_rate = inner.sample_rate();
        Self {
            inner,
            shared,
            window: Vec::with_capacity(FFT_SIZE),
            frame_acc: 0.0,
            frame_fill: 0,
            channels,
            sample_rate,
            planner: FftPlanner::new(),
        }
    }

    fn process_window(&mut self) {
        if self.shared.taps.load(Ordering::SeqCst) == 0 {
            self.window.clear();
            return;
        }

        let fft = self.planner.plan_fft_forward(FFT_SIZE);
        let mut buf: Vec<Complex<f32>> = self
            .window
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                // Hann window
                let w = 0.5
                    * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / FFT_SIZE as f32).cos());
                Complex::new(s * w, 0.0)
            })
            .collect();
        fft.process(&mut buf);

        let nyquist = FFT_SIZE / 2;
        let norm = 1.0 / FFT_SIZE as f32;
        let per_bin = nyquist / SPECTRUM_BINS;

        let mut bins = [0.0f32; SPECTRUM_BINS];
        for (b, bin) in bins.iter_mut().enumerate() {
            let start = b * per_bin;
            let end = (start + per_bin).min(nyquist);
            let mut peak = 0.0f32;
            for c in &buf[start..end] {
                peak = peak.max(c.norm() * norm);
            }
            *bin = (peak * 8.0).sqrt().min(1.0);
        }

        *self.shared.bins.lock().unwrap() = bins;
        self.window.clear();
    }
}

impl<S> Iterator for AnalyzingSource<S>
where
    S: Source<Item = f32>,
{
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        let sample = self.inner.next()?;

        // Downmix interleaved frames to mono before windowing.
        self.frame_acc += sample;
        self.frame_fill += 1;
        if self.frame_fill == self.channels {
            self.window.push(self.frame_acc / self.channels as f32);
            self.frame_acc = 0.0;
            self.frame_fill = 0;
            if self.window.len() >= FFT_SIZE {
                self.process_window();
            }
        }

        Some(sample)
    }
}

impl<S> Source for AnalyzingSource<S>
where
    S: Source<Item = f32>,
{
    fn current_frame_len(&self) -> Option<usize> {
        self.inner.current_frame_len()
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }
}

// ---------------------------------------------------------------------------
// Engine commands
// ---------------------------------------------------------------------------

enum EngineCommand {
    Load {
        channel: ChannelKind,
        payload: Bytes,
        reply: SyncSender<Result<(), DeviceError>>,
    },
    Play {
        channel: ChannelKind,
        reply: SyncSender<Result<(), DeviceError>>,
    },
    Pause {
        channel: ChannelKind,
        reply: SyncSender<Result<(), DeviceError>>,
    },
    Position {
        channel: ChannelKind,
        reply: SyncSender<Duration>,
    },
    Unload(ChannelKind),
    Shutdown,
}

// ---------------------------------------------------------------------------
// RodioOutput
// ---------------------------------------------------------------------------

/// Production [`PlaybackDevice`] backed by `rodio`.
///
/// Construct with [`RodioOutput::open`]; the returned receiver carries
/// [`DeviceEvent`]s (natural end of either channel) and is normally handed
/// straight to [`PlaybackController::new`](super::PlaybackController::new).
pub struct RodioOutput {
    cmd_tx: Sender<EngineCommand>,
    spectra: [Arc<SpectrumShared>; 2],
    thread: Option<JoinHandle<()>>,
}

impl RodioOutput {
    /// Open the default audio output at the given volume (clamped to
    /// `0.0..=2.0`), spawning the engine thread.
    ///
    /// Blocks until the output stream is initialized (or fails).
    pub fn open(volume: f32) -> Result<(Self, UnboundedReceiver<DeviceEvent>), DeviceError> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<EngineCommand>();
        let (init_tx, init_rx) = mpsc::sync_channel::<Result<(), String>>(1);
        let (events_tx, events_rx) = unbounded_channel::<DeviceEvent>();

        let spectra = [SpectrumShared::new(), SpectrumShared::new()];
        let thread_spectra = [Arc::clone(&spectra[0]), Arc::clone(&spectra[1])];
        let volume = volume.clamp(0.0, 2.0);

        let thread = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                Self::run(cmd_rx, init_tx, events_tx, thread_spectra, volume);
            })
            .map_err(|e| DeviceError::Unavailable(format!("failed to spawn engine thread: {e}")))?;

        init_rx
            .recv()
            .map_err(|_| DeviceError::Unavailable("engine thread died during init".into()))?
            .map_err(DeviceError::Unavailable)?;

        Ok((
            Self {
                cmd_tx,
                spectra,
                thread: Some(thread),
            },
            events_rx,
        ))
    }

    fn spectrum(&self, channel: ChannelKind) -> &Arc<SpectrumShared> {
        match channel {
            ChannelKind::Main => &self.spectra[0],
            ChannelKind::Answer => &self.spectra[1],
        }
    }

    fn request<T>(
        &self,
        build: impl FnOnce(SyncSender<T>) -> EngineCommand,
    ) -> Result<T, DeviceError> {
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        self.cmd_tx
            .send(build(reply_tx))
            .map_err(|_| DeviceError::Unavailable("engine thread is gone".into()))?;
        reply_rx
            .recv()
            .map_err(|_| DeviceError::Unavailable("engine thread is gone".into()))
    }

    /// The engine thread's main loop.
    fn run(
        cmd_rx: Receiver<EngineCommand>,
        init_tx: SyncSender<Result<(), String>>,
        events_tx: UnboundedSender<DeviceEvent>,
        spectra: [Arc<SpectrumShared>; 2],
        volume: f32,
    ) {
        // The output stream must be created (and kept) on this thread.
        let (_stream, handle) = match OutputStream::try_default() {
            Ok(pair) => pair,
            Err(e) => {
                let _ = init_tx.send(Err(format!("failed to open audio output: {e}")));
                return;
            }
        };
        let _ = init_tx.send(Ok(()));

        struct Slot {
            sink: Option<Sink>,
            playing: bool,
        }
        let mut slots = [
            Slot {
                sink: None,
                playing: false,
            },
            Slot {
                sink: None,
                playing: false,
            },
        ];
        let index = |channel: ChannelKind| match channel {
            ChannelKind::Main => 0usize,
            ChannelKind::Answer => 1usize,
        };
        let kind_of = |i: usize| {
            if i == 0 {
                ChannelKind::Main
            } else {
                ChannelKind::Answer
            }
        };

        loop {
            match cmd_rx.recv_timeout(DRAIN_POLL) {
                Ok(EngineCommand::Load {
                    channel,
                    payload,
                    reply,
                }) => {
                    let i = index(channel);
                    let result = (|| {
                        let decoder = Decoder::new(Cursor::new(payload))
                            .map_err(|e| DeviceError::Decode(e.to_string()))?;
                        let sink = Sink::try_new(&handle)
                            .map_err(|e| DeviceError::Unavailable(e.to_string()))?;

                        // Replace any previous binding before appending.
                        if let Some(old) = slots[i].sink.take() {
                            old.stop();
                        }
                        spectra[i].reset();

                        let analyzing = AnalyzingSource::new(
                            decoder.convert_samples::<f32>(),
                            Arc::clone(&spectra[i]),
                        );
                        sink.pause();
                        sink.set_volume(volume);
                        sink.append(analyzing);

                        slots[i].sink = Some(sink);
                        slots[i].playing = false;
                        spectra[i].bound.store(true, Ordering::SeqCst);
                        Ok(())
                    })();
                    let _ = reply.send(result);
                }
                Ok(EngineCommand::Play { channel, reply }) => {
                    let i = index(channel);
                    let result = match slots[i].sink.as_ref() {
                        Some(sink) => {
                            sink.play();
                            slots[i].playing = true;
                            Ok(())
                        }
                        None => Err(DeviceError::NoBinding(channel)),
                    };
                    let _ = reply.send(result);
                }
                Ok(EngineCommand::Pause { channel, reply }) => {
                    let i = index(channel);
                    let result = match slots[i].sink.as_ref() {
                        Some(sink) => {
                            sink.pause();
                            slots[i].playing = false;
                            Ok(())
                        }
                        None => Err(DeviceError::NoBinding(channel)),
                    };
                    let _ = reply.send(result);
                }
                Ok(EngineCommand::Position { channel, reply }) => {
                    let i = index(channel);
                    let pos = slots[i]
                        .sink
                        .as_ref()
                        .map(|s| s.get_pos())
                        .unwrap_or(Duration::ZERO);
                    let _ = reply.send(pos);
                }
                Ok(EngineCommand::Unload(channel)) => {
                    let i = index(channel);
                    if let Some(sink) = slots[i].sink.take() {
                        sink.stop();
                    }
                    slots[i].playing = false;
                    spectra[i].bound.store(false, Ordering::SeqCst);
                    spectra[i].reset();
                }
                Ok(EngineCommand::Shutdown) => {
                    for slot in slots.iter_mut() {
                        if let Some(sink) = slot.sink.take() {
                            sink.stop();
                        }
                    }
                    break;
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    // Detect natural end: a playing sink that drained.
                    for i in 0..slots.len() {
                        let drained = slots[i].playing
                            && slots[i].sink.as_ref().map(|s| s.empty()).unwrap_or(false);
                        if drained {
                            slots[i].sink = None;
                            slots[i].playing = false;
                            spectra[i].bound.store(false, Ordering::SeqCst);
                            spectra[i].reset();
                            let _ = events_tx.send(DeviceEvent::Ended(kind_of(i)));
                        }
                    }
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
    }
}

impl PlaybackDevice for RodioOutput {
    fn load(&self, channel: ChannelKind, artifact: &AudioArtifact) -> Result<(), DeviceError> {
        let payload = artifact.payload().clone();
        self.request(|reply| EngineCommand::Load {
            channel,
            payload,
            reply,
        })?
    }

    fn play(&self, channel: ChannelKind) -> Result<(), DeviceError> {
        self.request(|reply| EngineCommand::Play { channel, reply })?
    }

    fn pause(&self, channel: ChannelKind) -> Result<(), DeviceError> {
        self.request(|reply| EngineCommand::Pause { channel, reply })?
    }

    fn position(&self, channel: ChannelKind) -> Duration {
        self.request(|reply| EngineCommand::Position { channel, reply })
            .unwrap_or(Duration::ZERO)
    }

    fn unload(&self, channel: ChannelKind) {
        let _ = self.cmd_tx.send(EngineCommand::Unload(channel));
    }

    fn tap(&self, channel: ChannelKind) -> Result<Box<dyn FrequencyTap>, DeviceError> {
        let shared = self.spectrum(channel);
        if !shared.bound.load(Ordering::SeqCst) {
            return Err(DeviceError::NoBinding(channel));
        }
        shared.taps.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SpectrumTap {
            shared: Arc::clone(shared),
        }))
    }
}

impl Drop for RodioOutput {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(EngineCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a minimal valid mono WAV file in memory.
    fn make_wav(sample_rate: u32, samples: &[i16]) -> Bytes {
        let data_size = (samples.len() * 2) as u32;
        let byte_rate = sample_rate * 2;

        let mut buf = Vec::new();
        buf.extend_from_slice(b"RIFF");
        buf.extend_from_slice(&(36 + data_size).to_le_bytes());
        buf.extend_from_slice(b"WAVE");
        buf.extend_from_slice(b"fmt ");
        buf.extend_from_slice(&16u32.to_le_bytes());
        buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
        buf.extend_from_slice(&1u16.to_le_bytes()); // mono
        buf.extend_from_slice(&sample_rate.to_le_bytes());
        buf.extend_from_slice(&byte_rate.to_le_bytes());
        buf.extend_from_slice(&2u16.to_le_bytes());
        buf.extend_from_slice(&16u16.to_le_bytes());
        buf.extend_from_slice(b"data");
        buf.extend_from_slice(&data_size.to_le_bytes());
        for &s in samples {
            buf.extend_from_slice(&s.to_le_bytes());
        }
        Bytes::from(buf)
    }

    fn short_clip() -> AudioArtifact {
        let samples: Vec<i16> = (0..441)
            .map(|i| ((i as f32 * 0.5).sin() * 5_000.0) as i16)
            .collect();
        AudioArtifact::new(make_wav(44_100, &samples), "audio/wav")
    }

    /// Open a device, or skip the test when no audio hardware is available.
    fn try_open() -> Option<(RodioOutput, UnboundedReceiver<DeviceEvent>)> {
        RodioOutput::open(0.0).ok()
    }

    fn wait_for_event(
        rx: &mut UnboundedReceiver<DeviceEvent>,
        timeout_ms: u64,
    ) -> Option<DeviceEvent> {
        let deadline = std::time::Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if let Ok(event) = rx.try_recv() {
                return Some(event);
            }
            if std::time::Instant::now() >= deadline {
                return None;
            }
            thread::sleep(Duration::from_millis(25));
        }
    }

    #[test]
    fn open_and_drop() {
        let Some((device, _rx)) = try_open() else {
            return;
        };
        drop(device);
    }

    #[test]
    fn load_invalid_payload_is_a_decode_error() {
        let Some((device, _rx)) = try_open() else {
            return;
        };
        let bad = AudioArtifact::new(Bytes::from_static(&[0u8; 64]), "audio/mpeg");
        let err = device.load(ChannelKind::Main, &bad).unwrap_err();
        assert!(matches!(err, DeviceError::Decode(_)));
    }

    #[test]
    fn play_without_binding_is_an_error() {
        let Some((device, _rx)) = try_open() else {
            return;
        };
        assert!(matches!(
            device.play(ChannelKind::Main).unwrap_err(),
            DeviceError::NoBinding(ChannelKind::Main)
        ));
    }

    #[test]
    fn load_leaves_channel_paused_at_zero() {
        let Some((device, _rx)) = try_open() else {
            return;
        };
        device.load(ChannelKind::Main, &short_clip()).unwrap();
        assert_eq!(device.position(ChannelKind::Main), Duration::ZERO);
    }

    #[test]
    fn short_clip_emits_ended_event() {
        let Some((device, mut rx)) = try_open() else {
            return;
        };
        device.load(ChannelKind::Main, &short_clip()).unwrap();
        device.play(ChannelKind::Main).unwrap();

        match wait_for_event(&mut rx, 3_000) {
            Some(DeviceEvent::Ended(ChannelKind::Main)) => {}
            other => panic!("expected Ended(Main), got {other:?}"),
        }
    }

    #[test]
    fn tap_requires_binding_and_counts_down_on_drop() {
        let Some((device, _rx)) = try_open() else {
            return;
        };
        assert!(device.tap(ChannelKind::Main).is_err());

        device.load(ChannelKind::Main, &short_clip()).unwrap();
        let tap = device.tap(ChannelKind::Main).unwrap();
        assert_eq!(tap.bins().len(), SPECTRUM_BINS);
        drop(tap);

        device.unload(ChannelKind::Main);
    }

    #[test]
    fn both_channels_can_be_bound_independently() {
        let Some((device, _rx)) = try_open() else {
            return;
        };
        device.load(ChannelKind::Main, &short_clip()).unwrap();
        device.load(ChannelKind::Answer, &short_clip()).unwrap();
        device.play(ChannelKind::Answer).unwrap();
        device.pause(ChannelKind::Answer).unwrap();
        device.unload(ChannelKind::Answer);
        device.unload(ChannelKind::Main);
    }
}
