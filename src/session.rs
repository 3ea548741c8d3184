//! Session façade — wires the pipeline, playback and visualization together.
//!
//! [`Session`] owns the shared state, the [`PipelineOrchestrator`], the
//! [`PlaybackController`] and the [`SignalSampler`], and implements the
//! session-level data flow:
//!
//! ```text
//! submit_url ─▶ main pipeline ─▶ artifact ─▶ load_and_play ─▶ Playing
//!                                                               │
//! ask ─▶ pause main ─▶ answer pipeline ─▶ interrupt_for_answer  │
//!              │              │                │                ▼
//!              │              └─ failure ──▶ resume (fail open)  sampler
//!              │                                                frames ─▶ BarSinks
//!              └─ answer clip ends ─▶ main resumes where it paused
//! ```
//!
//! Policies enforced here (the components below stay policy-free):
//!
//! * A new URL submission is rejected while an answer interruption is
//!   unresolved (answer pipeline in flight, or the answer clip playing).
//! * A question no-ops unless a main track is addressable.
//! * On answer-pipeline failure the main track resumes if this session
//!   paused it (failing open rather than leaving playback stuck).

use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::pipeline::{
    new_shared_session, MainOutcome, PipelineError, PipelineOrchestrator, SharedSession, Slot,
};
use crate::playback::{
    ChannelKind, DeviceEvent, MainState, PlaybackController, PlaybackDevice, PlaybackEventKind,
};
use crate::services::{AnswerService, ScriptService, SpeechSynthesizer};
use crate::viz::{SignalSampler, MAGNITUDE_FLOOR};

// ---------------------------------------------------------------------------
// BarSink
// ---------------------------------------------------------------------------

/// One visualization bar.
///
/// The session holds an index-addressed array of sinks; band `i` of every
/// sample frame is pushed to sink `i`.  When the sample stream ends the
/// sinks are reset to [`MAGNITUDE_FLOOR`].
pub trait BarSink: Send + Sync {
    /// Update the bar to `magnitude` visual units.
    fn set_magnitude(&self, magnitude: f32);
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The single live orchestration instance.
///
/// Construct with [`Session::new`] inside a tokio runtime; drop it (and the
/// process) to end the session — nothing survives teardown.
pub struct Session {
    id: String,
    state: SharedSession,
    orchestrator: PipelineOrchestrator,
    controller: Arc<PlaybackController>,
    sampler: SignalSampler,
    sinks: Arc<Mutex<Vec<Arc<dyn BarSink>>>>,
}

impl Session {
    /// Create a session over a playback device and the three remote
    /// services.  `device_events` is the receiver returned by the device's
    /// constructor.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(
        device: Arc<dyn PlaybackDevice>,
        device_events: mpsc::UnboundedReceiver<DeviceEvent>,
        scripts: Arc<dyn ScriptService>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        answers: Arc<dyn AnswerService>,
    ) -> Arc<Self> {
        let id = Uuid::new_v4().to_string();
        let state = new_shared_session();
        let controller = Arc::new(PlaybackController::new(Arc::clone(&device), device_events));
        let sampler = SignalSampler::new(device);
        let orchestrator =
            PipelineOrchestrator::new(id.clone(), state.clone(), scripts, synthesizer, answers);

        let session = Arc::new(Self {
            id,
            state,
            orchestrator,
            controller,
            sampler,
            sinks: Arc::new(Mutex::new(Vec::new())),
        });
        Self::spawn_event_loop(&session);
        session
    }

    /// The session identifier threaded through every service request.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The playback controller (position, state, event subscription).
    pub fn playback(&self) -> &PlaybackController {
        &self.controller
    }

    /// True while any pipeline is in flight.
    pub fn is_loading(&self) -> bool {
        self.state.lock().unwrap().is_loading()
    }

    /// Mirror of the device state: true while any channel is audible.
    pub fn is_playing(&self) -> bool {
        self.state.lock().unwrap().is_playing
    }

    /// The most recently committed source URL.
    pub fn source_url(&self) -> String {
        self.state.lock().unwrap().source_url.clone()
    }

    /// Replace the visualization sinks (index-addressed, one per band).
    pub fn set_bar_sinks(&self, sinks: Vec<Arc<dyn BarSink>>) {
        *self.sinks.lock().unwrap() = sinks;
    }

    // -----------------------------------------------------------------------
    // User operations
    // -----------------------------------------------------------------------

    /// Submit a media URL: run the Main pipeline and start playback.
    ///
    /// Rejected with [`PipelineError::Busy`] while an answer interruption is
    /// unresolved.  A superseded run (a newer submission won the race) is
    /// not an error — playback of the newer artifact is already under way.
    pub async fn submit_url(&self, url: &str) -> Result<(), PipelineError> {
        if matches!(self.controller.state(), MainState::Interrupted { .. }) {
            return Err(PipelineError::Busy(Slot::Answer));
        }

        match self.orchestrator.run_main_pipeline(url).await? {
            MainOutcome::Completed(artifact) => {
                self.controller.load_and_play(&artifact)?;
                Ok(())
            }
            MainOutcome::Superseded => Ok(()),
        }
    }

    /// Ask a question about the playing podcast.
    ///
    /// Pauses the main track immediately, resolves the spoken answer, and
    /// plays it as an interruption; the main track resumes where it paused
    /// once the answer ends.  Returns `Ok(false)` when the question no-ops
    /// (empty text, or no addressable track).
    pub async fn ask(&self, question: &str) -> Result<bool, PipelineError> {
        self.state.lock().unwrap().pending_question = question.trim().to_string();

        let before = self.controller.state();
        if question.trim().is_empty()
            || !matches!(before, MainState::Playing | MainState::Paused)
        {
            return Ok(false);
        }

        // Interrupt at the moment of asking, not when the answer arrives —
        // the captured position is where the listener's question belongs.
        let paused_here = before == MainState::Playing;
        if paused_here {
            self.controller.pause();
        }

        let result = self.orchestrator.run_answer_pipeline(question).await;
        match result {
            Ok(Some(artifact)) => match self.controller.interrupt_for_answer(&artifact) {
                Ok(()) => {
                    self.state.lock().unwrap().pending_question.clear();
                    Ok(true)
                }
                Err(e) => {
                    if paused_here {
                        self.controller.resume();
                    }
                    Err(PipelineError::Playback(e))
                }
            },
            Ok(None) => {
                if paused_here {
                    self.controller.resume();
                }
                Ok(false)
            }
            Err(e) => {
                // Fail open: don't leave the main track stuck paused.
                if paused_here {
                    self.controller.resume();
                }
                Err(e)
            }
        }
    }

    /// Pause the main track (no-op during an answer interruption).
    pub fn pause(&self) {
        self.controller.pause();
    }

    /// Resume the main track (no-op during an answer interruption).
    pub fn resume(&self) {
        self.controller.resume();
    }

    // -----------------------------------------------------------------------
    // Event loop
    // -----------------------------------------------------------------------

    /// Mirror controller lifecycle events into state and drive the
    /// visualization: every `Play` starts a fresh sampler activation on the
    /// now-audible channel.
    fn spawn_event_loop(session: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(session);
        let mut events = session.controller.subscribe();

        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        log::debug!("session: lagged {missed} lifecycle events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Some(session) = weak.upgrade() else { break };

                match event.kind {
                    PlaybackEventKind::Play => {
                        session.state.lock().unwrap().is_playing = true;
                        session.start_visualization(event.channel);
                    }
                    PlaybackEventKind::Pause | PlaybackEventKind::Ended => {
                        session.state.lock().unwrap().is_playing = false;
                    }
                }
            }
        });
    }

    /// Attach the sampler to `channel` and pump frames into the sinks until
    /// the stream ends, then drop the bars back to the floor.
    fn start_visualization(self: &Arc<Self>, channel: ChannelKind) {
        let mut stream = match self.sampler.attach(channel, self.controller.subscribe()) {
            Ok(stream) => stream,
            Err(e) => {
                log::debug!("session: cannot attach sampler to {channel}: {e}");
                return;
            }
        };

        let sinks = Arc::clone(&self.sinks);
        tokio::spawn(async move {
            while let Some(frame) = stream.next_frame().await {
                let sinks = sinks.lock().unwrap();
                for (i, sink) in sinks.iter().enumerate() {
                    sink.set_magnitude(frame.bands.get(i).copied().unwrap_or(MAGNITUDE_FLOOR));
                }
            }
            for sink in sinks.lock().unwrap().iter() {
                sink.set_magnitude(MAGNITUDE_FLOOR);
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;

    use crate::playback::MockDevice;
    use crate::services::{ServiceError, SynthesizedAudio};
    use crate::viz::MAGNITUDE_CEIL;

    use super::*;

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    struct OkScript;

    #[async_trait]
    impl ScriptService for OkScript {
        async fn fetch_script(&self, _: &str, _: &str) -> Result<String, ServiceError> {
            Ok("hello".to_string())
        }
    }

    struct EchoSynth;

    #[async_trait]
    impl SpeechSynthesizer for EchoSynth {
        async fn synthesize(&self, _: &str, text: &str) -> Result<SynthesizedAudio, ServiceError> {
            Ok(SynthesizedAudio {
                payload: Bytes::from(text.as_bytes().to_vec()),
                content_type: "audio/mpeg".to_string(),
            })
        }
    }

    struct OkAnswer;

    #[async_trait]
    impl AnswerService for OkAnswer {
        async fn answer(&self, _: &str, _: &str, _: &str) -> Result<String, ServiceError> {
            Ok("the answer".to_string())
        }
    }

    struct FailAnswer;

    #[async_trait]
    impl AnswerService for FailAnswer {
        async fn answer(&self, _: &str, _: &str, _: &str) -> Result<String, ServiceError> {
            Err(ServiceError::Status(502))
        }
    }

    /// Bar sink recording the last magnitude it was given.
    struct RecordingSink(Mutex<f32>);

    impl BarSink for RecordingSink {
        fn set_magnitude(&self, magnitude: f32) {
            *self.0.lock().unwrap() = magnitude;
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn session_with(answers: Arc<dyn AnswerService>) -> (Arc<Session>, Arc<MockDevice>) {
        let (device, device_events) = MockDevice::new();
        let session = Session::new(
            device.clone(),
            device_events,
            Arc::new(OkScript),
            Arc::new(EchoSynth),
            answers,
        );
        (session, device)
    }

    /// Poll `condition` until it holds or a second elapses.
    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn submitted_url_ends_up_playing() {
        let (session, device) = session_with(Arc::new(OkAnswer));

        session.submit_url("https://video/x").await.unwrap();

        assert_eq!(session.playback().state(), MainState::Playing);
        assert!(device.is_playing(ChannelKind::Main));
        assert!(!session.is_loading());
        assert_eq!(session.source_url(), "https://video/x");
        wait_until(|| session.is_playing()).await;
    }

    #[tokio::test]
    async fn empty_url_is_rejected() {
        let (session, device) = session_with(Arc::new(OkAnswer));

        let err = session.submit_url("").await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
        assert!(!device.is_playing(ChannelKind::Main));
    }

    #[tokio::test]
    async fn ask_without_track_is_a_noop() {
        let (session, device) = session_with(Arc::new(OkAnswer));

        let interrupted = session.ask("what is this?").await.unwrap();
        assert!(!interrupted);
        assert!(!device.is_playing(ChannelKind::Answer));
    }

    #[tokio::test]
    async fn ask_interrupts_and_resumes_at_the_same_position() {
        let (session, device) = session_with(Arc::new(OkAnswer));
        session.submit_url("https://video/x").await.unwrap();
        device.set_position(ChannelKind::Main, Duration::from_secs(12));

        let interrupted = session.ask("what is this about?").await.unwrap();
        assert!(interrupted);

        // Main paused pending resume at 12 s, answer audible.
        assert_eq!(
            session.playback().position_on_interrupt(),
            Some(Duration::from_secs(12))
        );
        assert!(device.is_playing(ChannelKind::Answer));
        assert!(!device.is_playing(ChannelKind::Main));

        device.emit_ended(ChannelKind::Answer);
        wait_until(|| session.playback().state() == MainState::Playing).await;

        // Resumed where it paused — not at zero, not wall-clock later.
        assert_eq!(device.position(ChannelKind::Main), Duration::from_secs(12));
        assert!(device.is_playing(ChannelKind::Main));
        assert!(device.channel(ChannelKind::Answer).is_none());
    }

    #[tokio::test]
    async fn failed_answer_fails_open_and_resumes() {
        let (session, device) = session_with(Arc::new(FailAnswer));
        session.submit_url("https://video/x").await.unwrap();

        let err = session.ask("why?").await.unwrap_err();
        assert!(matches!(err, PipelineError::Upstream { .. }));

        // The main track must not be left stuck paused.
        assert_eq!(session.playback().state(), MainState::Playing);
        assert!(device.is_playing(ChannelKind::Main));
    }

    #[tokio::test]
    async fn failed_answer_respects_a_user_pause() {
        let (session, device) = session_with(Arc::new(FailAnswer));
        session.submit_url("https://video/x").await.unwrap();
        session.pause();

        let _ = session.ask("why?").await.unwrap_err();

        // The user paused before asking; failing open must not unpause.
        assert_eq!(session.playback().state(), MainState::Paused);
        assert!(!device.is_playing(ChannelKind::Main));
    }

    #[tokio::test]
    async fn resubmission_is_rejected_during_an_interruption() {
        let (session, _device) = session_with(Arc::new(OkAnswer));
        session.submit_url("https://video/x").await.unwrap();
        session.ask("what?").await.unwrap();

        let err = session.submit_url("https://video/y").await.unwrap_err();
        assert!(matches!(err, PipelineError::Busy(Slot::Answer)));
    }

    #[tokio::test]
    async fn bars_rise_while_playing_and_reset_on_pause() {
        let (session, device) = session_with(Arc::new(OkAnswer));

        let sinks: Vec<Arc<RecordingSink>> = (0..4)
            .map(|_| Arc::new(RecordingSink(Mutex::new(0.0))))
            .collect();
        session.set_bar_sinks(sinks.iter().map(|s| s.clone() as Arc<dyn BarSink>).collect());

        device.set_bins(vec![1.0; 16]);
        session.submit_url("https://video/x").await.unwrap();

        wait_until(|| sinks.iter().all(|s| *s.0.lock().unwrap() == MAGNITUDE_CEIL)).await;

        session.pause();
        wait_until(|| sinks.iter().all(|s| *s.0.lock().unwrap() == MAGNITUDE_FLOOR)).await;
    }

    #[tokio::test]
    async fn session_ids_are_unique() {
        let (a, _) = session_with(Arc::new(OkAnswer));
        let (b, _) = session_with(Arc::new(OkAnswer));
        assert_ne!(a.id(), b.id());
        assert!(!a.id().is_empty());
    }
}
