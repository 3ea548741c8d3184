//! Playback controller — owns the output device and the track state machine.
//!
//! [`PlaybackController`] is the only component allowed to start or stop
//! playback.  It binds the Main track, runs the answer-interruption protocol
//! and emits lifecycle events that the signal sampler and any UI layer
//! subscribe to.
//!
//! # State machine
//!
//! ```text
//! Idle ──load_and_play──▶ Playing ◀──resume── Paused
//!                            │  ──pause──────▶  │
//!                            │                  │
//!                            ├──interrupt───────┤
//!                            ▼                  ▼
//!                  Interrupted { resume_at }  (Answer channel audible)
//!                            │
//!                            └─Answer ends──▶ Playing   (at resume_at)
//!
//! Playing ──main track drains──▶ Ended
//! ```
//!
//! Transitions are a pure function of (state, input) — see [`transition`] —
//! so resume logic is testable without a device.  The controller applies the
//! returned effects against the injected [`PlaybackDevice`] and broadcasts
//! [`PlaybackEvent`]s.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use super::artifact::AudioArtifact;
use super::device::{ChannelKind, DeviceError, DeviceEvent, PlaybackDevice};

/// Capacity of the lifecycle-event bus.
const EVENT_BUS_CAPACITY: usize = 32;

// ---------------------------------------------------------------------------
// MainState
// ---------------------------------------------------------------------------

/// State of the Main track.
///
/// The Answer channel has no state of its own: it is audible exactly while
/// the Main track is `Interrupted`, and is released the moment the
/// interruption resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainState {
    /// No artifact loaded.
    Idle,
    /// The Main track is audible.
    Playing,
    /// The Main track is paused by the user.
    Paused,
    /// The Main track is paused pending resume while an Answer clip plays;
    /// `resume_at` is the position captured when the interruption began.
    Interrupted { resume_at: Duration },
    /// The Main track drained to its natural end.  There is no auto-restart:
    /// `resume` from here is a no-op, and only a fresh `load_and_play`
    /// leaves this state.
    Ended,
}

// ---------------------------------------------------------------------------
// PlaybackEvent
// ---------------------------------------------------------------------------

/// Lifecycle event kinds fired on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEventKind {
    Play,
    Pause,
    Ended,
}

/// One lifecycle event on the controller's broadcast bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackEvent {
    pub channel: ChannelKind,
    pub kind: PlaybackEventKind,
}

// ---------------------------------------------------------------------------
// ControllerError
// ---------------------------------------------------------------------------

/// Errors surfaced by controller operations.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The underlying device rejected an operation.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// `interrupt_for_answer` requires a Main track in `Playing` or
    /// `Paused`.
    #[error("no interruptible main track (not playing or paused)")]
    NoTrack,
}

// ---------------------------------------------------------------------------
// Transition table
// ---------------------------------------------------------------------------

/// Inputs driving the state machine: user/session commands plus device
/// notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    /// A new Main artifact was bound and should start playing.
    Load,
    Pause,
    Resume,
    /// An Answer artifact was bound; `at` is the Main position to resume at.
    Interrupt { at: Duration },
    AnswerEnded,
    AnswerFailed,
    MainEnded,
}

/// Device calls / event emissions produced by a transition, applied in
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Effect {
    PlayMain,
    PauseMain,
    PlayAnswer,
    ReleaseAnswer,
    Emit(ChannelKind, PlaybackEventKind),
}

/// The pure transition function.  Returns `None` when the input does not
/// apply in the current state (the command is a no-op / must be rejected).
fn transition(state: &MainState, input: Input) -> Option<(MainState, Vec<Effect>)> {
    use ChannelKind::{Answer, Main};
    use PlaybackEventKind::{Ended, Pause, Play};

    match (state, input) {
        // Binding a new Main artifact always wins; an in-flight Answer
        // channel is released first so only one channel stays audible.
        (MainState::Interrupted { .. }, Input::Load) => Some((
            MainState::Playing,
            vec![
                Effect::ReleaseAnswer,
                Effect::Emit(Answer, Ended),
                Effect::PlayMain,
                Effect::Emit(Main, Play),
            ],
        )),
        // Replacing an audible track closes its activation first so samplers
        // attached to the old artifact terminate before the new one starts.
        (MainState::Playing, Input::Load) => Some((
            MainState::Playing,
            vec![
                Effect::Emit(Main, Pause),
                Effect::PlayMain,
                Effect::Emit(Main, Play),
            ],
        )),
        (_, Input::Load) => Some((
            MainState::Playing,
            vec![Effect::PlayMain, Effect::Emit(Main, Play)],
        )),

        (MainState::Playing, Input::Pause) => Some((
            MainState::Paused,
            vec![Effect::PauseMain, Effect::Emit(Main, Pause)],
        )),
        (MainState::Paused, Input::Resume) => Some((
            MainState::Playing,
            vec![Effect::PlayMain, Effect::Emit(Main, Play)],
        )),

        (MainState::Playing, Input::Interrupt { at }) => Some((
            MainState::Interrupted { resume_at: at },
            vec![
                Effect::PauseMain,
                Effect::Emit(Main, Pause),
                Effect::PlayAnswer,
                Effect::Emit(Answer, Play),
            ],
        )),
        // Interrupting an already-paused track emits no extra Main pause.
        (MainState::Paused, Input::Interrupt { at }) => Some((
            MainState::Interrupted { resume_at: at },
            vec![Effect::PlayAnswer, Effect::Emit(Answer, Play)],
        )),

        // Natural Answer completion resumes the Main track at the captured
        // position (the Main sink held it while paused).
        (MainState::Interrupted { .. }, Input::AnswerEnded)
        | (MainState::Interrupted { .. }, Input::AnswerFailed) => Some((
            MainState::Playing,
            vec![
                Effect::ReleaseAnswer,
                Effect::Emit(Answer, Ended),
                Effect::PlayMain,
                Effect::Emit(Main, Play),
            ],
        )),

        (MainState::Playing, Input::MainEnded) => {
            Some((MainState::Ended, vec![Effect::Emit(Main, Ended)]))
        }

        _ => None,
    }
}

// ---------------------------------------------------------------------------
// PlaybackController
// ---------------------------------------------------------------------------

struct Shared {
    device: Arc<dyn PlaybackDevice>,
    state: Mutex<MainState>,
    events_tx: broadcast::Sender<PlaybackEvent>,
}

impl Shared {
    /// Run `input` through the transition table; apply the effects and
    /// return `true` when a transition fired.
    fn apply(&self, input: Input) -> bool {
        let mut state = self.state.lock().unwrap();
        let Some((next, effects)) = transition(&state, input) else {
            return false;
        };
        log::debug!("playback: {:?} --{:?}--> {:?}", *state, input, next);
        *state = next;

        // Effects run under the state lock so event order matches the
        // transition order seen by concurrent commands.
        for effect in effects {
            match effect {
                Effect::PlayMain => {
                    if let Err(e) = self.device.play(ChannelKind::Main) {
                        log::error!("playback: failed to start main channel: {e}");
                    }
                }
                Effect::PauseMain => {
                    if let Err(e) = self.device.pause(ChannelKind::Main) {
                        log::error!("playback: failed to pause main channel: {e}");
                    }
                }
                Effect::PlayAnswer => {
                    if let Err(e) = self.device.play(ChannelKind::Answer) {
                        log::error!("playback: failed to start answer channel: {e}");
                    }
                }
                Effect::ReleaseAnswer => self.device.unload(ChannelKind::Answer),
                Effect::Emit(channel, kind) => {
                    // Send errors just mean nobody is subscribed right now.
                    let _ = self.events_tx.send(PlaybackEvent { channel, kind });
                }
            }
        }
        true
    }
}

/// Owns the single audio output and sequences Main/Answer playback.
///
/// Construct with [`PlaybackController::new`] inside a tokio runtime (a
/// background task pumps device events into the state machine).
pub struct PlaybackController {
    shared: Arc<Shared>,
}

impl PlaybackController {
    /// Create a controller over `device`, consuming the device's event
    /// stream.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(
        device: Arc<dyn PlaybackDevice>,
        mut device_events: mpsc::UnboundedReceiver<DeviceEvent>,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        let shared = Arc::new(Shared {
            device,
            state: Mutex::new(MainState::Idle),
            events_tx,
        });

        let pump = Arc::clone(&shared);
        tokio::spawn(async move {
            while let Some(event) = device_events.recv().await {
                match event {
                    DeviceEvent::Ended(ChannelKind::Answer) => {
                        pump.apply(Input::AnswerEnded);
                    }
                    DeviceEvent::Ended(ChannelKind::Main) => {
                        pump.apply(Input::MainEnded);
                    }
                    DeviceEvent::Failed { channel, message } => {
                        log::warn!("playback: {channel} channel failed: {message}");
                        match channel {
                            // Fail open: a dead answer clip must not leave
                            // the main track stuck paused.
                            ChannelKind::Answer => pump.apply(Input::AnswerFailed),
                            ChannelKind::Main => pump.apply(Input::MainEnded),
                        };
                    }
                }
            }
            log::debug!("playback: device event stream closed");
        });

        Self { shared }
    }

    /// Subscribe to lifecycle events (`Play` / `Pause` / `Ended` per
    /// channel).
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.shared.events_tx.subscribe()
    }

    /// Current state of the Main track.
    pub fn state(&self) -> MainState {
        *self.shared.state.lock().unwrap()
    }

    /// The Main position captured when the current interruption began, if
    /// one is in progress.
    pub fn position_on_interrupt(&self) -> Option<Duration> {
        match self.state() {
            MainState::Interrupted { resume_at } => Some(resume_at),
            _ => None,
        }
    }

    /// Current playback position of the Main track.
    pub fn position(&self) -> Duration {
        self.shared.device.position(ChannelKind::Main)
    }

    /// Bind `artifact` to the Main channel and start playback, replacing any
    /// existing binding (the previous artifact's decode and visualization
    /// resources are released).  An in-flight Answer channel is released.
    pub fn load_and_play(&self, artifact: &AudioArtifact) -> Result<(), ControllerError> {
        self.shared.device.load(ChannelKind::Main, artifact)?;
        self.shared.apply(Input::Load);
        Ok(())
    }

    /// Interrupt the Main track with a transient Answer clip.
    ///
    /// Precondition: the Main track is `Playing` or `Paused` — otherwise
    /// [`ControllerError::NoTrack`].  Captures the current Main position,
    /// pauses Main, and plays `artifact` on the Answer channel.  When the
    /// clip drains naturally the Answer channel is released and Main resumes
    /// from the captured position.
    pub fn interrupt_for_answer(&self, artifact: &AudioArtifact) -> Result<(), ControllerError> {
        {
            let state = self.shared.state.lock().unwrap();
            if !matches!(*state, MainState::Playing | MainState::Paused) {
                return Err(ControllerError::NoTrack);
            }
        }

        let at = self.shared.device.position(ChannelKind::Main);
        self.shared.device.load(ChannelKind::Answer, artifact)?;

        if !self.shared.apply(Input::Interrupt { at }) {
            // The main track ended between the precondition check and the
            // transition; back out the answer binding.
            self.shared.device.unload(ChannelKind::Answer);
            return Err(ControllerError::NoTrack);
        }
        Ok(())
    }

    /// Pause the Main track.
    ///
    /// Policy (not a hard constraint): a silent no-op unless the Main track
    /// is `Playing` — in particular, user controls are disabled while an
    /// Answer interruption is in progress.
    pub fn pause(&self) {
        self.shared.apply(Input::Pause);
    }

    /// Resume the Main track from `Paused`.
    ///
    /// Same policy as [`pause`](Self::pause): a silent no-op in any other
    /// state.  Resuming from `Ended` does not restart the track.
    pub fn resume(&self) {
        self.shared.apply(Input::Resume);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
