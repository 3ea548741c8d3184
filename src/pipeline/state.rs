//! Shared session state and its invariants.
//!
//! [`SessionState`] is the single source of truth the pipeline orchestrator,
//! playback controller and any front-end read: the submitted URL, the
//! current artifact, the pending question, the playing flag, and the
//! per-slot loading spans.
//!
//! Two invariants live here rather than in the orchestrator:
//!
//! * A loading span covers a whole pipeline run and ends on every exit
//!   path.  When Main runs overlap, only the latest run's span accounts for
//!   `is_loading` — a superseded run settling later cannot clear a newer
//!   span (per-slot generation tags).
//! * Only a Main run that is still the latest may replace the artifact, so
//!   a stale result can never overwrite a newer one.
//!
//! [`SharedSession`] is a type alias for `Arc<Mutex<SessionState>>` — cheap
//! to clone, locked for short critical sections, never held across `.await`.

use std::sync::{Arc, Mutex};

use crate::playback::AudioArtifact;

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

/// The logical pipeline target.  Main and Answer never share a concurrency
/// slot: they track their in-flight spans independently, and only Main
/// mutates the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Main,
    Answer,
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::Main => write!(f, "main"),
            Slot::Answer => write!(f, "answer"),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// The live orchestration state of one session.
///
/// Created empty at session start, destroyed at teardown — nothing is
/// persisted.
#[derive(Debug, Default)]
pub struct SessionState {
    /// The most recently committed source URL.
    pub source_url: String,

    /// The question currently awaiting (or undergoing) an answer pipeline.
    pub pending_question: String,

    /// Mirror of the playback device state, maintained from controller
    /// lifecycle events.
    pub is_playing: bool,

    artifact: Option<AudioArtifact>,
    script: Option<String>,

    /// Generation of the latest-started Main pipeline.
    main_generation: u64,
    /// Generation whose loading span currently holds the Main slot.
    main_loading: Option<u64>,
    /// Whether an Answer pipeline is in flight (overlap is rejected, so a
    /// flag suffices).
    answer_loading: bool,
}

impl SessionState {
    /// True while any pipeline is in flight.
    pub fn is_loading(&self) -> bool {
        self.main_loading.is_some() || self.answer_loading
    }

    /// True while a pipeline targeting `slot` is in flight.
    pub fn slot_loading(&self, slot: Slot) -> bool {
        match slot {
            Slot::Main => self.main_loading.is_some(),
            Slot::Answer => self.answer_loading,
        }
    }

    /// The current Main artifact, if a pipeline has completed.
    pub fn artifact(&self) -> Option<&AudioArtifact> {
        self.artifact.as_ref()
    }

    /// The retained script text backing the current artifact.
    pub fn script(&self) -> Option<&str> {
        self.script.as_deref()
    }

    // ── Slot accounting (used only by the orchestrator) ─────────────────

    /// Start a Main run: bumps the generation and takes over the loading
    /// span.  Returns the new run's generation tag.
    pub(crate) fn begin_main(&mut self) -> u64 {
        self.main_generation += 1;
        self.main_loading = Some(self.main_generation);
        self.main_generation
    }

    /// End the loading span of Main run `generation`.  A superseded run
    /// settling late is a no-op — it must not clear a newer run's span.
    pub(crate) fn settle_main(&mut self, generation: u64) {
        if self.main_loading == Some(generation) {
            self.main_loading = None;
        }
    }

    /// Start an Answer run; `false` when one is already in flight.
    pub(crate) fn begin_answer(&mut self) -> bool {
        if self.answer_loading {
            return false;
        }
        self.answer_loading = true;
        true
    }

    /// End the Answer loading span.
    pub(crate) fn settle_answer(&mut self) {
        self.answer_loading = false;
    }

    /// Commit a Main run's result: only the latest generation may replace
    /// the artifact (the prior one is dropped, releasing its resources).
    /// Returns `false` when the run was superseded and its result must be
    /// discarded.
    pub(crate) fn commit_main(
        &mut self,
        generation: u64,
        artifact: AudioArtifact,
        script: String,
        source_url: String,
    ) -> bool {
        if generation != self.main_generation {
            return false;
        }
        self.artifact = Some(artifact);
        self.script = Some(script);
        self.source_url = source_url;
        true
    }
}

// ---------------------------------------------------------------------------
// SharedSession
// ---------------------------------------------------------------------------

/// Thread-safe handle to [`SessionState`].
pub type SharedSession = Arc<Mutex<SessionState>>;

/// Construct a new [`SharedSession`] with empty state.
pub fn new_shared_session() -> SharedSession {
    Arc::new(Mutex::new(SessionState::default()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
