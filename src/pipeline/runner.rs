//! Pipeline orchestrator — drives the URL → script → audio sequences.
//!
//! [`PipelineOrchestrator`] owns the [`SharedSession`] and the three remote
//! service seams.  Two entry points cover the two slots:
//!
//! ```text
//! run_main_pipeline(url)
//!   ├─ validate url, reject while an answer is resolving
//!   ├─ begin Main loading span (generation N)
//!   ├─ ScriptService::fetch_script      ── fail ▶ Upstream{Script}
//!   ├─ SpeechSynthesizer::synthesize    ── fail ▶ Upstream{Synthesis}
//!   └─ settle span + commit — only if generation N is still the latest;
//!      a superseded run's result is discarded silently
//!
//! run_answer_pipeline(question)
//!   ├─ no-op unless a question and a Main artifact exist
//!   ├─ AnswerService::answer            ── fail ▶ Upstream{Answer}
//!   └─ SpeechSynthesizer::synthesize    ── fail ▶ Upstream{Synthesis}
//!      (the artifact goes to the playback controller, never into state)
//! ```
//!
//! Steps within a run are strictly sequential, there are no retries, and
//! every exit path ends the run's loading span.

use std::sync::Arc;

use thiserror::Error;

use crate::playback::{AudioArtifact, ControllerError};
use crate::services::{AnswerService, ScriptService, ServiceError, SpeechSynthesizer};

use super::state::{SharedSession, Slot};

// ---------------------------------------------------------------------------
// Stage / PipelineError
// ---------------------------------------------------------------------------

/// The upstream call a pipeline failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Script,
    Synthesis,
    Answer,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Script => write!(f, "script"),
            Stage::Synthesis => write!(f, "synthesis"),
            Stage::Answer => write!(f, "answer"),
        }
    }
}

/// Errors surfaced by pipeline runs.
///
/// Staleness is deliberately absent: a superseded Main run is not an error —
/// its result is discarded silently and reported as
/// [`MainOutcome::Superseded`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Rejected before any network call.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    /// A single upstream attempt failed; `stage` names the call for
    /// per-stage diagnosis.
    #[error("{stage} stage failed: {source}")]
    Upstream {
        stage: Stage,
        #[source]
        source: ServiceError,
    },

    /// The run was rejected because the named slot is already resolving.
    #[error("a {0} pipeline is already in flight")]
    Busy(Slot),

    /// The pipeline produced an artifact the playback controller refused.
    #[error("playback failed: {0}")]
    Playback(#[from] ControllerError),
}

impl PipelineError {
    fn upstream(stage: Stage) -> impl FnOnce(ServiceError) -> Self {
        move |source| PipelineError::Upstream { stage, source }
    }
}

// ---------------------------------------------------------------------------
// MainOutcome
// ---------------------------------------------------------------------------

/// Result of a successful Main run.
#[derive(Debug)]
pub enum MainOutcome {
    /// The run was the latest when it finished; the artifact was committed.
    Completed(AudioArtifact),
    /// A newer run started before this one finished; the result was
    /// discarded and state is untouched.
    Superseded,
}

// ---------------------------------------------------------------------------
// PipelineOrchestrator
// ---------------------------------------------------------------------------

/// Sequences the network calls that turn a URL into a playable artifact,
/// and a question into a playable answer clip.
pub struct PipelineOrchestrator {
    session_id: String,
    state: SharedSession,
    scripts: Arc<dyn ScriptService>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    answers: Arc<dyn AnswerService>,
}

impl PipelineOrchestrator {
    /// Create an orchestrator.  `session_id` is threaded through every
    /// service request.
    pub fn new(
        session_id: impl Into<String>,
        state: SharedSession,
        scripts: Arc<dyn ScriptService>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        answers: Arc<dyn AnswerService>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            state,
            scripts,
            synthesizer,
            answers,
        }
    }

    /// Shared state handle (also read by the session front-end).
    pub fn state(&self) -> &SharedSession {
        &self.state
    }

    // -----------------------------------------------------------------------
    // Main pipeline
    // -----------------------------------------------------------------------

    /// Turn `source_url` into a playable Main artifact.
    ///
    /// The last-started run wins: if a newer run begins before this one
    /// finishes, this run's result is discarded and `Superseded` is
    /// returned.  Failures leave the prior artifact (and script) untouched.
    pub async fn run_main_pipeline(
        &self,
        source_url: &str,
    ) -> Result<MainOutcome, PipelineError> {
        let source_url = source_url.trim();
        if source_url.is_empty() {
            return Err(PipelineError::InvalidInput("source URL is empty"));
        }

        let generation = {
            let mut state = self.state.lock().unwrap();
            // While an answer clip is resolving the main track must not be
            // swapped out from under its pending resume.
            if state.slot_loading(Slot::Answer) {
                return Err(PipelineError::Busy(Slot::Answer));
            }
            state.begin_main()
        };
        log::debug!("pipeline: main run {generation} started for {source_url}");

        let result = self.resolve_main(source_url).await;

        let mut state = self.state.lock().unwrap();
        state.settle_main(generation);
        match result {
            Ok((script, artifact)) => {
                if state.commit_main(
                    generation,
                    artifact.clone(),
                    script,
                    source_url.to_string(),
                ) {
                    log::info!("pipeline: main run {generation} produced artifact {}", artifact.id());
                    Ok(MainOutcome::Completed(artifact))
                } else {
                    // Superseded: silently discarded, never surfaced.
                    log::debug!("pipeline: main run {generation} superseded, result discarded");
                    Ok(MainOutcome::Superseded)
                }
            }
            Err(e) => {
                log::warn!("pipeline: main run {generation} failed: {e}");
                Err(e)
            }
        }
    }

    /// Steps 2–4 of the Main sequence (strictly sequential).
    async fn resolve_main(
        &self,
        source_url: &str,
    ) -> Result<(String, AudioArtifact), PipelineError> {
        let script = self
            .scripts
            .fetch_script(&self.session_id, source_url)
            .await
            .map_err(PipelineError::upstream(Stage::Script))?;

        let audio = self
            .synthesizer
            .synthesize(&self.session_id, &script)
            .await
            .map_err(PipelineError::upstream(Stage::Synthesis))?;

        Ok((
            script,
            AudioArtifact::new(audio.payload, audio.content_type),
        ))
    }

    // -----------------------------------------------------------------------
    // Answer pipeline
    // -----------------------------------------------------------------------

    /// Turn `question` into a transient answer clip.
    ///
    /// No-ops (returns `Ok(None)`) when the question is empty or no Main
    /// artifact exists to interrupt.  The returned artifact is handed
    /// straight to the playback controller — the Main artifact field is
    /// never touched.
    pub async fn run_answer_pipeline(
        &self,
        question: &str,
    ) -> Result<Option<AudioArtifact>, PipelineError> {
        let question = question.trim().to_string();

        let context = {
            let mut state = self.state.lock().unwrap();
            if question.is_empty() || state.artifact().is_none() {
                return Ok(None);
            }
            if !state.begin_answer() {
                return Err(PipelineError::Busy(Slot::Answer));
            }
            state.script().unwrap_or_default().to_string()
        };
        log::debug!("pipeline: answer run started for {question:?}");

        let result = self.resolve_answer(&question, &context).await;

        self.state.lock().unwrap().settle_answer();
        match result {
            Ok(artifact) => Ok(Some(artifact)),
            Err(e) => {
                log::warn!("pipeline: answer run failed: {e}");
                Err(e)
            }
        }
    }

    async fn resolve_answer(
        &self,
        question: &str,
        context: &str,
    ) -> Result<AudioArtifact, PipelineError> {
        let answer = self
            .answers
            .answer(&self.session_id, question, context)
            .await
            .map_err(PipelineError::upstream(Stage::Answer))?;

        let audio = self
            .synthesizer
            .synthesize(&self.session_id, &answer)
            .await
            .map_err(PipelineError::upstream(Stage::Synthesis))?;

        Ok(AudioArtifact::new(audio.payload, audio.content_type))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
