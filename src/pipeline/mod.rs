//! Pipeline — shared session state and the network-sequence orchestrator.
//!
//! # Architecture
//!
//! ```text
//! Session façade
//!      │
//!      ▼
//! PipelineOrchestrator ──▶ ScriptService ──▶ SpeechSynthesizer ──▶ AudioArtifact
//!      │                       (Main slot, generation-counted)
//!      │
//!      └────────────────▶ AnswerService ──▶ SpeechSynthesizer ──▶ AudioArtifact
//!                              (Answer slot, transient)
//!
//! SessionState (Arc<Mutex<…>>) ◀── loading spans, artifact, script, flags
//! ```

pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use runner::{MainOutcome, PipelineError, PipelineOrchestrator, Stage};
pub use state::{new_shared_session, SessionState, SharedSession, Slot};
