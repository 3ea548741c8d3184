//! Remote-service seams — the three network collaborators.
//!
//! Each collaborator is an object-safe async trait held behind an
//! `Arc<dyn …>` so the pipeline orchestrator can be unit-tested against
//! mocks:
//!
//! * [`ScriptService`] — turns a media URL into a podcast script.
//! * [`SpeechSynthesizer`] — turns text into encoded audio.
//! * [`AnswerService`] — answers a listener question about the podcast.
//!
//! The `Http*` implementations all follow the same shape: a
//! `reqwest::Client` built from [`ServiceConfig`] with a per-request
//! timeout, a POST with a JSON body carrying the session id, and a bearer
//! token attached only when an API key is configured.

pub mod answer;
pub mod script;
pub mod synthesis;

use thiserror::Error;

// ---------------------------------------------------------------------------
// ServiceError
// ---------------------------------------------------------------------------

/// Errors from any of the three remote services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// HTTP transport or connection error.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("service request timed out")]
    Timeout,

    /// The service answered with a non-success status code.
    #[error("service returned HTTP {0}")]
    Status(u16),

    /// The response body could not be parsed as expected JSON.
    #[error("failed to parse service response: {0}")]
    Parse(String),

    /// The response parsed but carried no usable value for the named field.
    #[error("service response is missing a usable `{0}` field")]
    MissingField(&'static str),

    /// The synthesis service returned something other than audio.
    #[error("synthesis returned a non-audio payload ({0})")]
    NotAudio(String),
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ServiceError::Timeout
        } else {
            ServiceError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use answer::{AnswerService, HttpAnswerService};
pub use script::{HttpScriptService, ScriptService};
pub use synthesis::{HttpSpeechSynthesizer, SpeechSynthesizer, SynthesizedAudio};
