//! Speech synthesis — text in, encoded audio bytes out.
//!
//! The same call serves both pipelines: the Main script and an answer text
//! go through [`SpeechSynthesizer::synthesize`] identically.  The response
//! must carry an `audio/*` content type; anything else fails the call.

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::ServiceConfig;

use super::ServiceError;

// ---------------------------------------------------------------------------
// SynthesizedAudio
// ---------------------------------------------------------------------------

/// Raw result of a synthesis call: the encoded payload plus the content type
/// the service reported.  The pipeline wraps this into an
/// [`AudioArtifact`](crate::playback::AudioArtifact).
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    pub payload: Bytes,
    pub content_type: String,
}

// ---------------------------------------------------------------------------
// SpeechSynthesizer trait
// ---------------------------------------------------------------------------

/// Async interface to the text-to-speech service.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize spoken audio for `text`.
    async fn synthesize(&self, session_id: &str, text: &str)
        -> Result<SynthesizedAudio, ServiceError>;
}

// ---------------------------------------------------------------------------
// Content-type validation
// ---------------------------------------------------------------------------

/// Accept only `audio/*` payloads; returns the content type on success.
pub(crate) fn ensure_audio(content_type: Option<&str>) -> Result<String, ServiceError> {
    match content_type {
        Some(ct) if ct.trim_start().starts_with("audio/") => Ok(ct.to_string()),
        Some(ct) => Err(ServiceError::NotAudio(ct.to_string())),
        None => Err(ServiceError::NotAudio("no content type".to_string())),
    }
}

// ---------------------------------------------------------------------------
// HttpSpeechSynthesizer
// ---------------------------------------------------------------------------

/// reqwest-backed [`SpeechSynthesizer`].
pub struct HttpSpeechSynthesizer {
    client: reqwest::Client,
    config: ServiceConfig,
}

impl HttpSpeechSynthesizer {
    /// Build the synthesizer from configuration.
    pub fn from_config(config: &ServiceConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechSynthesizer {
    async fn synthesize(
        &self,
        session_id: &str,
        text: &str,
    ) -> Result<SynthesizedAudio, ServiceError> {
        let url = format!("{}{}", self.config.base_url, self.config.speech_path);
        let body = serde_json::json!({
            "session_id": session_id,
            "text": text,
        });

        let mut req = self.client.post(&url).json(&body);
        let key = self.config.api_key.as_deref().unwrap_or("");
        if !key.is_empty() {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;
        if !response.status().is_success() {
            return Err(ServiceError::Status(response.status().as_u16()));
        }

        let content_type = ensure_audio(
            response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
        )?;

        let payload = response.bytes().await?;
        if payload.is_empty() {
            return Err(ServiceError::NotAudio("empty payload".to_string()));
        }

        Ok(SynthesizedAudio {
            payload,
            content_type,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
