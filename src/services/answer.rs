//! Question answering — a listener question in, answer text out.

use async_trait::async_trait;

use crate::config::ServiceConfig;

use super::ServiceError;

// ---------------------------------------------------------------------------
// AnswerService trait
// ---------------------------------------------------------------------------

/// Async interface to the Q&A service.
///
/// `context` carries the current podcast script so answers can reference the
/// material being played; it may be empty.
#[async_trait]
pub trait AnswerService: Send + Sync {
    async fn answer(
        &self,
        session_id: &str,
        question: &str,
        context: &str,
    ) -> Result<String, ServiceError>;
}

// ---------------------------------------------------------------------------
// HttpAnswerService
// ---------------------------------------------------------------------------

/// reqwest-backed [`AnswerService`].
pub struct HttpAnswerService {
    client: reqwest::Client,
    config: ServiceConfig,
}

impl HttpAnswerService {
    /// Build the service from configuration.
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
impl AnswerService for HttpAnswerService {
    async fn answer(
        &self,
        session_id: &str,
        question: &str,
        context: &str,
    ) -> Result<String, ServiceError> {
        let url = format!("{}{}", self.config.base_url, self.config.answer_path);
        let body = serde_json::json!({
            "session_id": session_id,
            "question": question,
            "context": context,
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

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ServiceError::Parse(e.to_string()))?;

        json.get("answer")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .ok_or(ServiceError::MissingField("answer"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
