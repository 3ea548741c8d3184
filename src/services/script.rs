//! Script retrieval — media URL in, podcast script out.
//!
//! The script service has been observed returning its payload at two
//! different response shapes, `{"script": …}` and `{"data": {"script": …}}`;
//! [`extract_script`] checks both before the call is declared failed.

use async_trait::async_trait;

use crate::config::ServiceConfig;

use super::ServiceError;

// ---------------------------------------------------------------------------
// ScriptService trait
// ---------------------------------------------------------------------------

/// Async interface to the script-generation service.
///
/// Implementations must be `Send + Sync` so they can be shared as an
/// `Arc<dyn ScriptService>`.
#[async_trait]
pub trait ScriptService: Send + Sync {
    /// Generate a podcast script for the media at `source_url`.
    async fn fetch_script(&self, session_id: &str, source_url: &str)
        -> Result<String, ServiceError>;
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Pull the script text out of a response, accepting both known shapes.
/// Empty strings count as missing.
pub(crate) fn extract_script(value: &serde_json::Value) -> Option<String> {
    value
        .get("script")
        .and_then(|v| v.as_str())
        .or_else(|| value.pointer("/data/script").and_then(|v| v.as_str()))
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

// ---------------------------------------------------------------------------
// HttpScriptService
// ---------------------------------------------------------------------------

/// reqwest-backed [`ScriptService`].
pub struct HttpScriptService {
    client: reqwest::Client,
    config: ServiceConfig,
}

impl HttpScriptService {
    /// Build the service from configuration.
    ///
    /// The HTTP client carries the per-request timeout from
    /// `config.timeout_secs`; a default client is the last-resort fallback
    /// if the builder fails.
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
impl ScriptService for HttpScriptService {
    async fn fetch_script(
        &self,
        session_id: &str,
        source_url: &str,
    ) -> Result<String, ServiceError> {
        let url = format!("{}{}", self.config.base_url, self.config.script_path);
        let body = serde_json::json!({
            "session_id": session_id,
            "source_url": source_url,
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

        extract_script(&json).ok_or(ServiceError::MissingField("script"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn extracts_flat_shape() {
        let value = json!({ "script": "hello world" });
        assert_eq!(extract_script(&value).as_deref(), Some("hello world"));
    }

    #[test]
    fn extracts_nested_shape() {
        let value = json!({ "data": { "script": "nested" } });
        assert_eq!(extract_script(&value).as_deref(), Some("nested"));
    }

    #[test]
    fn flat_shape_wins_when_both_present() {
        let value = json!({ "script": "flat", "data": { "script": "nested" } });
        assert_eq!(extract_script(&value).as_deref(), Some("flat"));
    }

    #[test]
    fn empty_object_is_missing() {
        assert_eq!(extract_script(&json!({})), None);
    }

    #[test]
    fn empty_string_counts_as_missing() {
        assert_eq!(extract_script(&json!({ "script": "" })), None);
        assert_eq!(extract_script(&json!({ "data": { "script": "" } })), None);
    }

    #[test]
    fn non_string_values_are_missing() {
        assert_eq!(extract_script(&json!({ "script": 42 })), None);
        assert_eq!(extract_script(&json!({ "data": { "script": null } })), None);
    }

    #[test]
    fn from_config_builds_without_panic() {
        let _service = HttpScriptService::from_config(&ServiceConfig::default());
    }

    #[test]
    fn service_is_object_safe() {
        let service: Box<dyn ScriptService> =
            Box::new(HttpScriptService::from_config(&ServiceConfig::default()));
        drop(service);
    }
}
