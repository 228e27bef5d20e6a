use crate::config::GEMINI_API_BASE;
use crate::llm::http_utils::{create_http_client, send_json_request};
use crate::llm::{CompletionRequest, LlmError, LlmProvider};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// LLM provider implementation for Google Gemini
pub struct GeminiProvider {
    http_client: HttpClient,
    api_key: String,
    api_base: String,
    temperature: f32,
}

impl GeminiProvider {
    /// Create a new Gemini provider instance
    #[must_use]
    pub fn new(api_key: String, temperature: f32, timeout: Duration) -> Self {
        Self {
            http_client: create_http_client(timeout),
            api_key,
            api_base: GEMINI_API_BASE.to_string(),
            temperature,
        }
    }

    /// Point the provider at a different API base (proxies, test servers)
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn endpoint(&self, model_id: &str) -> String {
        format!(
            "{}/models/{model_id}:generateContent",
            self.api_base.trim_end_matches('/')
        )
    }
}

/// Builds the `generateContent` body for one single-turn request.
pub(crate) fn build_request_body(request: &CompletionRequest, temperature: f32) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [{"text": request.user_text}]
        }],
        "system_instruction": {
            "parts": [{"text": request.system_instruction}]
        },
        "generationConfig": {
            "temperature": temperature
        },
        "safetySettings": request.safety.settings
    })
}

/// Joins the text parts of the first candidate.
///
/// A response without candidate text (blocked prompt, empty parts) is not an
/// error: it yields an empty string.
pub(crate) fn extract_reply(response: &Value) -> String {
    if let Some(reason) = response
        .pointer("/promptFeedback/blockReason")
        .and_then(Value::as_str)
    {
        warn!(block_reason = reason, "Gemini blocked the prompt");
    }

    let Some(parts) = response
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
    else {
        let finish_reason = response
            .pointer("/candidates/0/finishReason")
            .and_then(Value::as_str)
            .unwrap_or("none");
        debug!(finish_reason, "Gemini returned no content parts");
        return String::new();
    };

    parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect()
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn generate(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let url = self.endpoint(&request.model_id);
        let body = build_request_body(request, self.temperature);

        let res_json = send_json_request(
            &self.http_client,
            &url,
            &body,
            &[("x-goog-api-key", self.api_key.as_str())],
        )
        .await?;

        Ok(extract_reply(&res_json))
    }
}
