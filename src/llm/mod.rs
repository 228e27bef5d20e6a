//! LLM provider seam
//!
//! Defines the request sent to a generative-text provider, the errors a
//! provider can return, and the [`LlmProvider`] trait implemented by
//! [`gemini::GeminiProvider`].

/// Google Gemini provider
pub mod gemini;
pub(crate) mod http_utils;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during LLM operations
#[derive(Debug, Error)]
pub enum LlmError {
    /// Error returned by the provider's API
    #[error("API error: {0}")]
    ApiError(String),
    /// Error during network communication
    #[error("Network error: {0}")]
    NetworkError(String),
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    JsonError(String),
    /// Missing provider configuration or API key
    #[error("Missing client/API key: {0}")]
    MissingConfig(String),
    /// Rate limit exceeded (429), optionally with a wait time
    #[error("Rate limit exceeded: {message} (wait: {wait_secs:?}s)")]
    RateLimit {
        /// Retry-After duration in seconds, if provided by the server
        wait_secs: Option<u64>,
        /// Error message from the server
        message: String,
    },
    /// Any other unexpected error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Content categories the provider can filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HarmCategory {
    /// `HARM_CATEGORY_HARASSMENT`
    #[serde(rename = "HARM_CATEGORY_HARASSMENT")]
    Harassment,
    /// `HARM_CATEGORY_HATE_SPEECH`
    #[serde(rename = "HARM_CATEGORY_HATE_SPEECH")]
    HateSpeech,
    /// `HARM_CATEGORY_SEXUALLY_EXPLICIT`
    #[serde(rename = "HARM_CATEGORY_SEXUALLY_EXPLICIT")]
    SexuallyExplicit,
    /// `HARM_CATEGORY_DANGEROUS_CONTENT`
    #[serde(rename = "HARM_CATEGORY_DANGEROUS_CONTENT")]
    DangerousContent,
}

/// Blocking threshold for a [`HarmCategory`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmThreshold {
    /// Never block (filter disabled)
    BlockNone,
    /// Block only high-probability content
    BlockOnlyHigh,
    /// Block medium and high
    BlockMediumAndAbove,
    /// Block low, medium and high
    BlockLowAndAbove,
}

/// One category override
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetySetting {
    /// Filtered category
    pub category: HarmCategory,
    /// Threshold applied to it
    pub threshold: HarmThreshold,
}

/// Category overrides attached to every request.
///
/// Categories not listed keep the provider defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyPolicy {
    /// Overrides in the order they are sent
    pub settings: Vec<SafetySetting>,
}

impl Default for SafetyPolicy {
    /// Harassment and hate speech filters disabled, everything else untouched
    fn default() -> Self {
        Self {
            settings: vec![
                SafetySetting {
                    category: HarmCategory::Harassment,
                    threshold: HarmThreshold::BlockNone,
                },
                SafetySetting {
                    category: HarmCategory::HateSpeech,
                    threshold: HarmThreshold::BlockNone,
                },
            ],
        }
    }
}

/// A single-turn completion request
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Provider model identifier
    pub model_id: String,
    /// System instruction
    pub system_instruction: String,
    /// Safety overrides
    pub safety: SafetyPolicy,
    /// User turn, passed through verbatim
    pub user_text: String,
}

/// Interface for generative-text providers
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Run one completion.
    ///
    /// Returns the model text, which may be empty when the model produced
    /// nothing usable.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::RateLimit`] when the provider throttles the call,
    /// or another [`LlmError`] for every other failure.
    async fn generate(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safety_policy_serializes_to_provider_names() -> Result<(), serde_json::Error> {
        let json = serde_json::to_value(SafetyPolicy::default().settings)?;
        assert_eq!(
            json,
            serde_json::json!([
                {"category": "HARM_CATEGORY_HARASSMENT", "threshold": "BLOCK_NONE"},
                {"category": "HARM_CATEGORY_HATE_SPEECH", "threshold": "BLOCK_NONE"}
            ])
        );
        Ok(())
    }

    #[test]
    fn test_rate_limit_display() {
        let err = LlmError::RateLimit {
            wait_secs: Some(7),
            message: "quota".to_string(),
        };
        assert_eq!(err.to_string(), "Rate limit exceeded: quota (wait: Some(7)s)");
    }
}
