use crate::llm::LlmError;
use thiserror::Error;

/// Result of one provider attempt, as seen by the retry loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The provider answered (possibly with empty text)
    Success(String),
    /// The provider throttled the call
    RateLimited {
        /// Server wait hint in seconds, logged only
        wait_secs: Option<u64>,
    },
    /// Any failure that retrying will not fix
    OtherFailure(String),
}

/// Classifies a raw provider result.
///
/// Throttling is recognised from [`LlmError::RateLimit`] and from API errors
/// whose status line is 429 or whose body reports `"RESOURCE_EXHAUSTED"`.
/// Digits elsewhere in an error body never count. Everything else is final.
#[must_use]
pub fn classify(result: Result<String, LlmError>) -> AttemptOutcome {
    match result {
        Ok(text) => AttemptOutcome::Success(text),
        Err(LlmError::RateLimit { wait_secs, .. }) => AttemptOutcome::RateLimited { wait_secs },
        Err(LlmError::ApiError(msg))
            if msg.starts_with("429 ") || msg.contains("\"RESOURCE_EXHAUSTED\"") =>
        {
            AttemptOutcome::RateLimited { wait_secs: None }
        }
        Err(e) => AttemptOutcome::OtherFailure(e.to_string()),
    }
}

/// Why a completion produced no model text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionFailure {
    /// Caller is not allow-listed; nothing was sent and nothing is replied
    #[error("caller is not allowed")]
    Unauthorized,
    /// Every attempt was rate limited
    #[error("provider still rate limited after {attempts} attempts")]
    RetriesExhausted {
        /// Attempts made before giving up
        attempts: u32,
    },
    /// Non-retryable provider failure
    #[error("{detail}")]
    Provider {
        /// Diagnostic truncated for display
        detail: String,
    },
    /// Shutdown interrupted a cooldown
    #[error("completion cancelled during shutdown")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_success_keeps_text() {
        assert_eq!(
            classify(Ok("javob".to_string())),
            AttemptOutcome::Success("javob".to_string())
        );
        assert_eq!(
            classify(Ok(String::new())),
            AttemptOutcome::Success(String::new())
        );
    }

    #[test]
    fn test_classify_rate_limit_variants() {
        let explicit = LlmError::RateLimit {
            wait_secs: Some(30),
            message: "slow down".to_string(),
        };
        assert_eq!(
            classify(Err(explicit)),
            AttemptOutcome::RateLimited {
                wait_secs: Some(30)
            }
        );

        let status = LlmError::ApiError("429 Too Many Requests - quota".to_string());
        assert_eq!(
            classify(Err(status)),
            AttemptOutcome::RateLimited { wait_secs: None }
        );

        let grpc = LlmError::ApiError("{\"status\": \"RESOURCE_EXHAUSTED\"}".to_string());
        assert_eq!(
            classify(Err(grpc)),
            AttemptOutcome::RateLimited { wait_secs: None }
        );
    }

    #[test]
    fn test_classify_other_failures() {
        let cases = [
            LlmError::ApiError("403 Forbidden - API key not valid".to_string()),
            LlmError::NetworkError("connection reset".to_string()),
            LlmError::JsonError("expected value".to_string()),
            LlmError::MissingConfig("gemini".to_string()),
            LlmError::ApiError(
                "400 Bad Request - {\"message\": \"input has 14290 tokens\", \"status\": \"INVALID_ARGUMENT\"}"
                    .to_string(),
            ),
            LlmError::ApiError("403 Forbidden - quota project 4291".to_string()),
        ];
        for err in cases {
            let expected = err.to_string();
            assert_eq!(classify(Err(err)), AttemptOutcome::OtherFailure(expected));
        }
    }
}
