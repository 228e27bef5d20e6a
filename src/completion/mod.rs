//! Rate-limited completion core
//!
//! [`RateLimitedCompletionClient`] turns one piece of allow-listed user text
//! into one reply. Throttled attempts are retried after a fixed cooldown up
//! to a bounded number of attempts; every other failure ends the operation
//! at once with a short diagnostic.

mod outcome;

pub use outcome::{classify, AttemptOutcome, CompletionFailure};

use crate::llm::{CompletionRequest, LlmError, LlmProvider, SafetyPolicy};
use crate::utils::truncate_str;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Immutable per-process completion settings
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionPolicy {
    /// Provider model identifier
    pub model_id: String,
    /// System instruction attached to every call
    pub system_instruction: String,
    /// Safety overrides attached to every call
    pub safety: SafetyPolicy,
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Wait after a throttled attempt
    pub cooldown: Duration,
    /// Longest diagnostic shown to the user
    pub diagnostic_max_chars: usize,
    /// Reply used when the provider returns no text
    pub empty_reply_sentinel: String,
    /// Reply used when retries are exhausted or shutdown interrupts a wait
    pub busy_message: String,
}

impl CompletionPolicy {
    /// Builds the provider request for one user message
    #[must_use]
    pub fn request_for(&self, text: &str) -> CompletionRequest {
        CompletionRequest {
            model_id: self.model_id.clone(),
            system_instruction: self.system_instruction.clone(),
            safety: self.safety.clone(),
            user_text: text.to_string(),
        }
    }
}

/// Single-turn completion client with allow-list and cooldown retry.
///
/// Each call to [`complete`](Self::complete) is independent: a cooldown only
/// suspends the task that hit the rate limit. An optional global gate bounds
/// the number of provider calls in flight across all callers; its permit is
/// held for one attempt and released before any cooldown.
pub struct RateLimitedCompletionClient {
    provider: Arc<dyn LlmProvider>,
    allow_list: HashSet<i64>,
    policy: CompletionPolicy,
    gate: Option<Arc<Semaphore>>,
    shutdown: CancellationToken,
}

impl RateLimitedCompletionClient {
    /// Create a client without a global gate
    #[must_use]
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        allow_list: HashSet<i64>,
        policy: CompletionPolicy,
    ) -> Self {
        Self {
            provider,
            allow_list,
            policy,
            gate: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Limit concurrent provider calls process-wide. `0` disables the gate.
    #[must_use]
    pub fn with_global_gate(mut self, permits: usize) -> Self {
        self.gate = (permits > 0).then(|| Arc::new(Semaphore::new(permits)));
        self
    }

    /// Use an externally owned shutdown token
    #[must_use]
    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Token that aborts pending cooldowns when cancelled
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Returns `true` if the caller may use the provider
    #[must_use]
    pub fn is_allowed(&self, caller_id: i64) -> bool {
        self.allow_list.contains(&caller_id)
    }

    /// Active policy
    #[must_use]
    pub fn policy(&self) -> &CompletionPolicy {
        &self.policy
    }

    /// Runs one completion for `caller_id`.
    ///
    /// # Errors
    ///
    /// - [`CompletionFailure::Unauthorized`] when the caller is not allow-listed
    ///   (no provider call is made)
    /// - [`CompletionFailure::RetriesExhausted`] when every attempt was throttled
    /// - [`CompletionFailure::Provider`] for any other provider failure,
    ///   carrying a truncated diagnostic
    /// - [`CompletionFailure::Cancelled`] when shutdown interrupts a cooldown
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    pub async fn complete(&self, caller_id: i64, text: &str) -> Result<String, CompletionFailure> {
        if !self.is_allowed(caller_id) {
            return Err(CompletionFailure::Unauthorized);
        }

        let request = self.policy.request_for(text);
        let max_attempts = self.policy.max_attempts;

        for attempt in 1..=max_attempts {
            let start = Instant::now();
            let result = self.attempt(&request).await;
            let duration_ms = start.elapsed().as_millis();

            match classify(result) {
                AttemptOutcome::Success(reply) => {
                    let empty = reply.trim().is_empty();
                    info!(
                        caller_id,
                        attempt,
                        max_attempts,
                        duration_ms,
                        empty,
                        outcome = "success",
                        "Completion attempt finished"
                    );
                    if empty {
                        return Ok(self.policy.empty_reply_sentinel.clone());
                    }
                    return Ok(reply);
                }
                AttemptOutcome::RateLimited { wait_secs } => {
                    warn!(
                        caller_id,
                        attempt,
                        max_attempts,
                        duration_ms,
                        server_wait_secs = ?wait_secs,
                        outcome = "rate_limited",
                        "Completion attempt finished"
                    );
                    if attempt == max_attempts {
                        break;
                    }
                    self.cool_down(caller_id, attempt).await?;
                }
                AttemptOutcome::OtherFailure(detail) => {
                    // HTTP error bodies arrive capped at 500 chars; http_utils logs them whole
                    error!(
                        caller_id,
                        attempt,
                        max_attempts,
                        duration_ms,
                        error = %detail,
                        outcome = "failed",
                        "Completion attempt finished"
                    );
                    return Err(CompletionFailure::Provider {
                        detail: truncate_str(&detail, self.policy.diagnostic_max_chars),
                    });
                }
            }
        }

        error!(caller_id, max_attempts, "Completion retries exhausted");
        Err(CompletionFailure::RetriesExhausted {
            attempts: max_attempts,
        })
    }

    /// Transport entry point: the reply to send, or `None` to stay silent.
    pub async fn handle(&self, caller_id: i64, text: &str) -> Option<String> {
        match self.complete(caller_id, text).await {
            Ok(reply) => Some(reply),
            Err(CompletionFailure::Unauthorized) => None,
            Err(CompletionFailure::Provider { detail }) => Some(detail),
            Err(CompletionFailure::RetriesExhausted { .. } | CompletionFailure::Cancelled) => {
                Some(self.policy.busy_message.clone())
            }
        }
    }

    async fn attempt(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let _permit = match &self.gate {
            Some(gate) => Some(
                gate.acquire()
                    .await
                    .map_err(|e| LlmError::Unknown(format!("global gate closed: {e}")))?,
            ),
            None => None,
        };
        self.provider.generate(request).await
    }

    async fn cool_down(&self, caller_id: i64, attempt: u32) -> Result<(), CompletionFailure> {
        let cooldown = self.policy.cooldown;
        info!(
            caller_id,
            attempt,
            cooldown_secs = cooldown.as_secs(),
            "Cooling down before retry"
        );

        tokio::select! {
            () = self.shutdown.cancelled() => {
                warn!(caller_id, attempt, "Cooldown interrupted by shutdown");
                Err(CompletionFailure::Cancelled)
            }
            () = tokio::time::sleep(cooldown) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmProvider;
    use tracing_test::traced_test;

    const ALLOWED: i64 = 42;

    fn policy() -> CompletionPolicy {
        CompletionPolicy {
            model_id: "gemini-1.5-flash".to_string(),
            system_instruction: "Be warm".to_string(),
            safety: SafetyPolicy::default(),
            max_attempts: 3,
            cooldown: Duration::from_secs(60),
            diagnostic_max_chars: 100,
            empty_reply_sentinel: "💀".to_string(),
            busy_message: "busy".to_string(),
        }
    }

    fn client(mock: MockLlmProvider) -> RateLimitedCompletionClient {
        RateLimitedCompletionClient::new(Arc::new(mock), HashSet::from([ALLOWED]), policy())
    }

    #[tokio::test]
    async fn test_unauthorized_caller_never_reaches_provider() {
        let mut mock = MockLlmProvider::new();
        mock.expect_generate().never();
        let client = client(mock);

        assert_eq!(
            client.complete(7, "hello").await,
            Err(CompletionFailure::Unauthorized)
        );
        assert_eq!(client.handle(7, "hello").await, None);
    }

    #[tokio::test]
    async fn test_success_reply_is_unchanged() {
        let mut mock = MockLlmProvider::new();
        mock.expect_generate()
            .withf(|req| {
                req.user_text == "Qalaysiz?"
                    && req.system_instruction == "Be warm"
                    && req.model_id == "gemini-1.5-flash"
                    && req.safety == SafetyPolicy::default()
            })
            .times(1)
            .returning(|_| Ok("  Yaxshi, rahmat!\n".to_string()));
        let client = client(mock);

        assert_eq!(
            client.handle(ALLOWED, "Qalaysiz?").await.as_deref(),
            Some("  Yaxshi, rahmat!\n")
        );
    }

    #[tokio::test]
    async fn test_empty_reply_becomes_sentinel() {
        let mut mock = MockLlmProvider::new();
        mock.expect_generate()
            .times(2)
            .returning(|_| Ok(" \n".to_string()));
        let client = client(mock);

        assert_eq!(client.complete(ALLOWED, "hi").await, Ok("💀".to_string()));
        assert_eq!(client.handle(ALLOWED, "hi").await.as_deref(), Some("💀"));
    }

    #[tokio::test]
    async fn test_other_failure_is_not_retried_and_truncated() {
        let long_body = "x".repeat(400);
        let mut mock = MockLlmProvider::new();
        mock.expect_generate()
            .times(1)
            .returning(move |_| Err(LlmError::ApiError(format!("403 Forbidden - {long_body}"))));
        let client = client(mock);

        let Err(CompletionFailure::Provider { detail }) = client.complete(ALLOWED, "hi").await
        else {
            panic!("expected provider failure");
        };
        assert_eq!(detail.chars().count(), 100);
        assert!(detail.starts_with("API error: 403 Forbidden"));
    }

    #[tokio::test]
    async fn test_handle_shows_short_diagnostic_verbatim() {
        let mut mock = MockLlmProvider::new();
        mock.expect_generate()
            .times(1)
            .returning(|_| Err(LlmError::NetworkError("dns failure".to_string())));
        let client = client(mock);

        assert_eq!(
            client.handle(ALLOWED, "hi").await.as_deref(),
            Some("Network error: dns failure")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_use_busy_message() {
        let mut mock = MockLlmProvider::new();
        mock.expect_generate().times(3).returning(|_| {
            Err(LlmError::RateLimit {
                wait_secs: None,
                message: "quota".to_string(),
            })
        });
        let client = client(mock);

        assert_eq!(client.handle(ALLOWED, "hi").await.as_deref(), Some("busy"));
    }

    #[tokio::test]
    async fn test_single_attempt_policy_does_not_cool_down() {
        let mut mock = MockLlmProvider::new();
        mock.expect_generate().times(1).returning(|_| {
            Err(LlmError::RateLimit {
                wait_secs: None,
                message: "quota".to_string(),
            })
        });
        let mut single = policy();
        single.max_attempts = 1;
        let client =
            RateLimitedCompletionClient::new(Arc::new(mock), HashSet::from([ALLOWED]), single);

        let start = Instant::now();
        assert_eq!(
            client.complete(ALLOWED, "hi").await,
            Err(CompletionFailure::RetriesExhausted { attempts: 1 })
        );
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_other_failure_logs_full_detail_once() {
        let long_body = format!("{}END-OF-DETAIL", "y".repeat(300));
        let expected = format!("API error: 400 Bad Request - {long_body}");
        let mut mock = MockLlmProvider::new();
        mock.expect_generate()
            .times(1)
            .returning(move |_| Err(LlmError::ApiError(format!("400 Bad Request - {long_body}"))));
        let client = client(mock);

        let result = client.complete(ALLOWED, "hi").await;

        assert!(matches!(
            result,
            Err(CompletionFailure::Provider { ref detail }) if detail.chars().count() == 100
        ));
        assert!(logs_contain(&expected));
        logs_assert(|lines: &[&str]| {
            let failures: Vec<&&str> = lines
                .iter()
                .filter(|line| line.contains("Completion attempt finished"))
                .collect();
            match failures.as_slice() {
                [line] if line.contains("ERROR") && line.contains("failed") => Ok(()),
                other => Err(format!("expected one error event, got {other:?}")),
            }
        });
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_every_attempt_is_logged() {
        let mut mock = MockLlmProvider::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_generate()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| {
                Err(LlmError::RateLimit {
                    wait_secs: Some(30),
                    message: "quota".to_string(),
                })
            });
        mock.expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("Salom".to_string()));
        let client = client(mock);

        assert_eq!(client.complete(ALLOWED, "hi").await, Ok("Salom".to_string()));

        logs_assert(|lines: &[&str]| {
            let attempts: Vec<&&str> = lines
                .iter()
                .filter(|line| line.contains("Completion attempt finished"))
                .collect();
            if attempts.len() != 3 {
                return Err(format!("expected 3 attempt events, got {}", attempts.len()));
            }
            for (index, line) in attempts.iter().enumerate() {
                let attempt = format!("attempt={}", index + 1);
                if !line.contains(&attempt) || !line.contains("max_attempts=3") {
                    return Err(format!("missing {attempt} in {line}"));
                }
                if !line.contains(&format!("caller_id={ALLOWED}")) {
                    return Err(format!("missing caller id in {line}"));
                }
            }
            let throttled = attempts
                .iter()
                .filter(|line| line.contains("WARN") && line.contains("rate_limited"))
                .count();
            let succeeded = attempts
                .iter()
                .filter(|line| line.contains("INFO") && line.contains("success"))
                .count();
            if (throttled, succeeded) == (2, 1) {
                Ok(())
            } else {
                Err(format!("outcomes: {throttled} throttled, {succeeded} succeeded"))
            }
        });
    }

    #[test]
    fn test_global_gate_zero_is_disabled() {
        let client = client(MockLlmProvider::new()).with_global_gate(0);
        assert!(client.gate.is_none());
        let client = client.with_global_gate(2);
        assert_eq!(client.gate.as_ref().map(|g| g.available_permits()), Some(2));
    }
}
