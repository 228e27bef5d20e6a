//! Test providers shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use umida_bot::completion::CompletionPolicy;
use umida_bot::llm::{CompletionRequest, LlmError, LlmProvider, SafetyPolicy};

pub const COOLDOWN: Duration = Duration::from_secs(60);

pub fn policy() -> CompletionPolicy {
    CompletionPolicy {
        model_id: "gemini-1.5-flash".to_string(),
        system_instruction: "Siz Umidasiz".to_string(),
        safety: SafetyPolicy::default(),
        max_attempts: 3,
        cooldown: COOLDOWN,
        diagnostic_max_chars: 100,
        empty_reply_sentinel: "💀".to_string(),
        busy_message: "Kechirasiz, keyinroq gaplashaylik.".to_string(),
    }
}

pub fn rate_limited() -> LlmError {
    LlmError::RateLimit {
        wait_secs: None,
        message: "RESOURCE_EXHAUSTED".to_string(),
    }
}

/// Provider answering from a closure of `(request, call number starting at 1)`.
pub struct FnProvider<F> {
    respond: F,
    calls: AtomicUsize,
}

impl<F> FnProvider<F> {
    pub fn new(respond: F) -> Self
    where
        F: Fn(&CompletionRequest, usize) -> Result<String, LlmError> + Send + Sync,
    {
        Self {
            respond,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl<F> LlmProvider for FnProvider<F>
where
    F: Fn(&CompletionRequest, usize) -> Result<String, LlmError> + Send + Sync,
{
    async fn generate(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        (self.respond)(request, call)
    }
}

/// Provider that takes `latency` per call and records peak concurrency.
///
/// Requests whose text starts with `throttle` are rate limited.
pub struct SlowProvider {
    latency: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl SlowProvider {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl LlmProvider for SlowProvider {
    async fn generate(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if request.user_text.starts_with("throttle") {
            Err(rate_limited())
        } else {
            Ok(format!("re: {}", request.user_text))
        }
    }
}
