//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! the constants used by the Telegram transport.

use crate::completion::CompletionPolicy;
use crate::llm::SafetyPolicy;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub telegram_token: String,

    /// Comma-separated list of Telegram user IDs allowed to talk to the bot
    #[serde(rename = "allowed_users")]
    pub allowed_users_str: Option<String>,

    /// Gemini API key
    pub gemini_api_key: Option<String>,
    /// Legacy name of the Gemini API key
    pub google_api_key: Option<String>,

    /// Gemini model identifier
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    /// Sampling temperature sent with every request
    #[serde(default = "default_gemini_temperature")]
    pub gemini_temperature: f32,

    /// System instruction attached to every request
    pub system_message: Option<String>,

    /// Total provider attempts per message, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Wait after a rate-limited attempt before retrying
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Maximum length of the diagnostic shown to the user on provider errors
    #[serde(default = "default_diagnostic_max_chars")]
    pub diagnostic_max_chars: usize,
    /// Reply used when the provider returns no text
    #[serde(default = "default_empty_reply_sentinel")]
    pub empty_reply_sentinel: String,
    /// Reply used when retries are exhausted
    #[serde(default = "default_busy_message")]
    pub busy_message: String,

    /// Process-wide limit on concurrent provider calls, 0 disables the gate
    #[serde(default)]
    pub global_concurrency: usize,

    /// HTTP timeout for provider requests
    #[serde(default = "default_llm_http_timeout_secs")]
    pub llm_http_timeout_secs: u64,

    /// Minimum interval between two log lines about the same unauthorized user
    #[serde(default = "default_unauthorized_log_cooldown_secs")]
    pub unauthorized_log_cooldown_secs: u64,
}

fn default_gemini_model() -> String {
    DEFAULT_GEMINI_MODEL.to_string()
}

const fn default_gemini_temperature() -> f32 {
    DEFAULT_GEMINI_TEMPERATURE
}

const fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

const fn default_cooldown_secs() -> u64 {
    DEFAULT_COOLDOWN_SECS
}

const fn default_diagnostic_max_chars() -> usize {
    DEFAULT_DIAGNOSTIC_MAX_CHARS
}

fn default_empty_reply_sentinel() -> String {
    DEFAULT_EMPTY_REPLY_SENTINEL.to_string()
}

fn default_busy_message() -> String {
    DEFAULT_BUSY_MESSAGE.to_string()
}

const fn default_llm_http_timeout_secs() -> u64 {
    DEFAULT_LLM_HTTP_TIMEOUT_SECS
}

const fn default_unauthorized_log_cooldown_secs() -> u64 {
    UNAUTHORIZED_LOG_COOLDOWN_SECS
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use umida_bot::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Local overrides, not checked into git
            .add_source(File::with_name("config/local").required(false))
            // Eg.. `APP__COOLDOWN_SECS=5 ./target/umida-bot`
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Plain env vars; UPPER_SNAKE_CASE maps to snake_case, empty means unset
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        s.try_deserialize()
    }

    /// Returns the set of Telegram IDs that are allowed to use the bot
    #[must_use]
    pub fn allowed_users(&self) -> HashSet<i64> {
        self.allowed_users_str
            .as_ref()
            .map(|s| {
                s.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
                    .filter(|token| !token.is_empty())
                    .filter_map(|id| id.parse::<i64>().ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Gemini API key, falling back to the legacy `GOOGLE_API_KEY` name
    #[must_use]
    pub fn gemini_key(&self) -> Option<&str> {
        self.gemini_api_key
            .as_deref()
            .or(self.google_api_key.as_deref())
            .filter(|key| !key.is_empty())
    }

    /// Builds the immutable policy handed to the completion client
    #[must_use]
    pub fn completion_policy(&self) -> CompletionPolicy {
        CompletionPolicy {
            model_id: self.gemini_model.clone(),
            system_instruction: self
                .system_message
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_MESSAGE.to_string()),
            safety: SafetyPolicy::default(),
            max_attempts: self.max_attempts.max(1),
            cooldown: Duration::from_secs(self.cooldown_secs),
            diagnostic_max_chars: self.diagnostic_max_chars,
            empty_reply_sentinel: self.empty_reply_sentinel.clone(),
            busy_message: self.busy_message.clone(),
        }
    }
}

/// Default Gemini model
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
/// Default sampling temperature
pub const DEFAULT_GEMINI_TEMPERATURE: f32 = 0.5;
/// Base URL of the Gemini REST API
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default number of attempts per message
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default cooldown after a rate-limited attempt
pub const DEFAULT_COOLDOWN_SECS: u64 = 60;
/// Default maximum length of user-visible diagnostics
pub const DEFAULT_DIAGNOSTIC_MAX_CHARS: usize = 100;
/// Reply sent when the model produced no text
pub const DEFAULT_EMPTY_REPLY_SENTINEL: &str = "💀";
/// Reply sent when the provider kept throttling us
pub const DEFAULT_BUSY_MESSAGE: &str =
    "Kechirasiz, menda juda zarur ish chiqib qoldi. Iltimos, keyinroq gaplashaylik.";
/// System instruction used when `SYSTEM_MESSAGE` is not set
pub const DEFAULT_SYSTEM_MESSAGE: &str = "Sizning ismingiz Umida. Siz samimiy psixologsiz. \
Juda rasmiy bo'lmang, lekin hurmatni saqlang. Faqat O'ZBEK tilida javob bering.";

/// Default HTTP timeout for provider requests
pub const DEFAULT_LLM_HTTP_TIMEOUT_SECS: u64 = 30;

/// Log cooldown for repeated unauthorized attempts (20 minutes)
pub const UNAUTHORIZED_LOG_COOLDOWN_SECS: u64 = 1200;
/// Max entries in the unauthorized attempts cache
pub const UNAUTHORIZED_CACHE_MAX_SIZE: u64 = 10_000;

/// Reactions the bot puts on incoming messages
pub const REACTIONS: &[&str] = &["🫂", "🤍", "🕊️"];

// Telegram API retry configuration
/// Initial backoff for Telegram API retries
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Maximum backoff for Telegram API retries
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4000;
/// Maximum number of Telegram API retries
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;
