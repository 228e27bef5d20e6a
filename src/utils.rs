//! Utility functions for message splitting, truncation and Telegram retries.

use anyhow::Result;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::warn;
use unicode_segmentation::UnicodeSegmentation;

/// Splits a message into parts of at most `max_length` bytes.
///
/// Parts break after a newline where possible; a line longer than
/// `max_length` is cut on grapheme boundaries. Nothing is added or removed,
/// so concatenating the parts gives back `message`.
///
/// # Examples
///
/// ```
/// use umida_bot::utils::split_long_message;
/// let long_msg = "A very long message...\n".repeat(300);
/// let parts = split_long_message(&long_msg, 4096);
/// assert!(parts.len() > 1);
/// assert_eq!(parts.concat(), long_msg);
/// ```
#[must_use]
pub fn split_long_message(message: &str, max_length: usize) -> Vec<String> {
    if message.is_empty() {
        return Vec::new();
    }

    if message.len() <= max_length {
        return vec![message.to_string()];
    }

    let mut parts = Vec::new();
    let mut current = String::new();

    for line in message.split_inclusive('\n') {
        if !current.is_empty() && current.len() + line.len() > max_length {
            parts.push(std::mem::take(&mut current));
        }

        if line.len() <= max_length {
            current.push_str(line);
            continue;
        }

        for grapheme in line.graphemes(true) {
            if !current.is_empty() && current.len() + grapheme.len() > max_length {
                parts.push(std::mem::take(&mut current));
            }
            current.push_str(grapheme);
        }
    }

    if !current.is_empty() {
        parts.push(current);
    }

    parts
}

/// Safely truncates a string to a maximum character length (not bytes).
///
/// # Examples
///
/// ```
/// use umida_bot::utils::truncate_str;
/// let s = "Qalaysiz, do'stim?";
/// assert_eq!(truncate_str(s, 8), "Qalaysiz");
/// ```
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}

/// Retry a Telegram API operation with exponential backoff.
///
/// Backoff starts at 500ms, is capped at 4s and jittered; at most
/// `TELEGRAM_API_MAX_RETRIES` retries follow the first attempt.
///
/// # Errors
///
/// Returns the last error if all attempts fail.
pub async fn retry_telegram_operation<F, Fut, T>(operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    use crate::config::{
        TELEGRAM_API_INITIAL_BACKOFF_MS, TELEGRAM_API_MAX_BACKOFF_MS, TELEGRAM_API_MAX_RETRIES,
    };

    let retry_strategy = ExponentialBackoff::from_millis(TELEGRAM_API_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(TELEGRAM_API_MAX_BACKOFF_MS))
        .map(jitter)
        .take(TELEGRAM_API_MAX_RETRIES);

    Retry::spawn(retry_strategy, operation).await.map_err(|e| {
        warn!(
            "Telegram API operation failed after {} retries: {}",
            TELEGRAM_API_MAX_RETRIES, e
        );
        e
    })
}
