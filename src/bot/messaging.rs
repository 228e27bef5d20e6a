//! Sending model replies back to Telegram.

use crate::bot::resilient::send_message_resilient;
use crate::utils;
use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{ChatId, MessageId};

/// Maximum message length for Telegram with safety margin.
/// Telegram's official limit is 4096 characters.
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4000;

/// Sends a reply as plain text, split into as many messages as needed.
///
/// Only the first part is threaded as a reply to `reply_to`; the rest follow
/// as ordinary messages in order. Whitespace-only parts are skipped since
/// Telegram rejects empty messages.
///
/// # Errors
///
/// Returns an error if any part fails to send after retries.
pub async fn send_long_message(
    bot: &Bot,
    chat_id: ChatId,
    reply_to: MessageId,
    text: &str,
) -> Result<()> {
    let parts = utils::split_long_message(text, TELEGRAM_MESSAGE_LIMIT)
        .into_iter()
        .filter(|part| !part.trim().is_empty());

    for (index, part) in parts.enumerate() {
        let reply_to = (index == 0).then_some(reply_to);
        send_message_resilient(bot, chat_id, reply_to, part).await?;
    }

    Ok(())
}
