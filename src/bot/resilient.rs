//! Resilient messaging utilities with automatic retry for Telegram API operations.
//!
//! Replies are retried with exponential backoff and jitter. Cosmetic actions
//! (reactions, the typing indicator) are attempted once and only logged on
//! failure, so they never block or fail a reply.

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, ChatId, Message, MessageId, ReactionType, ReplyParameters};
use tracing::warn;

/// Send a plain-text message with automatic retry on network failures.
///
/// When `reply_to` is set the message is sent as a reply to that message.
///
/// # Errors
///
/// Returns the last error after all retries are exhausted.
pub async fn send_message_resilient(
    bot: &Bot,
    chat_id: ChatId,
    reply_to: Option<MessageId>,
    text: impl Into<String>,
) -> Result<Message> {
    let text = text.into();
    crate::utils::retry_telegram_operation(|| async {
        let mut req = bot.send_message(chat_id, text.clone());
        if let Some(msg_id) = reply_to {
            req = req.reply_parameters(ReplyParameters::new(msg_id));
        }
        req.await
            .map_err(|e| anyhow::anyhow!("Telegram send error: {e}"))
    })
    .await
}

/// Put a single emoji reaction on a message. Failures are logged and ignored.
pub async fn set_reaction_safe(bot: &Bot, chat_id: ChatId, msg_id: MessageId, emoji: &str) {
    let reaction = ReactionType::Emoji {
        emoji: emoji.to_string(),
    };
    if let Err(e) = bot
        .set_message_reaction(chat_id, msg_id)
        .reaction(vec![reaction])
        .await
    {
        warn!("Failed to set reaction {emoji} on message {}: {e}", msg_id.0);
    }
}

/// Show the "typing" indicator. Failures are logged and ignored.
pub async fn send_typing_safe(bot: &Bot, chat_id: ChatId) {
    if let Err(e) = bot.send_chat_action(chat_id, ChatAction::Typing).await {
        warn!("Failed to send typing action to chat {}: {e}", chat_id.0);
    }
}
