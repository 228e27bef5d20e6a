use crate::bot::messaging::send_long_message;
use crate::bot::resilient::{send_message_resilient, send_typing_safe, set_reaction_safe};
use crate::bot::UnauthorizedCache;
use crate::completion::RateLimitedCompletionClient;
use crate::config::REACTIONS;
use anyhow::Result;
use futures_util::future;
use std::sync::Arc;
use teloxide::{prelude::*, types::MessageId, utils::command::BotCommands};
use tracing::{debug, info};

/// Safe extraction of user ID from a message.
/// Returns 0 if the user information is missing.
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

/// Picks the acknowledgement reaction for a message.
///
/// The choice is spread over [`REACTIONS`] by message id.
///
/// # Examples
///
/// ```
/// use teloxide::types::MessageId;
/// use umida_bot::bot::handlers::pick_reaction;
/// assert_eq!(pick_reaction(MessageId(0)), "🫂");
/// assert_eq!(pick_reaction(MessageId(4)), "🤍");
/// ```
#[must_use]
pub fn pick_reaction(msg_id: MessageId) -> &'static str {
    let index = usize::try_from(msg_id.0.unsigned_abs()).unwrap_or_default() % REACTIONS.len();
    REACTIONS[index]
}

/// Supported commands for the bot
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Greet the user
    #[command(description = "Start the bot.")]
    Start,
    /// Show bot statistics
    #[command(description = "Show bot statistics.")]
    Stats,
}

/// Start handler
///
/// # Errors
///
/// Returns an error if the greeting cannot be sent.
pub async fn start(bot: Bot, msg: Message) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    info!("User {user_id} initiated /start command.");

    send_message_resilient(
        &bot,
        msg.chat.id,
        None,
        "Salom! Men Umidaman 🕊️ Nima haqida gaplashamiz?",
    )
    .await?;
    Ok(())
}

/// Statistics handler
///
/// # Errors
///
/// Returns an error if the statistics message cannot be sent.
pub async fn stats(
    bot: Bot,
    msg: Message,
    client: Arc<RateLimitedCompletionClient>,
    cache: Arc<UnauthorizedCache>,
) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    info!("Stats command received from user {user_id}.");

    let policy = client.policy();
    let cooldown_mins = cache.cooldown().as_secs() / 60;
    let stats_text = format!(
        "📊 Bot statistics\n\n\
        Model: {}\n\
        Attempts per message: {}\n\
        Cooldown after rate limit: {} s\n\n\
        Unauthorized access (silently ignored):\n\
        • Log cooldown: {} min.\n\
        • Cache entries: {}\n\
        • Unlogged attempts: {}",
        policy.model_id,
        policy.max_attempts,
        policy.cooldown.as_secs(),
        cooldown_mins,
        cache.entry_count(),
        cache.silenced_count(),
    );

    send_message_resilient(&bot, msg.chat.id, None, stats_text).await?;
    Ok(())
}

/// Text message handler
///
/// Unauthorized senders are only recorded in `cache`; they get no reaction,
/// no typing indicator and no reply.
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn handle_text(
    bot: Bot,
    msg: Message,
    client: Arc<RateLimitedCompletionClient>,
    cache: Arc<UnauthorizedCache>,
) -> Result<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let user_id = get_user_id_safe(&msg);

    if !client.is_allowed(user_id) {
        cache.record(user_id).await;
        return Ok(());
    }

    future::join(
        set_reaction_safe(&bot, msg.chat.id, msg.id, pick_reaction(msg.id)),
        send_typing_safe(&bot, msg.chat.id),
    )
    .await;

    let Some(reply) = client.handle(user_id, text).await else {
        debug!(user_id, "No reply produced");
        return Ok(());
    };

    send_long_message(&bot, msg.chat.id, msg.id, &reply).await
}
