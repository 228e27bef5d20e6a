use dotenvy::dotenv;
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};
use umida_bot::bot::handlers::Command;
use umida_bot::bot::UnauthorizedCache;
use umida_bot::completion::RateLimitedCompletionClient;
use umida_bot::config::{Settings, UNAUTHORIZED_CACHE_MAX_SIZE};
use umida_bot::llm::gemini::GeminiProvider;
use umida_bot::{bot, llm};

/// Regex patterns for redacting sensitive data
struct RedactionPatterns {
    token1: Regex,
    token2: Regex,
    token3: Regex,
    gemini_query: Regex,
    gemini_header: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            token1: Regex::new(r"(https?://[^/]+/bot)([0-9]+:[A-Za-z0-9_-]+)(/['\s]*)")?,
            token2: Regex::new(r"([0-9]{8,10}:[A-Za-z0-9_-]{35})")?,
            token3: Regex::new(r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+")?,
            gemini_query: Regex::new(r"([?&]key=)[^&\s]+")?,
            gemini_header: Regex::new(r#"(?i)(x-goog-api-key"?\s*[:=]\s*"?)[^"\s,}]+"#)?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let mut output = input.to_string();
        output = self
            .token1
            .replace_all(&output, "$1[TELEGRAM_TOKEN]$3")
            .to_string();
        output = self
            .token2
            .replace_all(&output, "[TELEGRAM_TOKEN]")
            .to_string();
        output = self
            .token3
            .replace_all(&output, "$1[TELEGRAM_TOKEN]")
            .to_string();
        output = self
            .gemini_query
            .replace_all(&output, "${1}[MASKED]")
            .to_string();
        output = self
            .gemini_header
            .replace_all(&output, "${1}[MASKED]")
            .to_string();
        output
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> RedactingWriter<W> {
    const fn new(inner: W, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // Report the original length; the redacted text may differ in size.
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<F> RedactingMakeWriter<F> {
    const fn new(make_inner: F, patterns: Arc<RedactionPatterns>) -> Self {
        Self {
            make_inner,
            patterns,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), self.patterns.clone())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);

    init_logging(patterns);

    info!("🚀 Starting Umida bot...");

    let settings = init_settings();
    let shutdown = CancellationToken::new();
    let client = init_completion_client(&settings, shutdown.clone());
    let unauthorized_cache = init_unauthorized_cache(&settings);

    let bot = Bot::new(settings.telegram_token.clone());

    // Skip whatever piled up while the bot was offline
    if let Err(e) = bot.delete_webhook().drop_pending_updates(true).await {
        warn!("Failed to drop pending updates: {e}");
    }

    let handler = setup_handler();

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![client, unauthorized_cache])
        .enable_ctrlc_handler()
        .build();

    // The dispatcher's own Ctrl-C handler stops polling; this one releases
    // handlers parked in a rate-limit cooldown so shutdown does not wait on them.
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested, cancelling pending cooldowns.");
                shutdown.cancel();
            }
        }
    });

    info!("Bot is running...");
    dispatcher.dispatch().await;

    shutdown.cancel();
    info!("Bot stopped.");
    Ok(())
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter::new(io::stderr, patterns);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Arc<Settings> {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_completion_client(
    settings: &Settings,
    shutdown: CancellationToken,
) -> Arc<RateLimitedCompletionClient> {
    let Some(api_key) = settings.gemini_key() else {
        error!("GEMINI_API_KEY (or GOOGLE_API_KEY) is not set.");
        std::process::exit(1);
    };

    let allow_list = settings.allowed_users();
    if allow_list.is_empty() {
        warn!("ALLOWED_USERS is empty; every message will be ignored.");
    }

    let provider: Arc<dyn llm::LlmProvider> = Arc::new(GeminiProvider::new(
        api_key.to_string(),
        settings.gemini_temperature,
        Duration::from_secs(settings.llm_http_timeout_secs),
    ));
    let policy = settings.completion_policy();

    info!(
        model = %policy.model_id,
        max_attempts = policy.max_attempts,
        cooldown_secs = policy.cooldown.as_secs(),
        global_concurrency = settings.global_concurrency,
        allowed_users = allow_list.len(),
        "Completion client initialized."
    );

    Arc::new(
        RateLimitedCompletionClient::new(provider, allow_list, policy)
            .with_global_gate(settings.global_concurrency)
            .with_shutdown_token(shutdown),
    )
}

fn init_unauthorized_cache(settings: &Settings) -> Arc<UnauthorizedCache> {
    let cooldown = settings.unauthorized_log_cooldown_secs;

    info!(
        "Initializing UnauthorizedCache (cooldown: {}s, max_size: {})",
        cooldown, UNAUTHORIZED_CACHE_MAX_SIZE
    );

    Arc::new(UnauthorizedCache::new(cooldown, UNAUTHORIZED_CACHE_MAX_SIZE))
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    Update::filter_message()
        .branch(
            dptree::filter(|msg: Message, client: Arc<RateLimitedCompletionClient>| {
                client.is_allowed(bot::handlers::get_user_id_safe(&msg))
            })
            .filter_command::<Command>()
            .endpoint(handle_command),
        )
        .branch(
            dptree::filter(|msg: Message| msg.text().is_some_and(|t| !t.starts_with('/')))
                .endpoint(handle_chat_text),
        )
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    client: Arc<RateLimitedCompletionClient>,
    cache: Arc<UnauthorizedCache>,
) -> Result<(), teloxide::RequestError> {
    let res = match cmd {
        Command::Start => bot::handlers::start(bot, msg).await,
        Command::Stats => bot::handlers::stats(bot, msg, client, cache).await,
    };
    if let Err(e) = res {
        error!("Command error: {}", e);
    }
    respond(())
}

async fn handle_chat_text(
    bot: Bot,
    msg: Message,
    client: Arc<RateLimitedCompletionClient>,
    cache: Arc<UnauthorizedCache>,
) -> Result<(), teloxide::RequestError> {
    let chat_id = msg.chat.id;
    if let Err(e) = bot::handlers::handle_text(bot, msg, client, cache).await {
        error!("Error in chat {}: {}", chat_id.0, e);
    }
    respond(())
}
