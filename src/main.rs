use anyhow::{bail, Context};
use keyring_bot::chat::TelegramClient;
use keyring_bot::{build_pool, ChatBot, ConfigLoader, GeminiProvider};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let loader = match std::env::args().nth(1) {
        Some(path) => ConfigLoader::from_path(&path),
        None => ConfigLoader::new(),
    }
    .context("failed to load configuration")?;
    let settings = loader.into_settings().context("invalid configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))
        .context("invalid log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if settings.telegram.bot_token.trim().is_empty() {
        bail!("TELEGRAM_BOT_TOKEN is not set");
    }

    let provider = Arc::new(GeminiProvider::new(settings.provider.clone())?);
    let pool = build_pool(&settings, provider).await;
    if !pool.is_configured() {
        tracing::warn!("no active API keys; an admin can add one with /addapi");
    }

    let telegram = Arc::new(TelegramClient::new(settings.telegram.clone())?);
    let identity = telegram
        .identity()
        .await
        .context("failed to reach the Telegram Bot API")?;
    tracing::info!(bot = %identity.username, model = %settings.provider.model, "bot started");

    let bot = Arc::new(ChatBot::new(
        &settings,
        pool,
        telegram.clone(),
        identity.username.clone(),
    ));
    let messages = telegram.messages(identity);

    tokio::select! {
        _ = bot.run(messages) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }

    Ok(())
}
