//! Bot Settings
//!
//! Defines the configuration schema for the bot, the provider and the key pool.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{BotError, Result};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Telegram Bot API connection
    pub telegram: TelegramConfig,

    /// Generative provider endpoint and probe behaviour
    pub provider: ProviderConfig,

    /// Key pool health tracking parameters
    pub pool: PoolConfig,

    /// Retry loop around generation calls
    pub generation: GenerationConfig,

    /// Conversation handling
    pub chat: ChatConfig,

    /// Telegram user id allowed to run admin commands
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_user_id: Option<i64>,

    /// Default tracing filter directive
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            telegram: TelegramConfig::default(),
            provider: ProviderConfig::default(),
            pool: PoolConfig::default(),
            generation: GenerationConfig::default(),
            chat: ChatConfig::default(),
            admin_user_id: None,
            log_level: "info".to_string(),
        }
    }
}

/// Telegram Bot API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token from @BotFather
    pub bot_token: String,

    /// Base URL of the Bot API
    pub api_base: String,

    /// Long-polling timeout for getUpdates
    pub poll_timeout_secs: u64,

    /// Username used to detect mentions in group chats
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_username: Option<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base: "https://api.telegram.org".to_string(),
            poll_timeout_secs: 30,
            bot_username: None,
        }
    }
}

/// Provider endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL for the Generative Language REST API
    pub base_url: String,

    /// Model used for chat replies
    pub model: String,

    /// Model used for the registration/enable probe
    pub probe_model: String,

    /// Minimal prompt sent by the probe
    pub probe_prompt: String,

    /// Time budget of a single probe call
    pub probe_timeout_secs: u64,

    /// Key registered at startup, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.5-flash".to_string(),
            probe_model: "gemini-2.5-flash".to_string(),
            probe_prompt: "Say 'test' if you can read this.".to_string(),
            probe_timeout_secs: 15,
            api_key: None,
        }
    }
}

impl ProviderConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Key pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of registered keys
    pub max_keys: usize,

    /// Consecutive failures before a key enters cooldown
    pub failure_threshold: u32,

    /// Base cooldown length
    pub cooldown_secs: u64,

    /// Extra cooldown added when the failure was a rate-limit/quota error
    pub rate_limit_penalty_secs: u64,

    /// Required key prefix for the cheap format check
    pub key_prefix: String,

    /// Minimum key length for the cheap format check
    pub min_key_length: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_keys: 10,
            failure_threshold: 2,
            cooldown_secs: 300,
            rate_limit_penalty_secs: 600,
            key_prefix: "AI".to_string(),
            min_key_length: 20,
        }
    }
}

impl PoolConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn rate_limit_penalty(&self) -> Duration {
        Duration::from_secs(self.rate_limit_penalty_secs)
    }
}

/// Generation retry loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Number of acquire/call/report cycles before giving up
    pub max_attempts: u32,

    /// Time budget of a single provider call
    pub attempt_timeout_secs: u64,

    /// Pause between attempts
    pub retry_delay_ms: u64,

    /// Replies used when every attempt failed; `{name}` is the user's name
    pub fallback_replies: Vec<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout_secs: 30,
            retry_delay_ms: 1000,
            fallback_replies: vec![
                "Sorry {name}! All my AI connections are having trouble right now. Please try again in a moment!".to_string(),
                "My circuits are all busy right now! Try again in a few minutes please!".to_string(),
            ],
        }
    }
}

impl GenerationConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Conversation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Name the bot answers as
    pub persona_name: String,

    /// Persona preamble placed before the conversation
    pub persona: String,

    /// Number of lines kept per chat
    pub context_window: usize,

    /// Text sent for /start and /help
    pub welcome_text: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            persona_name: "Leyana".to_string(),
            persona: "a friendly companion".to_string(),
            context_window: 20,
            welcome_text: "Hey there! I'm your AI companion.".to_string(),
        }
    }
}

impl Settings {
    /// Reject values the pool and retry loop cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.pool.max_keys == 0 {
            return Err(BotError::Config("pool.max_keys must be at least 1".to_string()));
        }
        if self.pool.failure_threshold == 0 {
            return Err(BotError::Config(
                "pool.failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.generation.max_attempts == 0 {
            return Err(BotError::Config(
                "generation.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply overrides from well-known environment variables
    pub fn apply_env_overrides(&mut self) {
        if let Some(token) = env_non_empty("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Some(key) = env_non_empty("GEMINI_API_KEY") {
            self.provider.api_key = Some(key);
        }
        if let Some(model) = env_non_empty("GEMINI_MODEL") {
            self.provider.model = model;
        }
        if let Some(id) = env_non_empty("ADMIN_USER_ID").and_then(|v| v.parse::<i64>().ok()) {
            // 0 means no admin.
            self.admin_user_id = (id != 0).then_some(id);
        }
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
