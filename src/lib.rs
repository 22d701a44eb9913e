//! Keyring Bot - Telegram AI companion with a self-healing key pool
//!
//! Answers chat messages through a generative text provider, spreading
//! requests over a pool of API keys with round-robin selection, failure
//! tracking, cooldown recovery and last-resort fallback replies.

pub mod admin;
pub mod bot;
pub mod chat;
pub mod commands;
pub mod config;
pub mod error;
pub mod generation;
pub mod pool;
pub mod provider;

pub use bot::ChatBot;
pub use config::{ConfigLoader, Settings};
pub use error::{BotError, Result};
pub use generation::Generator;
pub use pool::{KeyPool, PoolOutcome, PoolStats, SharedPool};
pub use provider::{GeminiProvider, Provider};

use std::sync::Arc;

/// Display name given to the key supplied through configuration
pub const SEED_KEY_NAME: &str = "Environment";

/// Build the shared pool and register the configured seed key, if any
///
/// A seed key that fails validation or its probe is logged and skipped; the
/// bot still starts and keys can be added later with `/addapi`.
pub async fn build_pool(settings: &Settings, provider: Arc<dyn Provider>) -> SharedPool {
    let pool = SharedPool::new(settings.pool.clone(), provider);

    if let Some(secret) = settings.provider.api_key.as_deref() {
        let outcome = pool.add(secret, Some(SEED_KEY_NAME)).await;
        if outcome.ok {
            tracing::info!(key = %crate::pool::mask_secret(secret), "registered seed API key");
        } else {
            tracing::warn!(reason = %outcome.message, "seed API key rejected");
        }
    }

    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::{BoxFuture, FutureExt};

    struct ProbeOnly(bool);

    impl Provider for ProbeOnly {
        fn generate<'a>(
            &'a self,
            _secret: &'a str,
            _model: &'a str,
            _prompt: &'a str,
        ) -> BoxFuture<'a, Result<String>> {
            async { Ok(String::new()) }.boxed()
        }

        fn probe<'a>(&'a self, _secret: &'a str) -> BoxFuture<'a, bool> {
            let ok = self.0;
            async move { ok }.boxed()
        }
    }

    fn settings_with_key(key: Option<&str>) -> Settings {
        let mut settings = Settings::default();
        settings.provider.api_key = key.map(str::to_string);
        settings
    }

    #[tokio::test]
    async fn test_seed_key_registered_as_environment() {
        let settings = settings_with_key(Some("AIzaSySeedKey0000000000000"));
        let pool = build_pool(&settings, Arc::new(ProbeOnly(true))).await;

        let details = pool.details();
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].name, SEED_KEY_NAME);
        assert!(pool.is_configured());
    }

    #[tokio::test]
    async fn test_rejected_seed_key_is_not_fatal() {
        let settings = settings_with_key(Some("AIzaSySeedKey0000000000000"));
        let pool = build_pool(&settings, Arc::new(ProbeOnly(false))).await;
        assert!(pool.is_empty());

        let pool = build_pool(&settings_with_key(None), Arc::new(ProbeOnly(true))).await;
        assert!(pool.is_empty());
    }
}
