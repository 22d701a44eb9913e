//! Generation Orchestration
//!
//! Turns "find a working key and call the provider" into one call that
//! always yields text. Each attempt acquires a key, calls the provider under
//! a timeout and reports the outcome back to the pool; attempts are
//! sequential with a fixed pause between them. When every attempt fails the
//! caller gets a canned apology instead of an error.

use crate::config::GenerationConfig;
use crate::pool::SharedPool;
use futures::FutureExt;
use rand::seq::IndexedRandom;
use std::panic::AssertUnwindSafe;

/// Failure reason recorded when a call exceeds its time budget
pub const TIMEOUT_REASON: &str = "timeout";

const DEFAULT_FALLBACK: &str = "Sorry {name}, I can't think right now. Please try again later!";

/// How a reply was produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplySource {
    /// Produced by the provider using the named key
    Provider { credential: String },

    /// Canned reply after every attempt failed or the pool was empty
    Fallback,
}

/// Text for the user plus where it came from
#[derive(Debug, Clone)]
pub struct Reply {
    pub text: String,
    pub source: ReplySource,
    pub attempts: u32,
}

/// Retry loop wrapping the key pool and the provider
#[derive(Clone)]
pub struct Generator {
    pool: SharedPool,
    config: GenerationConfig,
    model: String,
}

impl Generator {
    pub fn new(pool: SharedPool, config: GenerationConfig, model: impl Into<String>) -> Self {
        Self {
            pool,
            config,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generate reply text; never fails
    pub async fn generate(&self, user_name: &str, prompt: &str) -> String {
        self.generate_reply(user_name, prompt).await.text
    }

    /// Generate a reply and report how it was produced
    pub async fn generate_reply(&self, user_name: &str, prompt: &str) -> Reply {
        let max_attempts = self.config.max_attempts.max(1);
        let timeout = self.config.attempt_timeout();

        for attempt in 1..=max_attempts {
            let Some(lease) = self.pool.acquire() else {
                tracing::error!("no API keys registered");
                return self.fallback(user_name, attempt - 1);
            };

            // Built inside the guarded future so a panic while creating the
            // call is contained too.
            let call = async {
                self.pool
                    .provider()
                    .generate(lease.secret(), &self.model, prompt)
                    .await
            };
            let guarded = AssertUnwindSafe(call).catch_unwind();

            match tokio::time::timeout(timeout, guarded).await {
                Ok(Ok(Ok(text))) => {
                    self.pool.report_success(&lease.id);
                    tracing::info!(credential = %lease.id, name = %lease.name, attempt, "reply generated");
                    return Reply {
                        text,
                        source: ReplySource::Provider {
                            credential: lease.id,
                        },
                        attempts: attempt,
                    };
                }
                Ok(Ok(Err(e))) => {
                    tracing::warn!(credential = %lease.id, attempt, error = %e, "generation failed, trying next key");
                    self.pool.report_error(&lease.id, &e);
                }
                Ok(Err(_panic)) => {
                    tracing::error!(credential = %lease.id, attempt, "provider call panicked");
                    self.pool.report_failure(&lease.id, "provider call panicked");
                }
                Err(_elapsed) => {
                    tracing::warn!(credential = %lease.id, attempt, timeout_secs = timeout.as_secs(), "generation timed out, trying next key");
                    self.pool.report_failure(&lease.id, TIMEOUT_REASON);
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.config.retry_delay()).await;
            }
        }

        tracing::error!(attempts = max_attempts, "all generation attempts failed");
        self.fallback(user_name, max_attempts)
    }

    fn fallback(&self, user_name: &str, attempts: u32) -> Reply {
        let template = self
            .config
            .fallback_replies
            .choose(&mut rand::rng())
            .map(String::as_str)
            .unwrap_or(DEFAULT_FALLBACK);

        Reply {
            text: template.replace("{name}", user_name),
            source: ReplySource::Fallback,
            attempts,
        }
    }
}
