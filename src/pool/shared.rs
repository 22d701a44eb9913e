//! Shared Pool Handle
//!
//! Wraps a `KeyPool` in a mutex so every chat task and the admin commands see
//! the same state. The lock is never held across a provider call: probes run
//! unlocked and admission is re-checked before insertion.

use crate::config::PoolConfig;
use crate::error::BotError;
use crate::pool::credential::CredentialState;
use crate::pool::manager::{CredentialView, KeyPool, Lease, PoolOutcome, PoolStats};
use crate::provider::{is_rate_limit_message, Provider};
use parking_lot::Mutex;
use std::sync::Arc;

/// Cloneable handle to the process-wide key pool
#[derive(Clone)]
pub struct SharedPool {
    inner: Arc<Mutex<KeyPool>>,
    provider: Arc<dyn Provider>,
}

impl SharedPool {
    /// Create an empty pool that probes keys with `provider`
    pub fn new(config: PoolConfig, provider: Arc<dyn Provider>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(KeyPool::new(config))),
            provider,
        }
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// Validate, probe and register a key
    pub async fn add(&self, secret: &str, name: Option<&str>) -> PoolOutcome {
        let secret = secret.trim();
        if let Err(rejection) = self.inner.lock().check_admission(secret) {
            return rejection;
        }

        if !self.provider.probe(secret).await {
            return PoolOutcome::rejected("API key test failed. Invalid or rate-limited key.");
        }

        // The pool may have changed while the probe was in flight.
        self.inner.lock().insert(secret, name)
    }

    pub fn remove(&self, id: &str) -> PoolOutcome {
        self.inner.lock().remove(id)
    }

    pub fn disable(&self, id: &str) -> PoolOutcome {
        self.inner.lock().disable(id)
    }

    /// Re-probe a key and return it to service if the probe passes
    pub async fn enable(&self, id: &str) -> PoolOutcome {
        let (secret, name) = match self.inner.lock().get(id) {
            Some(credential) => (credential.secret().to_string(), credential.name().to_string()),
            None => return PoolOutcome::rejected("API key not found"),
        };

        if !self.provider.probe(&secret).await {
            tracing::warn!(credential = %id, "enable refused, probe failed");
            return PoolOutcome::rejected(format!("API key '{}' test failed", name));
        }

        self.inner.lock().mark_enabled(id)
    }

    /// Enable a disabled key, disable any other
    pub async fn toggle(&self, id: &str) -> PoolOutcome {
        let state = self.inner.lock().get(id).map(|c| c.state());
        match state {
            None => PoolOutcome::rejected("API key not found"),
            Some(CredentialState::Disabled) => self.enable(id).await,
            Some(_) => self.disable(id),
        }
    }

    pub fn acquire(&self) -> Option<Lease> {
        self.inner.lock().acquire()
    }

    pub fn acquire_best(&self) -> Option<Lease> {
        self.inner.lock().acquire_best()
    }

    pub fn report_success(&self, id: &str) {
        self.inner.lock().report_success(id);
    }

    pub fn report_failure(&self, id: &str, error: &str) {
        self.inner.lock().report_failure(id, error);
    }

    /// Record a failed call from a typed provider error
    pub fn report_error(&self, id: &str, error: &BotError) {
        let text = error.to_string();
        let rate_limited = error.is_rate_limited() || is_rate_limit_message(&text);
        self.inner
            .lock()
            .report_classified_failure(id, &text, rate_limited);
    }

    pub fn stats(&self) -> PoolStats {
        self.inner.lock().stats()
    }

    pub fn details(&self) -> Vec<CredentialView> {
        self.inner.lock().details()
    }

    pub fn state_of(&self, id: &str) -> Option<CredentialState> {
        self.inner.lock().get(id).map(|c| c.state())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// At least one key is registered
    ///
    /// Failed and cooling keys still count: selection retries them and ends
    /// elapsed cooldowns, and exhausted attempts fall back to a canned reply.
    pub fn is_configured(&self) -> bool {
        !self.is_empty()
    }
}
