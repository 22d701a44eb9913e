//! API Key Pool Management
//!
//! Owns every registered credential, hands out leases using round-robin
//! with failover, and applies outcome reports to the per-key state machine.
//! Cooldown expiry is evaluated lazily whenever the pool is asked for a key.

use crate::config::PoolConfig;
use crate::pool::credential::{mask_secret, Credential, CredentialState};
use crate::provider::rate_limit::is_rate_limit_message;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Result of an administrative pool operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOutcome {
    pub ok: bool,
    pub message: String,
}

impl PoolOutcome {
    pub fn accepted(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// Transient handle to a credential for the duration of one request
#[derive(Debug, Clone)]
pub struct Lease {
    pub id: String,
    pub name: String,
    secret: String,
}

impl Lease {
    fn from_credential(credential: &Credential) -> Self {
        Self {
            id: credential.id().to_string(),
            name: credential.name().to_string(),
            secret: credential.secret().to_string(),
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

/// Aggregated pool statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolStats {
    pub total: usize,
    pub active: usize,
    pub failed: usize,
    pub disabled: usize,
    pub cooldown: usize,
    pub total_requests: u64,
    pub total_successes: u64,
    pub success_rate: f64,
}

/// Display snapshot of one credential
#[derive(Debug, Clone)]
pub struct CredentialView {
    pub id: String,
    pub name: String,
    pub state: CredentialState,
    pub success_rate: f64,
    pub total_requests: u64,
    pub success_count: u64,
    pub failure_count: u32,
    pub last_error: Option<String>,
    pub available: bool,
    pub masked_key: String,
    pub added_at: DateTime<Utc>,
}

/// Pool of provider keys with health tracking
#[derive(Debug)]
pub struct KeyPool {
    config: PoolConfig,

    /// Credentials in insertion order
    credentials: Vec<Credential>,

    /// Sequence number of the last round-robin pick
    last_selected: Option<u64>,

    /// Next insertion sequence number
    next_seq: u64,
}

impl KeyPool {
    /// Create an empty pool
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            credentials: Vec::new(),
            last_selected: None,
            next_seq: 1,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Credential> {
        self.credentials.iter().find(|c| c.id() == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Credential> {
        self.credentials.iter_mut().find(|c| c.id() == id)
    }

    /// Cheap format check against the provider's key shape
    pub fn is_well_formed(&self, secret: &str) -> bool {
        secret.len() >= self.config.min_key_length && secret.starts_with(&self.config.key_prefix)
    }

    /// Checks that must pass before a key is probed and again before it is inserted
    pub fn check_admission(&self, secret: &str) -> Result<(), PoolOutcome> {
        if self.credentials.len() >= self.config.max_keys {
            return Err(PoolOutcome::rejected(format!(
                "Maximum {} API keys allowed",
                self.config.max_keys
            )));
        }
        if !self.is_well_formed(secret) {
            return Err(PoolOutcome::rejected(format!(
                "Invalid API key format (expected prefix '{}' and at least {} characters)",
                self.config.key_prefix, self.config.min_key_length
            )));
        }
        if self.credentials.iter().any(|c| c.secret() == secret) {
            return Err(PoolOutcome::rejected("API key already exists"));
        }
        Ok(())
    }

    /// Insert a key that already passed its probe
    pub fn insert(&mut self, secret: &str, name: Option<&str>) -> PoolOutcome {
        if let Err(rejection) = self.check_admission(secret) {
            return rejection;
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        let id = format!("api_{}", seq);
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("API Key {}", seq));

        tracing::info!(credential = %id, name = %name, key = %mask_secret(secret), "added API key");
        let message = format!("API key '{}' added successfully! (id: {})", name, id);
        self.credentials
            .push(Credential::new(id, seq, secret.to_string(), name));

        PoolOutcome::accepted(message)
    }

    /// Remove a key; the last remaining key is never removed
    pub fn remove(&mut self, id: &str) -> PoolOutcome {
        let Some(index) = self.credentials.iter().position(|c| c.id() == id) else {
            return PoolOutcome::rejected("API key not found");
        };
        if self.credentials.len() <= 1 {
            return PoolOutcome::rejected("Cannot remove the last API key");
        }

        let removed = self.credentials.remove(index);
        tracing::info!(credential = %removed.id(), name = %removed.name(), "removed API key");
        PoolOutcome::accepted(format!("API key '{}' removed successfully!", removed.name()))
    }

    /// Next key by round-robin over the available keys
    pub fn acquire(&mut self) -> Option<Lease> {
        self.acquire_at(Instant::now())
    }

    pub fn acquire_at(&mut self, now: Instant) -> Option<Lease> {
        if self.credentials.is_empty() {
            return None;
        }

        let available = self.refresh_available(now);
        if available.is_empty() {
            return self.least_recently_used();
        }

        // Next available key after the previous pick in insertion order,
        // wrapping to the first one.
        let index = match self.last_selected {
            Some(last) => available
                .iter()
                .copied()
                .find(|&i| self.credentials[i].seq() > last)
                .unwrap_or(available[0]),
            None => available[0],
        };

        let credential = &self.credentials[index];
        self.last_selected = Some(credential.seq());
        Some(Lease::from_credential(credential))
    }

    /// Best performing available key; falls back to `acquire`
    pub fn acquire_best(&mut self) -> Option<Lease> {
        self.acquire_best_at(Instant::now())
    }

    pub fn acquire_best_at(&mut self, now: Instant) -> Option<Lease> {
        let available = self.refresh_available(now);

        // Reversed so ties resolve to the earliest registered key.
        let best = available.iter().rev().copied().max_by(|&a, &b| {
            let a = &self.credentials[a];
            let b = &self.credentials[b];
            a.success_rate()
                .total_cmp(&b.success_rate())
                .then_with(|| b.consecutive_failures().cmp(&a.consecutive_failures()))
                .then_with(|| a.last_used().cmp(&b.last_used()))
        });

        match best {
            Some(index) => Some(Lease::from_credential(&self.credentials[index])),
            None => self.acquire_at(now),
        }
    }

    /// Indices of selectable keys, ending elapsed cooldowns on the way
    fn refresh_available(&mut self, now: Instant) -> Vec<usize> {
        self.credentials
            .iter_mut()
            .enumerate()
            .filter_map(|(i, c)| c.refresh(now).then_some(i))
            .collect()
    }

    /// Key used longest ago, regardless of state
    fn least_recently_used(&self) -> Option<Lease> {
        tracing::warn!("all API keys are unavailable, using least recently used");
        // `None` (never used) sorts first; `min_by_key` keeps the earliest on ties.
        self.credentials
            .iter()
            .min_by_key(|c| c.last_used())
            .map(Lease::from_credential)
    }

    /// Record a successful call
    pub fn report_success(&mut self, id: &str) {
        self.report_success_at(id, Instant::now());
    }

    pub fn report_success_at(&mut self, id: &str, now: Instant) {
        match self.get_mut(id) {
            Some(credential) => credential.record_success(now),
            None => tracing::warn!(credential = %id, "success reported for unknown key"),
        }
    }

    /// Record a failed call with the provider's error text
    pub fn report_failure(&mut self, id: &str, error: &str) {
        self.report_failure_at(id, error, Instant::now());
    }

    pub fn report_failure_at(&mut self, id: &str, error: &str, now: Instant) {
        self.report_classified_failure_at(id, error, is_rate_limit_message(error), now);
    }

    /// Record a failure whose rate-limit status the caller already knows
    pub fn report_classified_failure(&mut self, id: &str, error: &str, rate_limited: bool) {
        self.report_classified_failure_at(id, error, rate_limited, Instant::now());
    }

    pub fn report_classified_failure_at(
        &mut self,
        id: &str,
        error: &str,
        rate_limited: bool,
        now: Instant,
    ) {
        let config = &self.config;

        let Some(credential) = self.credentials.iter_mut().find(|c| c.id() == id) else {
            tracing::warn!(credential = %id, "failure reported for unknown key");
            return;
        };

        credential.record_failure(error, rate_limited, config, now);
        tracing::warn!(
            credential = %id,
            failures = credential.consecutive_failures(),
            state = %credential.state(),
            rate_limited,
            error,
            "API key call failed"
        );
    }

    /// Take a key out of rotation until it is re-enabled
    pub fn disable(&mut self, id: &str) -> PoolOutcome {
        match self.get_mut(id) {
            Some(credential) => {
                credential.disable();
                tracing::info!(credential = %id, "disabled API key");
                PoolOutcome::accepted(format!("API key '{}' disabled", credential.name()))
            }
            None => PoolOutcome::rejected("API key not found"),
        }
    }

    /// Return a key to service; the caller has already probed it
    pub fn mark_enabled(&mut self, id: &str) -> PoolOutcome {
        match self.get_mut(id) {
            Some(credential) => {
                credential.enable();
                tracing::info!(credential = %id, "enabled API key");
                PoolOutcome::accepted(format!("API key '{}' enabled", credential.name()))
            }
            None => PoolOutcome::rejected("API key not found"),
        }
    }

    /// Aggregate counters over stored states
    pub fn stats(&self) -> PoolStats {
        let mut stats = PoolStats {
            total: self.credentials.len(),
            ..PoolStats::default()
        };

        for credential in &self.credentials {
            match credential.state() {
                CredentialState::Active => stats.active += 1,
                CredentialState::Failed => stats.failed += 1,
                CredentialState::Cooldown { .. } => stats.cooldown += 1,
                CredentialState::Disabled => stats.disabled += 1,
            }
            stats.total_requests += credential.request_count();
            stats.total_successes += credential.success_count();
        }

        stats.success_rate =
            stats.total_successes as f64 / stats.total_requests.max(1) as f64 * 100.0;
        stats
    }

    /// Display snapshots of every key
    pub fn details(&self) -> Vec<CredentialView> {
        self.details_at(Instant::now())
    }

    pub fn details_at(&self, now: Instant) -> Vec<CredentialView> {
        self.credentials
            .iter()
            .map(|c| CredentialView {
                id: c.id().to_string(),
                name: c.name().to_string(),
                state: c.state(),
                success_rate: c.success_rate(),
                total_requests: c.request_count(),
                success_count: c.success_count(),
                failure_count: c.consecutive_failures(),
                last_error: c.last_error().map(str::to_string),
                available: c.is_selectable(now),
                masked_key: c.masked_secret(),
                added_at: c.added_at(),
            })
            .collect()
    }
}
