//! Managed Credentials
//!
//! A single provider key together with its health bookkeeping and the
//! per-key state machine.

use crate::config::PoolConfig;
use chrono::{DateTime, Utc};
use std::fmt;
use tokio::time::Instant;

/// Lifecycle state of a credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    /// Usable immediately
    Active,

    /// Still selectable, but the last call failed
    Failed,

    /// Not selectable until `until`; flips back to `Active` lazily
    Cooldown { until: Instant },

    /// Not selectable until an admin re-enables it
    Disabled,
}

impl CredentialState {
    pub fn label(&self) -> &'static str {
        match self {
            CredentialState::Active => "active",
            CredentialState::Failed => "failed",
            CredentialState::Cooldown { .. } => "cooldown",
            CredentialState::Disabled => "disabled",
        }
    }
}

impl fmt::Display for CredentialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One managed provider key
#[derive(Debug, Clone)]
pub struct Credential {
    /// Stable identifier assigned at insertion
    id: String,

    /// Insertion sequence, used to keep rotation order across removals
    seq: u64,

    /// The actual API key value
    secret: String,

    /// Human readable name
    name: String,

    state: CredentialState,

    /// Last time the key was used for a call, successful or not
    last_used: Option<Instant>,

    consecutive_failures: u32,
    success_count: u64,
    request_count: u64,
    last_error: Option<String>,
    added_at: DateTime<Utc>,
}

impl Credential {
    pub(crate) fn new(id: String, seq: u64, secret: String, name: String) -> Self {
        Self {
            id,
            seq,
            secret,
            name,
            state: CredentialState::Active,
            last_used: None,
            consecutive_failures: 0,
            success_count: 0,
            request_count: 0,
            last_error: None,
            added_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CredentialState {
        self.state
    }

    pub fn last_used(&self) -> Option<Instant> {
        self.last_used
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn success_count(&self) -> u64 {
        self.success_count
    }

    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }

    /// Percentage of successful requests, 0 when unused
    pub fn success_rate(&self) -> f64 {
        self.success_count as f64 / self.request_count.max(1) as f64 * 100.0
    }

    /// Whether the key could be selected at `now`, without changing state
    pub fn is_selectable(&self, now: Instant) -> bool {
        match self.state {
            CredentialState::Active | CredentialState::Failed => true,
            CredentialState::Cooldown { until } => now >= until,
            CredentialState::Disabled => false,
        }
    }

    /// Availability check that also ends an elapsed cooldown
    pub(crate) fn refresh(&mut self, now: Instant) -> bool {
        if let CredentialState::Cooldown { until } = self.state {
            if now >= until {
                tracing::info!(credential = %self.id, "cooldown elapsed, key active again");
                self.state = CredentialState::Active;
            }
        }
        self.is_selectable(now)
    }

    /// Record a successful call
    pub(crate) fn record_success(&mut self, now: Instant) {
        self.success_count += 1;
        self.request_count += 1;
        self.last_used = Some(now);
        self.consecutive_failures = 0;

        match self.state {
            CredentialState::Disabled => {}
            CredentialState::Active | CredentialState::Failed | CredentialState::Cooldown { .. } => {
                self.state = CredentialState::Active;
            }
        }
    }

    /// Record a failed call and move towards cooldown
    pub(crate) fn record_failure(
        &mut self,
        error: &str,
        rate_limited: bool,
        config: &PoolConfig,
        now: Instant,
    ) {
        self.consecutive_failures += 1;
        self.request_count += 1;
        self.last_used = Some(now);
        self.last_error = Some(error.to_string());

        match self.state {
            CredentialState::Disabled => {}
            CredentialState::Active | CredentialState::Failed | CredentialState::Cooldown { .. } => {
                if self.consecutive_failures >= config.failure_threshold {
                    let mut until = now + config.cooldown();
                    if rate_limited {
                        until += config.rate_limit_penalty();
                    }
                    self.state = CredentialState::Cooldown { until };
                } else {
                    self.state = CredentialState::Failed;
                }
            }
        }
    }

    pub(crate) fn disable(&mut self) {
        self.state = CredentialState::Disabled;
    }

    /// Return to service after a successful probe
    pub(crate) fn enable(&mut self) {
        self.state = CredentialState::Active;
        self.consecutive_failures = 0;
    }

    /// Key rendered safe for display
    pub fn masked_secret(&self) -> String {
        mask_secret(&self.secret)
    }
}

/// Mask a key for display, keeping only the last 8 characters
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() < 8 {
        return "***".to_string();
    }
    let tail: String = chars[chars.len() - 8..].iter().collect();
    format!("...{}", tail)
}
