//! Admin Console
//!
//! Authorizes admin commands and maps them onto pool operations, rendering
//! each `PoolOutcome` as a chat reply.

use crate::commands::Command;
use crate::pool::{CredentialState, CredentialView, PoolOutcome, PoolStats, SharedPool};
use parking_lot::RwLock;
use std::fmt::Write;

const NO_ADMIN: &str = "❌ No admin set. Use /setadmin first to become admin.";
const NOT_ADMIN: &str = "❌ This command is only available to the bot admin.";

/// Who may run admin commands
#[derive(Debug, Default)]
pub struct AdminGate {
    admin: RwLock<Option<i64>>,
}

/// Result of a `/setadmin` attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    Granted,
    AlreadyAdmin,
    Taken,
}

impl AdminGate {
    pub fn new(admin: Option<i64>) -> Self {
        Self {
            admin: RwLock::new(admin),
        }
    }

    pub fn current(&self) -> Option<i64> {
        *self.admin.read()
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.current() == Some(user_id)
    }

    /// First caller becomes admin; later callers are refused
    pub fn claim(&self, user_id: i64) -> Claim {
        let mut admin = self.admin.write();
        match *admin {
            None => {
                *admin = Some(user_id);
                tracing::info!(user_id, "admin claimed");
                Claim::Granted
            }
            Some(id) if id == user_id => Claim::AlreadyAdmin,
            Some(_) => Claim::Taken,
        }
    }

    /// Refusal text for a non-admin caller
    pub fn refusal(&self) -> &'static str {
        match self.current() {
            None => NO_ADMIN,
            Some(_) => NOT_ADMIN,
        }
    }
}

/// Reply to an admin command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminReply {
    pub text: String,

    /// The triggering message held a secret and should be deleted
    pub delete_command: bool,
}

impl AdminReply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            delete_command: false,
        }
    }
}

/// Executes admin commands against the shared pool
pub struct AdminConsole {
    pool: SharedPool,
    gate: AdminGate,
}

impl AdminConsole {
    pub fn new(pool: SharedPool, gate: AdminGate) -> Self {
        Self { pool, gate }
    }

    pub fn gate(&self) -> &AdminGate {
        &self.gate
    }

    /// Run `/setadmin` or any admin-only command; `None` for other commands
    pub async fn execute(&self, user_id: i64, command: &Command) -> Option<AdminReply> {
        if let Command::SetAdmin = command {
            return Some(AdminReply::text(self.set_admin(user_id)));
        }
        if !command.requires_admin() {
            return None;
        }

        if !self.gate.is_admin(user_id) {
            tracing::warn!(user_id, "admin command refused");
            return Some(AdminReply {
                text: self.gate.refusal().to_string(),
                // Never leave a key sitting in a chat, even on refusal.
                delete_command: command.carries_secret(),
            });
        }

        let reply = match command {
            Command::AddKey {
                secret: Some(secret),
                name,
            } => {
                let outcome = self.pool.add(secret, name.as_deref()).await;
                tracing::info!(user_id, ok = outcome.ok, "admin added API key");
                AdminReply {
                    text: render_outcome(&outcome),
                    delete_command: true,
                }
            }
            Command::AddKey { secret: None, .. } => AdminReply::text(
                "❌ Please provide an API key and optional name.\n\n\
                 Usage: /addapi YOUR_API_KEY [Name]\n\n\
                 ⚠️ The message will be deleted after processing for security.",
            ),
            Command::RemoveKey { id } => self.with_id(id, "remove", |id| self.pool.remove(id)),
            Command::DisableKey { id } => self.with_id(id, "disable", |id| self.pool.disable(id)),
            Command::EnableKey { id: Some(id) } => {
                AdminReply::text(render_outcome(&self.pool.enable(id).await))
            }
            Command::ToggleKey { id: Some(id) } => {
                AdminReply::text(render_outcome(&self.pool.toggle(id).await))
            }
            Command::EnableKey { id: None } => AdminReply::text(missing_id("enable")),
            Command::ToggleKey { id: None } => AdminReply::text(missing_id("toggle")),
            Command::ListKeys => AdminReply::text(render_key_list(&self.pool.details())),
            Command::KeyStats => AdminReply::text(render_dashboard(&self.pool.stats())),
            _ => return None,
        };
        Some(reply)
    }

    fn with_id(
        &self,
        id: &Option<String>,
        action: &str,
        op: impl FnOnce(&str) -> PoolOutcome,
    ) -> AdminReply {
        match id {
            Some(id) => AdminReply::text(render_outcome(&op(id))),
            None => AdminReply::text(missing_id(action)),
        }
    }

    fn set_admin(&self, user_id: i64) -> String {
        match self.gate.claim(user_id) {
            Claim::Granted => format!(
                "👑 You have been set as the bot admin!\nYour User ID: {}",
                user_id
            ),
            Claim::AlreadyAdmin => format!("👑 You are already the admin!\nYour User ID: {}", user_id),
            Claim::Taken => {
                "❌ Admin is already set. Only the current admin can manage the bot.".to_string()
            }
        }
    }
}

fn missing_id(action: &str) -> String {
    format!(
        "❌ Please provide API ID to {}.\nUse /listapis to see available APIs.",
        action
    )
}

fn render_outcome(outcome: &PoolOutcome) -> String {
    let mark = if outcome.ok { "✅" } else { "❌" };
    format!("{} {}", mark, outcome.message)
}

fn state_emoji(state: CredentialState) -> &'static str {
    match state {
        CredentialState::Active => "✅",
        CredentialState::Failed => "❌",
        CredentialState::Cooldown { .. } => "⏳",
        CredentialState::Disabled => "🚫",
    }
}

/// `/listapis` body
pub fn render_key_list(keys: &[CredentialView]) -> String {
    if keys.is_empty() {
        return "❌ No API keys configured. Use /addapi to add API keys.".to_string();
    }

    let mut out = String::from("🔑 API Keys:\n\n");
    for key in keys {
        let _ = writeln!(out, "{} {}", key.name, state_emoji(key.state));
        let _ = writeln!(out, "└ ID: {}", key.id);
        let _ = writeln!(out, "└ Key: {}", key.masked_key);
        let _ = writeln!(
            out,
            "└ Status: {}{}",
            key.state,
            if key.available { "" } else { " (unavailable)" }
        );
        let _ = writeln!(
            out,
            "└ Requests: {} (Success: {:.1}%)",
            key.total_requests, key.success_rate
        );
        let _ = writeln!(out, "└ Added: {}", key.added_at.format("%Y-%m-%d %H:%M UTC"));
        if let Some(error) = key.last_error.as_deref() {
            if key.state != CredentialState::Active {
                let short: String = error.chars().take(50).collect();
                let _ = writeln!(out, "└ Last Error: {}", short);
            }
        }
        out.push('\n');
    }

    out.push_str(
        "Commands:\n\
         /removeapi <id> - Remove API key\n\
         /toggleapi <id> - Enable/disable API key\n\
         /apistat - Detailed statistics",
    );
    out
}

/// `/apistat` body
pub fn render_dashboard(stats: &PoolStats) -> String {
    let failover = match stats.active {
        0 => "🔴 Offline",
        1 => "🟡 Limited",
        _ => "🟢 Active",
    };
    let redundancy = match stats.active {
        0 | 1 => "🔴 Low",
        2 => "🟡 Medium",
        _ => "🟢 High",
    };
    let advice = match stats.active {
        0 => "⚠️ CRITICAL: No active APIs! Add API keys immediately.",
        1 => "⚠️ WARNING: Only 1 active API. Add more for redundancy.",
        2 => "💡 SUGGESTION: Add more API keys for better load distribution.",
        _ => "✅ EXCELLENT: Good API redundancy and load balancing.",
    };

    let mut out = format!(
        "📊 API Statistics:\n\n\
         Overall:\n\
         • Total APIs: {}\n\
         • Active APIs: {} ✅\n\
         • Failed APIs: {} ❌\n\
         • Disabled APIs: {} 🚫\n\
         • Cooldown APIs: {} ⏳\n\n\
         Requests:\n\
         • Total Requests: {}\n\
         • Successful Requests: {}\n\
         • Overall Success Rate: {:.2}%\n\n\
         Load Balancing:\n\
         • Failover: {}\n\
         • Redundancy: {}\n\n\
         Recommendations:\n\
         • {}",
        stats.total,
        stats.active,
        stats.failed,
        stats.disabled,
        stats.cooldown,
        stats.total_requests,
        stats.total_successes,
        stats.success_rate,
        failover,
        redundancy,
        advice
    );
    if stats.success_rate < 90.0 && stats.total_requests > 10 {
        out.push_str("\n• 🔧 ATTENTION: Low success rate. Check API key validity.");
    }
    out
}
