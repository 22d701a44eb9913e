//! Telegram Bot API Client
//!
//! Long-polls `getUpdates` and sends replies over plain HTTPS. Only the
//! handful of methods the bot needs are covered.

use crate::chat::{ChatKind, ChatTransport, InboundMessage};
use crate::config::TelegramConfig;
use crate::error::{BotError, Result};
use async_stream::stream;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use futures::future::{BoxFuture, FutureExt};
use futures::Stream;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Telegram's per-message text limit, in UTF-16 code units
pub const MESSAGE_LIMIT: usize = 4096;

/// `{ "ok": ..., "result": ... }` envelope around every Bot API reply
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

impl<T> ApiResponse<T> {
    fn into_result(self, method: &str) -> Result<T> {
        if !self.ok {
            return Err(BotError::Transport(format!(
                "{} failed (code {}): {}",
                method,
                self.error_code.unwrap_or(-1),
                self.description.as_deref().unwrap_or("unknown error")
            )));
        }
        self.result
            .ok_or_else(|| BotError::Transport(format!("{} returned no result", method)))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
    pub reply_to_message: Option<Box<Message>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}

/// Who the bot is, used to recognise mentions and replies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub id: i64,
    pub username: String,
}

impl Message {
    /// Convert to the platform-neutral form; non-text and anonymous messages are skipped
    pub fn into_inbound(self, bot: &BotIdentity) -> Option<InboundMessage> {
        let text = self.text?;
        let from = self.from?;

        let chat_kind = match self.chat.kind.as_str() {
            "private" => ChatKind::Direct,
            _ => ChatKind::Group,
        };
        let handle = format!("@{}", bot.username.to_lowercase());
        let mentions_bot = !bot.username.is_empty() && text.to_lowercase().contains(&handle);
        let reply_to_bot = self
            .reply_to_message
            .as_ref()
            .and_then(|m| m.from.as_ref())
            .is_some_and(|u| u.id == bot.id);

        Some(InboundMessage {
            message_id: self.message_id,
            chat_id: self.chat.id,
            chat_kind,
            user_id: from.id,
            user_name: from.first_name,
            text,
            mentions_bot,
            reply_to_bot,
        })
    }
}

/// HTTP client for the Telegram Bot API
pub struct TelegramClient {
    client: Client,
    config: TelegramConfig,
}

impl TelegramClient {
    pub fn new(config: TelegramConfig) -> Result<Self> {
        if config.bot_token.trim().is_empty() {
            return Err(BotError::Config("telegram.bot_token is not set".to_string()));
        }

        // Long polls hold the connection for `poll_timeout_secs`.
        let client = Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + 15))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| BotError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token,
            method
        )
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: serde_json::Value) -> Result<T> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| BotError::Transport(format!("{} request failed: {}", method, e)))?;

        let parsed: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| BotError::Transport(format!("{} returned invalid JSON: {}", method, e)))?;

        parsed.into_result(method)
    }

    /// Resolve the bot's own id and username
    pub async fn identity(&self) -> Result<BotIdentity> {
        let me: User = self.call("getMe", json!({})).await?;
        let username = self
            .config
            .bot_username
            .clone()
            .or(me.username)
            .unwrap_or_default()
            .trim_start_matches('@')
            .to_string();

        Ok(BotIdentity { id: me.id, username })
    }

    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>> {
        let mut body = json!({
            "timeout": self.config.poll_timeout_secs,
            "allowed_updates": ["message"],
        });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }
        self.call("getUpdates", body).await
    }

    /// Send `text`, split into as many messages as the length limit needs
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        for chunk in split_message(text, MESSAGE_LIMIT) {
            let _: Message = self
                .call("sendMessage", json!({ "chat_id": chat_id, "text": chunk }))
                .await?;
        }
        Ok(())
    }

    pub async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<()> {
        let _: bool = self
            .call(
                "deleteMessage",
                json!({ "chat_id": chat_id, "message_id": message_id }),
            )
            .await?;
        Ok(())
    }

    /// Endless stream of inbound text messages
    ///
    /// Polling errors are logged and retried with exponential backoff; the
    /// offset only advances past updates that were received.
    pub fn messages(self: Arc<Self>, bot: BotIdentity) -> impl Stream<Item = InboundMessage> + Send {
        stream! {
            let mut offset: Option<i64> = None;
            let mut backoff = ExponentialBackoff {
                initial_interval: Duration::from_secs(1),
                max_interval: Duration::from_secs(60),
                max_elapsed_time: None,
                ..Default::default()
            };

            loop {
                match self.get_updates(offset).await {
                    Ok(updates) => {
                        backoff.reset();
                        for update in updates {
                            offset = Some(update.update_id + 1);
                            if let Some(message) = update.message.and_then(|m| m.into_inbound(&bot)) {
                                yield message;
                            }
                        }
                    }
                    Err(e) => {
                        let wait = backoff.next_backoff().unwrap_or(backoff.max_interval);
                        tracing::warn!(error = %e, wait_ms = wait.as_millis() as u64, "polling failed, retrying");
                        tokio::time::sleep(wait).await;
                    }
                }
            }
        }
    }
}

impl ChatTransport for TelegramClient {
    fn send_text<'a>(&'a self, chat_id: i64, text: &'a str) -> BoxFuture<'a, Result<()>> {
        self.send_message(chat_id, text).boxed()
    }

    fn delete_message<'a>(&'a self, chat_id: i64, message_id: i64) -> BoxFuture<'a, Result<()>> {
        TelegramClient::delete_message(self, chat_id, message_id).boxed()
    }
}

/// Split text into chunks of at most `limit` UTF-16 code units, preferring line breaks
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = text;

    while utf16_len(rest) > limit {
        let mut units = 0;
        let mut hard_end = rest.len();
        for (i, c) in rest.char_indices() {
            if units + c.len_utf16() > limit {
                hard_end = i;
                break;
            }
            units += c.len_utf16();
        }
        if hard_end == 0 {
            // A single character wider than the limit still has to go somewhere.
            hard_end = rest.chars().next().map(char::len_utf8).unwrap_or(rest.len());
        }

        let end = match rest[..hard_end].rfind('\n') {
            Some(i) if i > 0 => i,
            _ => hard_end,
        };

        chunks.push(rest[..end].to_string());
        rest = rest[end..].strip_prefix('\n').unwrap_or(&rest[end..]);
    }

    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

fn utf16_len(text: &str) -> usize {
    text.chars().map(char::len_utf16).sum()
}
