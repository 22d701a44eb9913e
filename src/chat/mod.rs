//! Chat Module
//!
//! The messaging side of the bot: inbound message model, the transport seam
//! replies go through, the Telegram Bot API client and per-chat history.

pub mod context;
pub mod telegram;

use crate::error::Result;
use futures::future::BoxFuture;

pub use context::ConversationStore;
pub use telegram::{BotIdentity, TelegramClient};

/// Kind of chat a message arrived in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    /// One-to-one conversation with the bot
    Direct,

    /// Group or supergroup; the bot only answers when addressed
    Group,
}

/// Platform-neutral inbound text message
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub message_id: i64,
    pub chat_id: i64,
    pub chat_kind: ChatKind,
    pub user_id: i64,
    pub user_name: String,
    pub text: String,

    /// Text mentions the bot's handle
    pub mentions_bot: bool,

    /// Message is a reply to one of the bot's messages
    pub reply_to_bot: bool,
}

impl InboundMessage {
    /// Whether the bot should answer a plain (non-command) message
    pub fn addresses_bot(&self) -> bool {
        match self.chat_kind {
            ChatKind::Direct => true,
            ChatKind::Group => self.mentions_bot || self.reply_to_bot,
        }
    }
}

/// Outbound side of a chat platform
pub trait ChatTransport: Send + Sync {
    /// Send a text message, splitting it if the platform requires
    fn send_text<'a>(&'a self, chat_id: i64, text: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Delete a message, used to scrub commands that carried secrets
    fn delete_message<'a>(&'a self, chat_id: i64, message_id: i64) -> BoxFuture<'a, Result<()>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(kind: ChatKind) -> InboundMessage {
        InboundMessage {
            message_id: 1,
            chat_id: -100,
            chat_kind: kind,
            user_id: 7,
            user_name: "Ana".to_string(),
            text: "hello".to_string(),
            mentions_bot: false,
            reply_to_bot: false,
        }
    }

    #[test]
    fn test_direct_messages_always_addressed() {
        assert!(message(ChatKind::Direct).addresses_bot());
    }

    #[test]
    fn test_group_messages_need_mention_or_reply() {
        let mut msg = message(ChatKind::Group);
        assert!(!msg.addresses_bot());

        msg.mentions_bot = true;
        assert!(msg.addresses_bot());

        msg.mentions_bot = false;
        msg.reply_to_bot = true;
        assert!(msg.addresses_bot());
    }
}
