//! Chat Bot
//!
//! Routes every inbound message: slash commands go to the admin console or
//! the utility handlers, plain messages that address the bot get a generated
//! reply built from the persona and the chat's recent history.

use crate::admin::{AdminConsole, AdminGate};
use crate::chat::{ChatKind, ChatTransport, ConversationStore, InboundMessage};
use crate::commands::Command;
use crate::config::{ChatConfig, Settings};
use crate::error::Result;
use crate::generation::Generator;
use crate::pool::SharedPool;
use futures::{Stream, StreamExt};
use rand::seq::IndexedRandom;
use std::sync::Arc;
use tokio::task::JoinSet;

const NOT_CONNECTED: &str =
    "❌ Oops! My AI brain isn't connected yet! Admin can use /addapi to set me up! 😅";

const ERROR_REPLIES: &[&str] = &[
    "Oops! Something went wrong in my digital brain! 😅 Try again?",
    "Aw, I had a little glitch there! 🤖💫 What were you saying?",
    "Sorry! My circuits got tangled for a sec! 😵‍💫 Can you repeat that?",
    "Eek! Technical difficulties! 🛠️💕 Let's try that again!",
];

/// Message router and conversation driver
pub struct ChatBot {
    chat: ChatConfig,
    bot_username: String,
    pool: SharedPool,
    generator: Generator,
    admin: AdminConsole,
    conversations: ConversationStore,
    transport: Arc<dyn ChatTransport>,
}

impl ChatBot {
    pub fn new(
        settings: &Settings,
        pool: SharedPool,
        transport: Arc<dyn ChatTransport>,
        bot_username: impl Into<String>,
    ) -> Self {
        Self {
            chat: settings.chat.clone(),
            bot_username: bot_username.into(),
            generator: Generator::new(
                pool.clone(),
                settings.generation.clone(),
                settings.provider.model.clone(),
            ),
            admin: AdminConsole::new(pool.clone(), AdminGate::new(settings.admin_user_id)),
            conversations: ConversationStore::new(settings.chat.context_window),
            pool,
            transport,
        }
    }

    /// Handle messages until the stream ends, one task per message
    pub async fn run<S>(self: Arc<Self>, messages: S)
    where
        S: Stream<Item = InboundMessage> + Send,
    {
        let mut messages = std::pin::pin!(messages);
        let mut tasks = JoinSet::new();

        while let Some(message) = messages.next().await {
            let bot = Arc::clone(&self);
            tasks.spawn(async move { bot.dispatch(message).await });

            while let Some(finished) = tasks.try_join_next() {
                log_join(finished);
            }
        }

        while let Some(finished) = tasks.join_next().await {
            log_join(finished);
        }
    }

    /// Handle one message, answering with an apology if handling failed
    pub async fn dispatch(&self, message: InboundMessage) {
        let chat_id = message.chat_id;
        if let Err(e) = self.handle(message).await {
            tracing::error!(chat_id, error = %e, "failed to handle message");
            let apology = error_reply();
            if let Err(e) = self.transport.send_text(chat_id, apology).await {
                tracing::error!(chat_id, error = %e, "failed to send error reply");
            }
        }
    }

    pub async fn handle(&self, message: InboundMessage) -> Result<()> {
        if let Some(command) = Command::parse(&message.text, &self.bot_username) {
            return self.handle_command(&message, command).await;
        }

        if !message.addresses_bot() {
            tracing::debug!(chat_id = message.chat_id, "message not addressed to the bot");
            return Ok(());
        }

        self.converse(&message).await
    }

    async fn handle_command(&self, message: &InboundMessage, command: Command) -> Result<()> {
        let chat_id = message.chat_id;

        if let Some(reply) = self.admin.execute(message.user_id, &command).await {
            if reply.delete_command {
                if let Err(e) = self
                    .transport
                    .delete_message(chat_id, message.message_id)
                    .await
                {
                    tracing::warn!(chat_id, error = %e, "could not delete command message");
                }
            }
            return self.transport.send_text(chat_id, &reply.text).await;
        }

        let text = match command {
            Command::Start | Command::Help => self.chat.welcome_text.clone(),
            Command::Clear => {
                self.conversations.clear(chat_id);
                "🧹 Conversation history cleared! Starting fresh.".to_string()
            }
            Command::Status => self.status_report(),
            other => {
                tracing::debug!(chat_id, ?other, "ignoring command");
                return Ok(());
            }
        };
        self.transport.send_text(chat_id, &text).await
    }

    async fn converse(&self, message: &InboundMessage) -> Result<()> {
        let chat_id = message.chat_id;
        self.conversations
            .push(chat_id, &message.user_name, &message.text);

        let reply = if self.pool.is_configured() {
            let prompt = self.build_prompt(message);
            self.generator.generate(&message.user_name, &prompt).await
        } else {
            tracing::warn!(chat_id, "no API keys registered, sending setup hint");
            NOT_CONNECTED.to_string()
        };

        self.conversations
            .push(chat_id, &self.chat.persona_name, &reply);
        self.transport.send_text(chat_id, &reply).await
    }

    fn build_prompt(&self, message: &InboundMessage) -> String {
        let place = match message.chat_kind {
            ChatKind::Direct => "private chat",
            ChatKind::Group => "group chat",
        };
        let name = &self.chat.persona_name;

        format!(
            "You are {name}, {persona}. You're in a Telegram {place}.\n\n\
             Keep responses conversational and natural, match the energy of the \
             conversation and remember its context.\n\n\
             Current conversation:\n{transcript}\n\n\
             Respond as {name}. The user's name is {user}.",
            persona = self.chat.persona,
            transcript = self.conversations.transcript(message.chat_id),
            user = message.user_name,
        )
    }

    fn status_report(&self) -> String {
        let stats = self.pool.stats();
        let keys = if stats.active > 0 {
            format!("✅ {}/{} Active", stats.active, stats.total)
        } else {
            "❌ No Active APIs".to_string()
        };
        let admin = self
            .admin
            .gate()
            .current()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "Not set".to_string());

        format!(
            "🤖💕 {name} Status Report:\n\n\
             🟢 Bot Status: Online & Ready!\n\
             🤖 AI Model: {model}\n\
             🔑 API Status: {keys}\n\
             📊 Success Rate: {rate:.1}%\n\
             ⏰ Current Time: {now}\n\
             💭 Active Conversations: {chats}\n\
             👑 Admin ID: {admin}",
            name = self.chat.persona_name,
            model = self.generator.model(),
            rate = stats.success_rate,
            now = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
            chats = self.conversations.active_count(),
        )
    }
}

fn error_reply() -> &'static str {
    ERROR_REPLIES
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(ERROR_REPLIES[0])
}

fn log_join(result: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        tracing::error!(error = %e, "message task panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BotError;
    use crate::pool::CredentialState;
    use crate::provider::Provider;
    use futures::future::{BoxFuture, FutureExt};
    use parking_lot::Mutex;
    use std::time::Duration;

    const ADMIN: i64 = 1;
    const KEY_A: &str = "AIzaSyAAAAAAAAAAAAAAAAAAAAAA";

    /// Provider that answers every prompt and remembers the last one
    #[derive(Default)]
    struct Echo {
        prompts: Mutex<Vec<String>>,

        /// Calls that fail before the provider starts answering
        failures_left: Mutex<usize>,
    }

    impl Provider for Echo {
        fn generate<'a>(
            &'a self,
            _secret: &'a str,
            _model: &'a str,
            prompt: &'a str,
        ) -> BoxFuture<'a, Result<String>> {
            self.prompts.lock().push(prompt.to_string());
            let mut failures_left = self.failures_left.lock();
            let fail = *failures_left > 0;
            *failures_left = failures_left.saturating_sub(1);
            drop(failures_left);
            async move {
                if fail {
                    Err(BotError::Provider {
                        status: 500,
                        message: "backend error".to_string(),
                    })
                } else {
                    Ok("Hi Ana! 😊".to_string())
                }
            }
            .boxed()
        }

        fn probe<'a>(&'a self, _secret: &'a str) -> BoxFuture<'a, bool> {
            async { true }.boxed()
        }
    }

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(i64, String)>>,
        deleted: Mutex<Vec<(i64, i64)>>,
        fail_sends: bool,
    }

    impl Recorder {
        fn texts(&self) -> Vec<String> {
            self.sent.lock().iter().map(|(_, t)| t.clone()).collect()
        }
    }

    impl ChatTransport for Recorder {
        fn send_text<'a>(&'a self, chat_id: i64, text: &'a str) -> BoxFuture<'a, Result<()>> {
            self.sent.lock().push((chat_id, text.to_string()));
            let fail = self.fail_sends;
            async move {
                if fail {
                    Err(BotError::Transport("sendMessage failed".to_string()))
                } else {
                    Ok(())
                }
            }
            .boxed()
        }

        fn delete_message<'a>(&'a self, chat_id: i64, message_id: i64) -> BoxFuture<'a, Result<()>> {
            self.deleted.lock().push((chat_id, message_id));
            async { Ok(()) }.boxed()
        }
    }

    struct Harness {
        bot: Arc<ChatBot>,
        pool: SharedPool,
        provider: Arc<Echo>,
        transport: Arc<Recorder>,
    }

    fn harness_with(transport: Recorder) -> Harness {
        let settings = Settings {
            admin_user_id: Some(ADMIN),
            ..Settings::default()
        };
        let provider = Arc::new(Echo::default());
        let transport = Arc::new(transport);
        let pool = SharedPool::new(settings.pool.clone(), provider.clone());
        let bot = Arc::new(ChatBot::new(
            &settings,
            pool.clone(),
            transport.clone(),
            "LeyanaBot",
        ));
        Harness {
            bot,
            pool,
            provider,
            transport,
        }
    }

    fn harness() -> Harness {
        harness_with(Recorder::default())
    }

    fn message(kind: ChatKind, user_id: i64, text: &str) -> InboundMessage {
        InboundMessage {
            message_id: 77,
            chat_id: 5,
            chat_kind: kind,
            user_id,
            user_name: "Ana".to_string(),
            text: text.to_string(),
            mentions_bot: text.contains("@LeyanaBot"),
            reply_to_bot: false,
        }
    }

    #[tokio::test]
    async fn test_direct_message_gets_generated_reply() {
        let h = harness();
        assert!(h.pool.add(KEY_A, None).await.ok);

        tokio_test::assert_ok!(h.bot.handle(message(ChatKind::Direct, 9, "hello!")).await);

        assert_eq!(h.transport.texts(), vec!["Hi Ana! 😊".to_string()]);
        let prompts = h.provider.prompts.lock();
        assert!(prompts[0].contains("You are Leyana"));
        assert!(prompts[0].contains("private chat"));
        assert!(prompts[0].contains("Ana: hello!"));
        drop(prompts);

        assert_eq!(
            h.bot.conversations.transcript(5),
            "Ana: hello!\nLeyana: Hi Ana! 😊"
        );
    }

    #[tokio::test]
    async fn test_group_message_needs_mention() {
        let h = harness();
        assert!(h.pool.add(KEY_A, None).await.ok);

        h.bot
            .handle(message(ChatKind::Group, 9, "just chatting"))
            .await
            .unwrap();
        assert!(h.transport.texts().is_empty());
        assert!(h.provider.prompts.lock().is_empty());

        h.bot
            .handle(message(ChatKind::Group, 9, "@LeyanaBot hi"))
            .await
            .unwrap();
        assert_eq!(h.transport.texts().len(), 1);
        assert!(h.provider.prompts.lock()[0].contains("group chat"));
    }

    #[tokio::test]
    async fn test_unconfigured_pool_sends_setup_hint() {
        let h = harness();
        h.bot
            .handle(message(ChatKind::Direct, 9, "hello"))
            .await
            .unwrap();
        assert_eq!(h.transport.texts(), vec![NOT_CONNECTED.to_string()]);
        assert!(h.provider.prompts.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooling_key_is_retried_after_cooldown() {
        let h = harness();
        assert!(h.pool.add(KEY_A, None).await.ok);
        let id = h.pool.details()[0].id.clone();
        *h.provider.failures_left.lock() = 3;

        h.bot
            .handle(message(ChatKind::Direct, 9, "hello"))
            .await
            .unwrap();
        assert_eq!(h.provider.prompts.lock().len(), 3);
        assert!(matches!(
            h.pool.state_of(&id),
            Some(CredentialState::Cooldown { .. })
        ));
        assert_ne!(h.transport.texts()[0], NOT_CONNECTED);

        tokio::time::advance(Duration::from_secs(3600)).await;
        h.bot
            .handle(message(ChatKind::Direct, 9, "still there?"))
            .await
            .unwrap();

        assert_eq!(h.provider.prompts.lock().len(), 4);
        assert_eq!(h.transport.texts()[1], "Hi Ana! 😊");
        assert_eq!(h.pool.state_of(&id), Some(CredentialState::Active));
    }

    #[tokio::test]
    async fn test_failed_key_still_answers() {
        let h = harness();
        assert!(h.pool.add(KEY_A, None).await.ok);
        let id = h.pool.details()[0].id.clone();
        h.pool.report_failure(&id, "500 internal");
        assert_eq!(h.pool.state_of(&id), Some(CredentialState::Failed));

        h.bot
            .handle(message(ChatKind::Direct, 9, "hello"))
            .await
            .unwrap();

        assert_eq!(h.transport.texts(), vec!["Hi Ana! 😊".to_string()]);
        assert_eq!(h.pool.state_of(&id), Some(CredentialState::Active));
    }

    #[tokio::test]
    async fn test_addapi_deletes_command_message() {
        let h = harness();
        let text = format!("/addapi {} Main", KEY_A);
        h.bot
            .handle(message(ChatKind::Direct, ADMIN, &text))
            .await
            .unwrap();

        assert_eq!(*h.transport.deleted.lock(), vec![(5, 77)]);
        let texts = h.transport.texts();
        assert!(texts[0].starts_with("✅ API key 'Main' added"));
        assert!(!texts[0].contains(KEY_A));
        assert_eq!(h.pool.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_and_status() {
        let h = harness();
        assert!(h.pool.add(KEY_A, None).await.ok);
        h.bot
            .handle(message(ChatKind::Direct, 9, "hello"))
            .await
            .unwrap();

        h.bot
            .handle(message(ChatKind::Direct, 9, "/status"))
            .await
            .unwrap();
        let status = h.transport.texts().pop().unwrap();
        assert!(status.contains("API Status: ✅ 1/1 Active"));
        assert!(status.contains("Success Rate: 100.0%"));
        assert!(status.contains("Active Conversations: 1"));
        assert!(status.contains("Admin ID: 1"));

        h.bot
            .handle(message(ChatKind::Direct, 9, "/clear"))
            .await
            .unwrap();
        assert_eq!(h.bot.conversations.transcript(5), "");
    }

    #[tokio::test]
    async fn test_commands_do_not_reach_provider() {
        let h = harness();
        assert!(h.pool.add(KEY_A, None).await.ok);
        h.bot
            .handle(message(ChatKind::Direct, 9, "/listapis"))
            .await
            .unwrap();
        h.bot
            .handle(message(ChatKind::Direct, 9, "/unknown"))
            .await
            .unwrap();

        assert_eq!(
            h.transport.texts(),
            vec!["❌ This command is only available to the bot admin.".to_string()]
        );
        assert!(h.provider.prompts.lock().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_sends_apology_on_failure() {
        let h = harness_with(Recorder {
            fail_sends: true,
            ..Recorder::default()
        });
        h.bot.dispatch(message(ChatKind::Direct, 9, "/start")).await;

        let texts = h.transport.texts();
        assert_eq!(texts.len(), 2);
        assert!(ERROR_REPLIES.contains(&texts[1].as_str()));
    }

    #[tokio::test]
    async fn test_run_handles_every_message() {
        let h = harness();
        assert!(h.pool.add(KEY_A, None).await.ok);

        let inbound = futures::stream::iter(vec![
            message(ChatKind::Direct, 9, "one"),
            message(ChatKind::Direct, 9, "/help"),
            message(ChatKind::Group, 9, "ignored"),
        ]);
        Arc::clone(&h.bot).run(inbound).await;

        assert_eq!(h.transport.texts().len(), 2);
    }
}
