//! Conversation history kept per chat so replies have recent context.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// Bounded per-chat transcript of `speaker: text` lines
#[derive(Debug)]
pub struct ConversationStore {
    window: usize,
    chats: Mutex<HashMap<i64, VecDeque<String>>>,
}

impl ConversationStore {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            chats: Mutex::new(HashMap::new()),
        }
    }

    /// Append a line, dropping the oldest once the window is full
    pub fn push(&self, chat_id: i64, speaker: &str, text: &str) {
        let mut chats = self.chats.lock();
        let lines = chats.entry(chat_id).or_default();
        lines.push_back(format!("{}: {}", speaker, text.trim()));
        while lines.len() > self.window {
            lines.pop_front();
        }
    }

    /// Lines of one chat joined with newlines, oldest first
    pub fn transcript(&self, chat_id: i64) -> String {
        self.chats
            .lock()
            .get(&chat_id)
            .map(|lines| lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n"))
            .unwrap_or_default()
    }

    /// Forget one chat; returns whether anything was stored
    pub fn clear(&self, chat_id: i64) -> bool {
        self.chats.lock().remove(&chat_id).is_some()
    }

    pub fn active_count(&self) -> usize {
        self.chats.lock().len()
    }
}
