//! In-memory conversation history, keyed by session id.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::llm::{ChatMessage, Role};

/// Messages kept per session before the oldest are dropped.
pub const MAX_HISTORY_MESSAGES: usize = 200;

#[derive(Debug)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Vec<ChatMessage>>>,
    max_messages: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(MAX_HISTORY_MESSAGES)
    }
}

impl SessionStore {
    pub fn new(max_messages: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_messages,
        }
    }

    /// Snapshot of a session's history; empty for an unknown session.
    pub fn history(&self, session_id: &str) -> Vec<ChatMessage> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Append a completed turn's messages.
    ///
    /// When trimming, history always restarts at a user message so no tool
    /// result is left without the call that produced it.
    pub fn commit(&self, session_id: &str, messages: Vec<ChatMessage>) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let history = sessions.entry(session_id.to_string()).or_default();
        history.extend(messages);

        if history.len() > self.max_messages {
            let mut cut = history.len() - self.max_messages;
            while cut < history.len() && history[cut].role != Role::User {
                cut += 1;
            }
            history.drain(..cut);
            tracing::debug!(session_id, kept = history.len(), "Trimmed session history");
        }
    }

    pub fn clear(&self, session_id: &str) {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(session_id);
    }

    pub fn len(&self, session_id: &str) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(session_id)
            .map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sessions_are_isolated() {
        let store = SessionStore::default();
        store.commit("a", vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")]);

        assert_eq!(store.len("a"), 2);
        assert!(store.history("b").is_empty());

        store.clear("a");
        assert_eq!(store.len("a"), 0);
    }

    #[test]
    fn trimming_restarts_at_a_user_message() {
        let store = SessionStore::new(3);
        store.commit(
            "s",
            vec![
                ChatMessage::user("one"),
                ChatMessage::assistant("1"),
                ChatMessage::user("two"),
                ChatMessage::tool_result("c1", "get_all_rules", "No rules saved yet."),
                ChatMessage::assistant("2"),
            ],
        );

        let history = store.history("s");
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "two");
    }
}
