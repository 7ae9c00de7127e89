//! Conversation history keyed by session id.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::SessionConfig;
use crate::types::ConversationMessage;

/// Supplies and accepts ordered message history for a session.
///
/// Every operation is a no-op for an empty session id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_history(&self, session_id: &str) -> Vec<ConversationMessage>;

    /// Append one exchange to the session.
    async fn update_history(&self, session_id: &str, user_message: &str, model_response: &str);

    async fn clear_history(&self, session_id: &str);
}

struct SessionEntry {
    messages: Vec<ConversationMessage>,
    last_active: Instant,
}

/// Process-local store. Keeps the trailing `max_messages` of each session
/// and forgets sessions idle for longer than `ttl`.
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    max_messages: usize,
    ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new(max_messages: usize, ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_messages,
            ttl,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.max_messages, Duration::from_secs(config.ttl_secs))
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn expired(&self, entry: &SessionEntry, now: Instant) -> bool {
        now.duration_since(entry.last_active) > self.ttl
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_history(&self, session_id: &str) -> Vec<ConversationMessage> {
        if session_id.is_empty() {
            return vec![];
        }
        let sessions = self.sessions.read().await;
        match sessions.get(session_id) {
            Some(entry) if !self.expired(entry, Instant::now()) => entry.messages.clone(),
            _ => vec![],
        }
    }

    async fn update_history(&self, session_id: &str, user_message: &str, model_response: &str) {
        if session_id.is_empty() {
            return;
        }
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, entry| !self.expired(entry, now));

        let entry = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionEntry {
                messages: Vec::new(),
                last_active: now,
            });
        entry.messages.push(ConversationMessage::user(user_message));
        entry.messages.push(ConversationMessage::model(model_response));
        if entry.messages.len() > self.max_messages {
            let excess = entry.messages.len() - self.max_messages;
            entry.messages.drain(..excess);
        }
        entry.last_active = now;
        debug!(session_id, messages = entry.messages.len(), "session updated");
    }

    async fn clear_history(&self, session_id: &str) {
        if session_id.is_empty() {
            return;
        }
        if self.sessions.write().await.remove(session_id).is_some() {
            debug!(session_id, "session cleared");
        }
    }
}
