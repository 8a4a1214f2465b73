use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Role of a stored chat message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatRole::User => f.write_str("user"),
            ChatRole::Assistant => f.write_str("assistant"),
        }
    }
}

/// A single message in a session conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
    /// Agent whose conversation this message belongs to.
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            agent_id: agent_id.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ChatKey {
    user_id: String,
    session_id: String,
    agent_id: String,
}

/// Per-(user, session, agent) chat history held in memory.
///
/// Each agent's history keeps at most `max_pairs` user/assistant pairs.
/// The global session history is the union of all agents' kept messages in
/// insertion order.
pub struct InMemoryChatStorage {
    inner: RwLock<StorageInner>,
}

#[derive(Default)]
struct StorageInner {
    next_seq: u64,
    chats: HashMap<ChatKey, Vec<(u64, ChatMessage)>>,
}

impl InMemoryChatStorage {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StorageInner::default()),
        }
    }

    /// Store one user/assistant exchange and trim the agent's history.
    pub async fn save_pair(
        &self,
        user_id: &str,
        session_id: &str,
        agent_id: &str,
        user_text: &str,
        assistant_text: &str,
        max_pairs: usize,
    ) {
        let key = ChatKey {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            agent_id: agent_id.to_string(),
        };
        let mut inner = self.inner.write().await;
        let first = inner.next_seq;
        inner.next_seq += 2;

        let chat = inner.chats.entry(key).or_default();
        chat.push((first, ChatMessage::new(ChatRole::User, user_text, agent_id)));
        chat.push((
            first + 1,
            ChatMessage::new(ChatRole::Assistant, assistant_text, agent_id),
        ));

        let keep = max_pairs.saturating_mul(2);
        if chat.len() > keep {
            let excess = chat.len() - keep;
            chat.drain(..excess);
            debug!(agent = %agent_id, dropped = excess, "trimmed chat history");
        }
    }

    /// One agent's history for a session, oldest first.
    pub async fn fetch_chat(&self, user_id: &str, session_id: &str, agent_id: &str) -> Vec<ChatMessage> {
        let key = ChatKey {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            agent_id: agent_id.to_string(),
        };
        let inner = self.inner.read().await;
        inner
            .chats
            .get(&key)
            .map(|chat| chat.iter().map(|(_, m)| m.clone()).collect())
            .unwrap_or_default()
    }

    /// Every agent's history for a session, in the order it was stored.
    pub async fn fetch_all_chats(&self, user_id: &str, session_id: &str) -> Vec<ChatMessage> {
        let inner = self.inner.read().await;
        let mut all: Vec<(u64, ChatMessage)> = inner
            .chats
            .iter()
            .filter(|(k, _)| k.user_id == user_id && k.session_id == session_id)
            .flat_map(|(_, chat)| chat.iter().cloned())
            .collect();
        all.sort_by_key(|(seq, _)| *seq);
        all.into_iter().map(|(_, m)| m).collect()
    }
}

impl Default for InMemoryChatStorage {
    fn default() -> Self {
        Self::new()
    }
}
