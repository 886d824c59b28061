//! In-Memory Chat Session Manager Implementation

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;

use crate::application::ports::{
    ChatMessage, ChatSession, ChatSessionError, ChatSessionManagerPort,
};
use crate::domain::story::EntityId;

/// 内存对话会话管理器
pub struct InMemoryChatSessionManager {
    sessions: DashMap<String, ChatSession>,
}

impl InMemoryChatSessionManager {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl Default for InMemoryChatSessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSessionManagerPort for InMemoryChatSessionManager {
    fn create(&self, session: ChatSession) -> Result<String, ChatSessionError> {
        let session_id = session.id.clone();
        if self.sessions.contains_key(&session_id) {
            return Err(ChatSessionError::AlreadyExists(session_id));
        }
        self.sessions.insert(session_id.clone(), session);
        tracing::debug!(session_id = %session_id, "Chat session stored");
        Ok(session_id)
    }

    fn get(&self, id: &str) -> Result<ChatSession, ChatSessionError> {
        self.sessions
            .get(id)
            .map(|s| s.clone())
            .ok_or_else(|| ChatSessionError::NotFound(id.to_string()))
    }

    fn set_active_story(
        &self,
        id: &str,
        story_id: Option<EntityId>,
    ) -> Result<(), ChatSessionError> {
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| ChatSessionError::NotFound(id.to_string()))?;
        session.active_story = story_id;
        session.last_activity = Utc::now();
        tracing::debug!(session_id = %id, story_id = ?story_id, "Active story updated");
        Ok(())
    }

    fn append_exchange(
        &self,
        id: &str,
        user: ChatMessage,
        assistant: ChatMessage,
        limit: usize,
    ) -> Result<(), ChatSessionError> {
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| ChatSessionError::NotFound(id.to_string()))?;
        session.history.push(user);
        session.history.push(assistant);
        if session.history.len() > limit {
            let overflow = session.history.len() - limit;
            session.history.drain(..overflow);
        }
        session.last_activity = Utc::now();
        Ok(())
    }

    fn close(&self, id: &str) -> Result<ChatSession, ChatSessionError> {
        self.sessions
            .remove(id)
            .map(|(_, session)| {
                tracing::debug!(session_id = %id, "Chat session removed");
                session
            })
            .ok_or_else(|| ChatSessionError::NotFound(id.to_string()))
    }

    fn touch(&self, id: &str) {
        if let Some(mut session) = self.sessions.get_mut(id) {
            session.last_activity = Utc::now();
        }
    }

    fn get_expired_sessions(&self, idle_timeout_secs: u64) -> Vec<String> {
        let now = Utc::now();
        let timeout = chrono::Duration::seconds(idle_timeout_secs as i64);

        self.sessions
            .iter()
            .filter_map(|entry| {
                let elapsed = now - entry.last_activity;
                // 有回合在运行的会话不算空闲
                if elapsed > timeout && !entry.gate.is_busy() {
                    Some(entry.key().clone())
                } else {
                    None
                }
            })
            .collect()
    }

    fn list_all(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }
}
