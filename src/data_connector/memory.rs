//! In-process history backend. Lost on restart.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::RwLock;

use super::core::{
    MessageId, MessageStorage, NewMessage, NewSession, Result, SessionId, SessionRecord,
    SessionStorage, StoredMessage,
};

#[derive(Default)]
pub struct MemorySessionStorage {
    sessions: RwLock<HashMap<SessionId, SessionRecord>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStorage for MemorySessionStorage {
    async fn create_session(&self, input: NewSession) -> Result<SessionRecord> {
        let mut sessions = self.sessions.write();
        let mut id = SessionId::new();
        while sessions.contains_key(&id) {
            id = SessionId::new();
        }
        // Strictly increasing so newest-first listing is unambiguous.
        let latest = sessions.values().filter_map(|s| s.created_at).max();
        let now = Utc::now();
        let created_at = match latest {
            Some(latest) if latest >= now => latest + Duration::microseconds(1),
            _ => now,
        };
        let record = SessionRecord {
            id: id.clone(),
            title: Some(input.title),
            owner: input.owner,
            created_at: Some(created_at),
        };
        sessions.insert(id, record.clone());
        Ok(record)
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<SessionRecord>> {
        Ok(self.sessions.read().get(id).cloned())
    }

    async fn update_title(&self, id: &SessionId, title: &str) -> Result<bool> {
        match self.sessions.write().get_mut(id) {
            Some(record) => {
                record.title = Some(title.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_sessions(&self, owner: Option<&str>) -> Result<Vec<SessionRecord>> {
        let sessions = self.sessions.read();
        Ok(sessions
            .values()
            .filter(|s| owner.is_none() || s.owner.as_deref() == owner)
            .cloned()
            .collect())
    }

    async fn delete_session(&self, id: &SessionId) -> Result<bool> {
        Ok(self.sessions.write().remove(id).is_some())
    }
}

#[derive(Default)]
pub struct MemoryMessageStorage {
    logs: RwLock<HashMap<SessionId, Vec<StoredMessage>>>,
}

impl MemoryMessageStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStorage for MemoryMessageStorage {
    async fn append_message(
        &self,
        session_id: &SessionId,
        input: NewMessage,
    ) -> Result<StoredMessage> {
        let mut logs = self.logs.write();
        let log = logs.entry(session_id.clone()).or_default();

        // Clock steps backwards must not reorder the log.
        let now = Utc::now();
        let created_at = match log.last() {
            Some(last) if last.created_at > now => last.created_at,
            _ => now,
        };

        let message = StoredMessage {
            id: MessageId::new(),
            session_id: session_id.clone(),
            role: input.role,
            content: input.content,
            created_at,
            seq: log.len() as u64 + 1,
        };
        log.push(message.clone());
        Ok(message)
    }

    async fn list_messages(&self, session_id: &SessionId) -> Result<Vec<StoredMessage>> {
        Ok(self
            .logs
            .read()
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_messages(&self, session_id: &SessionId) -> Result<usize> {
        Ok(self
            .logs
            .write()
            .remove(session_id)
            .map(|log| log.len())
            .unwrap_or(0))
    }
}
