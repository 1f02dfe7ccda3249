//! Message store: the session/message API the HTTP layer and the chat
//! orchestrator work against, on top of the pluggable storage backends.

pub mod title;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use self::title::{derive_title, is_default_title, DEFAULT_CHAT_TITLE, UNTITLED_CHAT_TITLE};
use crate::data_connector::{
    NewMessage, NewSession, Role, SessionId, SessionRecord, SharedMessageStorage,
    SharedSessionStorage, StorageResult,
};

/// Role/content pair as handed to the completion provider and returned by
/// the history endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
}

impl From<SessionRecord> for SessionSummary {
    fn from(record: SessionRecord) -> Self {
        Self {
            id: record.id.0,
            title: record
                .title
                .unwrap_or_else(|| UNTITLED_CHAT_TITLE.to_string()),
        }
    }
}

/// Sorts newest first when every record carries a creation time. Returns
/// `false` and leaves storage order untouched otherwise.
fn order_newest_first(records: &mut [SessionRecord]) -> bool {
    if records.iter().any(|r| r.created_at.is_none()) {
        return false;
    }
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    true
}

#[derive(Clone)]
pub struct MessageStore {
    sessions: SharedSessionStorage,
    messages: SharedMessageStorage,
}

impl MessageStore {
    pub fn new(sessions: SharedSessionStorage, messages: SharedMessageStorage) -> Self {
        Self { sessions, messages }
    }

    /// Appends one message. The first user message of a session still
    /// titled [`DEFAULT_CHAT_TITLE`] also renames it, and only the first;
    /// a failed rename is logged and does not fail the append.
    pub async fn append(&self, session_id: &SessionId, role: Role, content: &str) -> StorageResult<()> {
        let stored = self
            .messages
            .append_message(session_id, NewMessage::new(role, content))
            .await?;
        debug!(
            session_id = %session_id,
            message_id = %stored.id,
            role = %role,
            seq = stored.seq,
            "Message appended"
        );

        if role == Role::User {
            if let Err(e) = self.maybe_retitle(session_id, content).await {
                warn!(session_id = %session_id, error = %e, "Failed to update session title");
            }
        }
        Ok(())
    }

    async fn maybe_retitle(&self, session_id: &SessionId, content: &str) -> StorageResult<()> {
        let Some(session) = self.sessions.get_session(session_id).await? else {
            return Ok(());
        };
        if !is_default_title(session.title.as_deref()) {
            return Ok(());
        }
        let title = derive_title(content);
        if title.is_empty() {
            return Ok(());
        }
        // A first message that derives to the default title must not leave
        // the session open to renaming by later messages.
        let user_messages = self
            .messages
            .list_messages(session_id)
            .await?
            .iter()
            .filter(|m| m.role == Role::User)
            .count();
        if user_messages > 1 {
            return Ok(());
        }
        if self.sessions.update_title(session_id, &title).await? {
            debug!(session_id = %session_id, title = %title, "Session titled");
        }
        Ok(())
    }

    /// All messages of the session in write order; empty for unknown ids.
    pub async fn history(&self, session_id: &SessionId) -> StorageResult<Vec<ChatMessage>> {
        let messages = self.messages.list_messages(session_id).await?;
        Ok(messages
            .into_iter()
            .map(|m| ChatMessage {
                role: m.role,
                content: m.content,
            })
            .collect())
    }

    pub async fn create_session(&self, owner: Option<&str>) -> StorageResult<SessionId> {
        let record = self
            .sessions
            .create_session(NewSession {
                owner: owner.map(str::to_string),
                title: DEFAULT_CHAT_TITLE.to_string(),
            })
            .await?;
        debug!(session_id = %record.id, owner = ?owner, "Session created");
        Ok(record.id)
    }

    /// Sessions newest first. Falls back to storage order, with a warning,
    /// when any record lacks a creation time.
    pub async fn list_sessions(&self, owner: Option<&str>) -> StorageResult<Vec<SessionSummary>> {
        let mut records = self.sessions.list_sessions(owner).await?;
        if !order_newest_first(&mut records) {
            warn!(
                count = records.len(),
                "Some sessions have no creation time; returning them unordered"
            );
        }
        Ok(records.into_iter().map(SessionSummary::from).collect())
    }

    /// Removes the message log first, then the session record, so an
    /// interrupted delete can only leave orphaned messages behind.
    pub async fn delete_session(&self, session_id: &SessionId) -> StorageResult<()> {
        let removed = self.messages.delete_messages(session_id).await?;
        let existed = self.sessions.delete_session(session_id).await?;
        debug!(
            session_id = %session_id,
            messages = removed,
            existed,
            "Session deleted"
        );
        Ok(())
    }

    pub async fn ping(&self) -> StorageResult<()> {
        self.sessions.ping().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};

    use super::*;
    use crate::data_connector::{MemoryMessageStorage, MemorySessionStorage, SessionStorage};

    fn memory_store() -> MessageStore {
        MessageStore::new(
            Arc::new(MemorySessionStorage::new()),
            Arc::new(MemoryMessageStorage::new()),
        )
    }

    #[tokio::test]
    async fn test_history_in_write_order() {
        let store = memory_store();
        let sid = store.create_session(None).await.unwrap();

        store.append(&sid, Role::User, "Hi").await.unwrap();
        store.append(&sid, Role::Assistant, "Hello!").await.unwrap();
        store.append(&sid, Role::User, "How are you").await.unwrap();

        let history = store.history(&sid).await.unwrap();
        assert_eq!(
            history,
            vec![
                ChatMessage::new(Role::User, "Hi"),
                ChatMessage::new(Role::Assistant, "Hello!"),
                ChatMessage::new(Role::User, "How are you"),
            ]
        );
    }

    #[tokio::test]
    async fn test_history_of_unknown_session_is_empty() {
        let store = memory_store();
        let history = store.history(&SessionId::from("nope")).await.unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_first_user_message_sets_title_once() {
        let store = memory_store();
        let sid = store.create_session(Some("anon_1")).await.unwrap();

        store.append(&sid, Role::Assistant, "Welcome aboard friend, ask away").await.unwrap();
        let sessions = store.list_sessions(None).await.unwrap();
        assert_eq!(sessions[0].title, DEFAULT_CHAT_TITLE);

        store
            .append(&sid, Role::User, "Plan a weekend trip to Lisbon")
            .await
            .unwrap();
        store.append(&sid, Role::User, "Actually make it Porto").await.unwrap();

        let sessions = store.list_sessions(Some("anon_1")).await.unwrap();
        assert_eq!(sessions[0].title, "Plan a weekend trip...");
    }

    #[tokio::test]
    async fn test_first_message_matching_default_title_still_wins() {
        let store = memory_store();
        let sid = store.create_session(None).await.unwrap();

        store.append(&sid, Role::User, "New Chat").await.unwrap();
        store
            .append(&sid, Role::User, "second message changes title")
            .await
            .unwrap();

        let sessions = store.list_sessions(None).await.unwrap();
        assert_eq!(sessions[0].title, DEFAULT_CHAT_TITLE);
    }

    #[tokio::test]
    async fn test_custom_title_is_preserved() {
        let sessions = Arc::new(MemorySessionStorage::new());
        let store = MessageStore::new(sessions.clone(), Arc::new(MemoryMessageStorage::new()));
        let sid = store.create_session(None).await.unwrap();
        sessions.update_title(&sid, "My notes").await.unwrap();

        store.append(&sid, Role::User, "hello there").await.unwrap();
        let listed = store.list_sessions(None).await.unwrap();
        assert_eq!(listed[0].title, "My notes");
    }

    #[tokio::test]
    async fn test_append_without_session_record() {
        let store = memory_store();
        let sid = SessionId::from("free-standing");
        store.append(&sid, Role::User, "hello").await.unwrap();
        assert_eq!(store.history(&sid).await.unwrap().len(), 1);
        assert!(store.list_sessions(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_session_clears_history_and_listing() {
        let store = memory_store();
        let keep = store.create_session(None).await.unwrap();
        let sid = store.create_session(None).await.unwrap();
        store.append(&sid, Role::User, "bye").await.unwrap();

        store.delete_session(&sid).await.unwrap();

        assert!(store.history(&sid).await.unwrap().is_empty());
        let listed = store.list_sessions(None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, keep.0);
    }

    #[tokio::test]
    async fn test_create_session_never_reuses_ids() {
        let store = memory_store();
        let mut ids = std::collections::HashSet::new();
        for _ in 0..50 {
            assert!(ids.insert(store.create_session(None).await.unwrap()));
        }
    }

    #[test]
    fn test_order_newest_first() {
        let now = Utc::now();
        let mut records = vec![
            SessionRecord {
                id: SessionId::from("old"),
                title: None,
                owner: None,
                created_at: Some(now - Duration::minutes(5)),
            },
            SessionRecord {
                id: SessionId::from("new"),
                title: None,
                owner: None,
                created_at: Some(now),
            },
        ];
        assert!(order_newest_first(&mut records));
        assert_eq!(records[0].id.as_str(), "new");
    }

    #[test]
    fn test_order_falls_back_when_timestamp_missing() {
        let mut records = vec![
            SessionRecord {
                id: SessionId::from("a"),
                title: None,
                owner: None,
                created_at: None,
            },
            SessionRecord {
                id: SessionId::from("b"),
                title: Some("B".to_string()),
                owner: None,
                created_at: Some(Utc::now()),
            },
        ];
        assert!(!order_newest_first(&mut records));
        assert_eq!(records[0].id.as_str(), "a");

        let summaries: Vec<SessionSummary> =
            records.into_iter().map(SessionSummary::from).collect();
        assert_eq!(summaries[0].title, UNTITLED_CHAT_TITLE);
        assert_eq!(summaries[1].title, "B");
    }
}
