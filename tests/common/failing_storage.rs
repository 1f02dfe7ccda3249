//! Storage doubles that fail on demand, wrapping the in-memory backends.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chat_relay::data_connector::{
    MemoryMessageStorage, MessageStorage, NewMessage, NewSession, SessionId, SessionRecord,
    SessionStorage, StorageError, StorageResult, StoredMessage,
};

fn down() -> StorageError {
    StorageError::Unavailable("connection refused".to_string())
}

/// Message storage whose `fail_on`-th append (1-based) fails; every other
/// call goes to memory.
pub struct FlakyMessageStorage {
    inner: MemoryMessageStorage,
    appends: AtomicUsize,
    fail_on: usize,
}

impl FlakyMessageStorage {
    pub fn failing_append(fail_on: usize) -> Self {
        Self {
            inner: MemoryMessageStorage::new(),
            appends: AtomicUsize::new(0),
            fail_on,
        }
    }
}

#[async_trait]
impl MessageStorage for FlakyMessageStorage {
    async fn append_message(
        &self,
        session_id: &SessionId,
        input: NewMessage,
    ) -> StorageResult<StoredMessage> {
        let n = self.appends.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_on {
            return Err(down());
        }
        self.inner.append_message(session_id, input).await
    }

    async fn list_messages(&self, session_id: &SessionId) -> StorageResult<Vec<StoredMessage>> {
        self.inner.list_messages(session_id).await
    }

    async fn delete_messages(&self, session_id: &SessionId) -> StorageResult<usize> {
        self.inner.delete_messages(session_id).await
    }
}

/// Session storage that is unreachable for every call, `ping` included.
pub struct DownSessionStorage;

#[async_trait]
impl SessionStorage for DownSessionStorage {
    async fn create_session(&self, _input: NewSession) -> StorageResult<SessionRecord> {
        Err(down())
    }

    async fn get_session(&self, _id: &SessionId) -> StorageResult<Option<SessionRecord>> {
        Err(down())
    }

    async fn update_title(&self, _id: &SessionId, _title: &str) -> StorageResult<bool> {
        Err(down())
    }

    async fn list_sessions(&self, _owner: Option<&str>) -> StorageResult<Vec<SessionRecord>> {
        Err(down())
    }

    async fn delete_session(&self, _id: &SessionId) -> StorageResult<bool> {
        Err(down())
    }

    async fn ping(&self) -> StorageResult<()> {
        Err(down())
    }
}
