//! Record types and storage traits shared by every history backend.

use std::{
    fmt::{Display, Formatter},
    str::FromStr,
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

// ============================================================================
// Identifiers
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new() -> Self {
        let mut bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut bytes);
        let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        Self(format!("msg_{}", hex))
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for MessageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(StorageError::Corrupt(format!("unknown role '{}'", other))),
        }
    }
}

/// Input payload for creating a session
#[derive(Debug, Clone, Default)]
pub struct NewSession {
    pub owner: Option<String>,
    pub title: String,
}

/// Session metadata as decoded from a backend.
///
/// Each record is decoded on its own, so fields the backend could not supply
/// stay `None` instead of failing the whole listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
}

impl NewMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// One persisted message. `seq` is the write position within its session and
/// is the sort key; `created_at` never decreases along it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: MessageId,
    pub session_id: SessionId,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub seq: u64,
}

// ============================================================================
// Errors
// ============================================================================

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

// ============================================================================
// Traits
// ============================================================================

#[async_trait]
pub trait SessionStorage: Send + Sync + 'static {
    async fn create_session(&self, input: NewSession) -> Result<SessionRecord>;

    async fn get_session(&self, id: &SessionId) -> Result<Option<SessionRecord>>;

    /// Returns false when the session does not exist.
    async fn update_title(&self, id: &SessionId, title: &str) -> Result<bool>;

    /// All sessions, or only those owned by `owner`. No ordering guarantee.
    async fn list_sessions(&self, owner: Option<&str>) -> Result<Vec<SessionRecord>>;

    async fn delete_session(&self, id: &SessionId) -> Result<bool>;

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait MessageStorage: Send + Sync + 'static {
    /// Appends to the session's log. The session record need not exist.
    async fn append_message(&self, session_id: &SessionId, input: NewMessage)
        -> Result<StoredMessage>;

    /// Messages in write order.
    async fn list_messages(&self, session_id: &SessionId) -> Result<Vec<StoredMessage>>;

    /// Returns how many messages were removed.
    async fn delete_messages(&self, session_id: &SessionId) -> Result<usize>;
}

pub type SharedSessionStorage = Arc<dyn SessionStorage>;
pub type SharedMessageStorage = Arc<dyn MessageStorage>;
