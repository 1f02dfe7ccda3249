//! Storage backends for chat sessions and their message logs.

pub mod core;
pub mod factory;
pub mod memory;
pub mod redis;

pub use self::core::{
    MessageId, MessageStorage, NewMessage, NewSession, Result as StorageResult, Role,
    SessionId, SessionRecord, SessionStorage, SharedMessageStorage, SharedSessionStorage,
    StorageError, StoredMessage,
};
pub use self::factory::{create_storage, StoragePair};
pub use self::memory::{MemoryMessageStorage, MemorySessionStorage};
pub use self::redis::{RedisMessageStorage, RedisSessionStorage, RedisStore};
