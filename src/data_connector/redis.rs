//! Redis history backend.
//!
//! Layout:
//! - `chat:{id}` hash: id, title, owner, created_at
//! - `chats` / `user:{owner}:chats` sets: session index, global and per owner
//! - `chat:{id}:seq` counter: next message position
//! - `chat:{id}:messages` sorted set: message ids scored by position
//! - `message:{id}` hash: id, session_id, role, content, created_at, seq

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::AsyncCommands;
use tracing::{debug, warn};

use super::core::{
    MessageId, MessageStorage, NewMessage, NewSession, Result, Role, SessionId, SessionRecord,
    SessionStorage, StorageError, StoredMessage,
};
use crate::config::RedisConfig;

const SESSION_INDEX_KEY: &str = "chats";

/// Sets the title only while the session hash exists, so a concurrent
/// delete cannot be undone by a stray `HSET`.
const UPDATE_TITLE_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
    redis.call('HSET', KEYS[1], 'title', ARGV[1])
    return 1
end
return 0
";

fn session_key(id: &str) -> String {
    format!("chat:{}", id)
}

fn owner_index_key(owner: &str) -> String {
    format!("user:{}:chats", owner)
}

fn seq_key(session_id: &str) -> String {
    format!("chat:{}:seq", session_id)
}

fn messages_key(session_id: &str) -> String {
    format!("chat:{}:messages", session_id)
}

fn message_key(id: &str) -> String {
    format!("message:{}", id)
}

/// Keys whose TTL an append refreshes: the new message, the session's
/// message index and counter, and the session record itself.
fn retention_keys(session_id: &str, message_id: &str) -> [String; 4] {
    [
        message_key(message_id),
        messages_key(session_id),
        seq_key(session_id),
        session_key(session_id),
    ]
}

fn unavailable(err: impl std::fmt::Display) -> StorageError {
    StorageError::Unavailable(err.to_string())
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

fn retention_secs(days: u64) -> i64 {
    i64::try_from(days.saturating_mul(24 * 60 * 60)).unwrap_or(i64::MAX)
}

/// Connection pool shared by the session and message storages.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    retention_secs: Option<i64>,
}

impl RedisStore {
    pub fn new(config: &RedisConfig) -> std::result::Result<Self, String> {
        let mut cfg = Config::from_url(config.url.clone());
        cfg.pool = Some(deadpool_redis::PoolConfig::new(config.pool_max));
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| e.to_string())?;
        Ok(Self {
            pool,
            retention_secs: config.retention_days.map(retention_secs),
        })
    }

    async fn conn(&self) -> Result<Connection> {
        self.pool.get().await.map_err(unavailable)
    }
}

/// Decodes one session hash. Missing or malformed optional fields become
/// `None`; only a hash with no fields at all is treated as absent.
fn decode_session(id: &str, mut fields: HashMap<String, String>) -> Option<SessionRecord> {
    if fields.is_empty() {
        return None;
    }
    let created_at = match fields.remove("created_at") {
        Some(raw) => {
            let parsed = parse_timestamp(&raw);
            if parsed.is_none() {
                debug!(session_id = %id, raw = %raw, "Unparseable session created_at");
            }
            parsed
        }
        None => None,
    };
    Some(SessionRecord {
        id: SessionId::from(id),
        title: fields.remove("title"),
        owner: fields.remove("owner").filter(|o| !o.is_empty()),
        created_at,
    })
}

fn decode_message(mut fields: HashMap<String, String>) -> Result<StoredMessage> {
    let mut take = |name: &str| {
        fields
            .remove(name)
            .ok_or_else(|| StorageError::Corrupt(format!("message missing '{}'", name)))
    };
    let id = take("id")?;
    let session_id = take("session_id")?;
    let role: Role = take("role")?.parse()?;
    let content = take("content")?;
    let created_at_raw = take("created_at")?;
    let seq_raw = take("seq")?;

    let created_at = parse_timestamp(&created_at_raw).ok_or_else(|| {
        StorageError::Corrupt(format!("message {} has bad created_at", id))
    })?;
    let seq = seq_raw
        .parse::<u64>()
        .map_err(|_| StorageError::Corrupt(format!("message {} has bad seq", id)))?;

    Ok(StoredMessage {
        id: MessageId(id),
        session_id: SessionId(session_id),
        role,
        content,
        created_at,
        seq,
    })
}

pub struct RedisSessionStorage {
    store: RedisStore,
}

impl RedisSessionStorage {
    pub fn new(store: RedisStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SessionStorage for RedisSessionStorage {
    async fn create_session(&self, input: NewSession) -> Result<SessionRecord> {
        let mut conn = self.store.conn().await?;

        // HSETNX on the id field claims the key.
        let mut id = SessionId::new();
        loop {
            let claimed: bool = conn
                .hset_nx(session_key(id.as_str()), "id", id.as_str())
                .await
                .map_err(unavailable)?;
            if claimed {
                break;
            }
            id = SessionId::new();
        }

        let created_at = Utc::now();
        let key = session_key(id.as_str());

        let mut pipe = redis::pipe();
        pipe.hset(&key, "title", &input.title);
        pipe.hset(&key, "created_at", created_at.to_rfc3339());
        pipe.sadd(SESSION_INDEX_KEY, id.as_str());
        if let Some(owner) = &input.owner {
            pipe.hset(&key, "owner", owner);
            pipe.sadd(owner_index_key(owner), id.as_str());
        }
        if let Some(secs) = self.store.retention_secs {
            pipe.expire(&key, secs);
        }
        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(unavailable)?;

        Ok(SessionRecord {
            id,
            title: Some(input.title),
            owner: input.owner,
            created_at: Some(created_at),
        })
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<SessionRecord>> {
        let mut conn = self.store.conn().await?;
        let fields: HashMap<String, String> = conn
            .hgetall(session_key(id.as_str()))
            .await
            .map_err(unavailable)?;
        Ok(decode_session(id.as_str(), fields))
    }

    async fn update_title(&self, id: &SessionId, title: &str) -> Result<bool> {
        let mut conn = self.store.conn().await?;
        let updated: i64 = redis::Script::new(UPDATE_TITLE_SCRIPT)
            .key(session_key(id.as_str()))
            .arg(title)
            .invoke_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(updated == 1)
    }

    async fn list_sessions(&self, owner: Option<&str>) -> Result<Vec<SessionRecord>> {
        let mut conn = self.store.conn().await?;
        let index = match owner {
            Some(owner) => owner_index_key(owner),
            None => SESSION_INDEX_KEY.to_string(),
        };
        let ids: Vec<String> = conn.smembers(&index).await.map_err(unavailable)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for id in &ids {
            pipe.hgetall(session_key(id));
        }
        let hashes: Vec<HashMap<String, String>> =
            pipe.query_async(&mut conn).await.map_err(unavailable)?;

        let mut records = Vec::with_capacity(ids.len());
        let mut stale = Vec::new();
        for (id, fields) in ids.into_iter().zip(hashes) {
            match decode_session(&id, fields) {
                Some(record) => records.push(record),
                None => stale.push(id),
            }
        }

        // Index entries whose session hash expired.
        if !stale.is_empty() {
            debug!(count = stale.len(), "Pruning stale session index entries");
            if let Err(e) = conn.srem::<_, _, ()>(&index, &stale).await {
                warn!(error = %e, "Failed to prune session index");
            }
        }

        Ok(records)
    }

    async fn delete_session(&self, id: &SessionId) -> Result<bool> {
        let mut conn = self.store.conn().await?;
        let key = session_key(id.as_str());
        let owner: Option<String> = conn.hget(&key, "owner").await.map_err(unavailable)?;

        let mut pipe = redis::pipe();
        pipe.del(&key);
        pipe.srem(SESSION_INDEX_KEY, id.as_str()).ignore();
        if let Some(owner) = owner.filter(|o| !o.is_empty()) {
            pipe.srem(owner_index_key(&owner), id.as_str()).ignore();
        }
        let (removed,): (i64,) = pipe.query_async(&mut conn).await.map_err(unavailable)?;
        Ok(removed > 0)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.store.conn().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}

pub struct RedisMessageStorage {
    store: RedisStore,
}

impl RedisMessageStorage {
    pub fn new(store: RedisStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MessageStorage for RedisMessageStorage {
    async fn append_message(
        &self,
        session_id: &SessionId,
        input: NewMessage,
    ) -> Result<StoredMessage> {
        let mut conn = self.store.conn().await?;
        let sid = session_id.as_str();
        let log_key = messages_key(sid);

        let seq: u64 = conn.incr(seq_key(sid), 1).await.map_err(unavailable)?;

        // Keep timestamps non-decreasing along seq even if this host's clock
        // lags whoever wrote the previous message.
        let last: Vec<String> = conn.zrevrange(&log_key, 0, 0).await.map_err(unavailable)?;
        let mut created_at = Utc::now();
        if let Some(last_id) = last.first() {
            let last_ts: Option<String> = conn
                .hget(message_key(last_id), "created_at")
                .await
                .map_err(unavailable)?;
            if let Some(prev) = last_ts.as_deref().and_then(parse_timestamp) {
                created_at = created_at.max(prev);
            }
        }

        let message = StoredMessage {
            id: MessageId::new(),
            session_id: session_id.clone(),
            role: input.role,
            content: input.content,
            created_at,
            seq,
        };
        let key = message_key(&message.id.0);

        let mut pipe = redis::pipe();
        pipe.hset_multiple(
            &key,
            &[
                ("id", message.id.0.clone()),
                ("session_id", sid.to_string()),
                ("role", message.role.as_str().to_string()),
                ("content", message.content.clone()),
                ("created_at", message.created_at.to_rfc3339()),
                ("seq", seq.to_string()),
            ],
        );
        pipe.zadd(&log_key, &message.id.0, seq as f64);
        if let Some(secs) = self.store.retention_secs {
            for retained in retention_keys(sid, &message.id.0) {
                pipe.expire(retained, secs);
            }
        }
        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(unavailable)?;

        Ok(message)
    }

    async fn list_messages(&self, session_id: &SessionId) -> Result<Vec<StoredMessage>> {
        let mut conn = self.store.conn().await?;
        let ids: Vec<String> = conn
            .zrange(messages_key(session_id.as_str()), 0, -1)
            .await
            .map_err(unavailable)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for id in &ids {
            pipe.hgetall(message_key(id));
        }
        let hashes: Vec<HashMap<String, String>> =
            pipe.query_async(&mut conn).await.map_err(unavailable)?;

        let mut messages = Vec::with_capacity(hashes.len());
        for (id, fields) in ids.iter().zip(hashes) {
            if fields.is_empty() {
                warn!(session_id = %session_id, message_id = %id, "Indexed message has no record");
                continue;
            }
            messages.push(decode_message(fields)?);
        }
        Ok(messages)
    }

    async fn delete_messages(&self, session_id: &SessionId) -> Result<usize> {
        let mut conn = self.store.conn().await?;
        let sid = session_id.as_str();
        let log_key = messages_key(sid);
        let ids: Vec<String> = conn.zrange(&log_key, 0, -1).await.map_err(unavailable)?;

        let mut pipe = redis::pipe();
        for id in &ids {
            pipe.del(message_key(id)).ignore();
        }
        pipe.del(&log_key).ignore();
        pipe.del(seq_key(sid)).ignore();
        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(unavailable)?;

        Ok(ids.len())
    }
}
