use std::sync::Arc;

use tracing::info;

use super::{
    core::{SharedMessageStorage, SharedSessionStorage},
    memory::{MemoryMessageStorage, MemorySessionStorage},
    redis::{RedisMessageStorage, RedisSessionStorage, RedisStore},
};
use crate::config::{ChatConfig, HistoryBackend};

/// Session and message storage for one backend.
pub type StoragePair = (SharedSessionStorage, SharedMessageStorage);

/// Create the session and message storages selected by `history_backend`.
pub fn create_storage(config: &ChatConfig) -> Result<StoragePair, String> {
    match config.history_backend {
        HistoryBackend::Memory => {
            info!("Initializing data connector: Memory");
            Ok((
                Arc::new(MemorySessionStorage::new()),
                Arc::new(MemoryMessageStorage::new()),
            ))
        }
        HistoryBackend::Redis => {
            let redis_cfg = config
                .redis
                .as_ref()
                .ok_or("redis configuration is required when history_backend=redis")?;

            info!(
                "Initializing data connector: Redis (pool_max: {}, retention_days: {:?})",
                redis_cfg.pool_max, redis_cfg.retention_days
            );

            let store = RedisStore::new(redis_cfg)
                .map_err(|err| format!("failed to initialize Redis storage: {err}"))?;

            Ok((
                Arc::new(RedisSessionStorage::new(store.clone())),
                Arc::new(RedisMessageStorage::new(store)),
            ))
        }
    }
}
